use axum::{
    extract::{DefaultBodyLimit, Query, State},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use invoicedrive_common::FolderRef;
use invoicedrive_storage::{derive_invoice_filename, DriveConfig, UploadRequest};

use crate::error::{ApiResult, AppError};
use crate::extract::ApiJson;
use crate::state::AppState;

/// Request body cap for uploads. Base64 inflates a payload by a third, so
/// this admits PDFs of roughly 37 MiB.
pub const UPLOAD_BODY_LIMIT: usize = 50 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/upload-to-drive",
            post(upload_to_drive).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/configure-drive", post(configure_drive))
        .route("/get-drive-folders", get(get_drive_folders))
        .route("/create-drive-folder", post(create_drive_folder))
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceFields {
    pub buyer_name: Option<String>,
    pub invoice_no: Option<Value>,
}

impl InvoiceFields {
    fn invoice_no(&self) -> Option<String> {
        match self.invoice_no.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadBody {
    pub file_path: Option<String>,
    pub filename: Option<String>,
    /// Base64, optionally as a `data:` URL.
    pub file_data: Option<String>,
    #[serde(default)]
    pub invoice_data: Option<InvoiceFields>,
    pub folder_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub file_id: String,
    pub message: String,
    pub web_link: Option<String>,
}

fn decode_payload(data: &str) -> ApiResult<Vec<u8>> {
    let encoded = match data.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, body)| body).unwrap_or(rest),
        None => data,
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| AppError::bad_request(format!("Invalid base64 data: {}", e)))
}

async fn upload_to_drive(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UploadBody>,
) -> ApiResult<Json<UploadResponse>> {
    let request = match (body.file_path, body.filename, body.file_data) {
        (Some(path), _, _) if !path.is_empty() => UploadRequest::file(path),
        (_, Some(filename), Some(data)) if !filename.is_empty() && !data.is_empty() => {
            let bytes = decode_payload(&data)?;
            let invoice = body.invoice_data.unwrap_or_default();
            let name = derive_invoice_filename(
                invoice.buyer_name.as_deref(),
                invoice.invoice_no().as_deref(),
                &filename,
            );
            UploadRequest::bytes(name, bytes)
        }
        _ => {
            return Err(AppError::bad_request(
                "Either file_path or (filename + file_data) must be provided",
            ))
        }
    };

    let uploaded = state.drive.upload(request.in_folder(body.folder_id)).await?;

    Ok(Json(UploadResponse {
        success: true,
        file_id: uploaded.file_id,
        message: "File uploaded successfully to Google Drive".to_string(),
        web_link: uploaded.web_link,
    }))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ConfigureBody {
    #[serde(default)]
    pub folder_id: String,
    #[serde(default = "default_true")]
    pub auto_upload: bool,
    #[serde(default)]
    pub delete_after_upload: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigureResponse {
    pub success: bool,
    pub message: String,
    pub config: DriveConfig,
}

async fn configure_drive(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ConfigureBody>,
) -> ApiResult<Json<ConfigureResponse>> {
    let config = state
        .drive
        .update_config(DriveConfig {
            folder_id: body.folder_id.trim().to_string(),
            auto_upload: body.auto_upload,
            delete_after_upload: body.delete_after_upload,
            updated_at: None,
        })
        .await?;

    Ok(Json(ConfigureResponse {
        success: true,
        message: "Drive configuration updated".to_string(),
        config,
    }))
}

#[derive(Debug, Deserialize)]
pub struct FolderQuery {
    pub parent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FoldersResponse {
    pub success: bool,
    pub folders: Vec<FolderRef>,
}

async fn get_drive_folders(
    State(state): State<AppState>,
    Query(query): Query<FolderQuery>,
) -> Json<FoldersResponse> {
    let parent = query.parent_id.filter(|id| !id.is_empty());
    let folders = state.drive.list_folders(parent.as_deref()).await;

    Json(FoldersResponse {
        success: true,
        folders,
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderBody {
    pub name: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateFolderResponse {
    pub success: bool,
    pub folder_id: String,
    pub folder_name: String,
}

async fn create_drive_folder(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateFolderBody>,
) -> ApiResult<Json<CreateFolderResponse>> {
    let parent = body.parent_id.filter(|id| !id.is_empty());
    let folder = state
        .drive
        .create_folder(&body.name, parent.as_deref())
        .await?;

    Ok(Json(CreateFolderResponse {
        success: true,
        folder_id: folder.id,
        folder_name: folder.name,
    }))
}
