//! Google Drive API client.

use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use invoicedrive_common::{Error, FolderRef, Result, UserInfo};

/// Google Drive API base URL.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Maximum number of folders returned by a single listing.
const FOLDER_PAGE_SIZE: &str = "100";

/// Google Drive file metadata from API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// File ID.
    pub id: String,
    /// File name.
    pub name: String,
    /// Parent folder IDs.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Link to open the file in the Drive web UI.
    #[serde(default)]
    pub web_view_link: Option<String>,
}

impl From<DriveFile> for FolderRef {
    fn from(file: DriveFile) -> Self {
        FolderRef {
            id: file.id,
            name: file.name,
            parents: file.parents,
        }
    }
}

/// Metadata sent alongside uploaded content.
#[derive(Debug, Clone, Serialize)]
pub struct FileMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

/// Response from listing files.
#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct AboutResponse {
    #[serde(default)]
    user: Option<AboutUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutUser {
    email_address: Option<String>,
    display_name: Option<String>,
    photo_link: Option<String>,
}

/// Endpoint configuration for [`DriveClient`].
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub api_base: String,
    pub upload_base: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
        }
    }
}

impl DriveEndpoints {
    /// Point both the metadata and the upload API at one base URL.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: format!("{}/drive/v3", base),
            upload_base: format!("{}/upload/drive/v3", base),
        }
    }
}

/// Google Drive API client.
///
/// Every method performs exactly one HTTP call with the supplied access
/// token. Credential acquisition is the caller's concern.
#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    endpoints: DriveEndpoints,
}

impl DriveClient {
    /// Create a new Drive client.
    pub fn new(endpoints: DriveEndpoints, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("InvoiceDrive/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, endpoints })
    }

    fn bearer(access_token: &str) -> String {
        format!("Bearer {}", access_token)
    }

    /// Upload a file in a single multipart request.
    pub async fn upload_multipart(
        &self,
        access_token: &str,
        metadata: &FileMetadata,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<DriveFile> {
        let url = format!("{}/files", self.endpoints.upload_base);

        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| Error::InvalidInput(format!("Failed to serialize metadata: {}", e)))?;

        let boundary = format!("InvoiceDrive-{}", uuid::Uuid::new_v4().simple());
        let mut body = Vec::with_capacity(data.len() + metadata_json.len() + 256);

        // Metadata part
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata_json.as_bytes());
        body.extend_from_slice(b"\r\n");

        // Data part
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");

        // End boundary
        body.extend_from_slice(format!("--{}--", boundary).as_bytes());

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, Self::bearer(access_token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .query(&[("uploadType", "multipart"), ("fields", "id,name,webViewLink")])
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Failed to upload file: {}", e)))?;

        Self::handle_response(response).await
    }

    /// List folders, optionally restricted to children of `parent_id`.
    pub async fn list_folders(
        &self,
        access_token: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<DriveFile>> {
        let url = format!("{}/files", self.endpoints.api_base);

        let mut query = format!("mimeType='{}'", FOLDER_MIME_TYPE);
        if let Some(parent) = parent_id {
            query.push_str(&format!(" and '{}' in parents", parent.replace('\'', "\\'")));
        }

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, Self::bearer(access_token))
            .query(&[
                ("q", query.as_str()),
                ("pageSize", FOLDER_PAGE_SIZE),
                ("fields", "files(id, name, parents)"),
            ])
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Failed to list folders: {}", e)))?;

        let list_response: FileListResponse = Self::handle_response(response).await?;
        Ok(list_response.files)
    }

    /// Create a folder.
    pub async fn create_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<DriveFile> {
        let url = format!("{}/files", self.endpoints.api_base);

        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE
        });

        if let Some(parent) = parent_id {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, Self::bearer(access_token))
            .query(&[("fields", "id,name,parents")])
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Failed to create folder: {}", e)))?;

        Self::handle_response(response).await
    }

    /// Get the account behind the access token.
    pub async fn about_user(&self, access_token: &str) -> Result<UserInfo> {
        let url = format!("{}/about", self.endpoints.api_base);

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, Self::bearer(access_token))
            .query(&[("fields", "user")])
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Failed to get user info: {}", e)))?;

        let about: AboutResponse = Self::handle_response(response).await?;
        let user = about.user;

        Ok(UserInfo {
            email: user.as_ref().and_then(|u| u.email_address.clone()),
            name: user.as_ref().and_then(|u| u.display_name.clone()),
            photo: user.and_then(|u| u.photo_link),
        })
    }

    /// Handle API response with error checking.
    ///
    /// Non-success responses become [`Error::Provider`] carrying the
    /// provider's own message.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| Error::Provider(format!("Failed to parse response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Provider(provider_error_message(status, &body)))
    }
}

/// Extract the provider's error message from a failed response body.
fn provider_error_message(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: ErrorBody,
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    match serde_json::from_str::<Envelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if body.trim().is_empty() => format!("API error: {}", status),
        Err(_) => format!("API error: {} - {}", status, body),
    }
}
