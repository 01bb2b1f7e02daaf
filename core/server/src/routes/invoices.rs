use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiResult, AppError};
use crate::extract::ApiJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/save-invoice", post(save_invoice))
}

/// Other fields (such as `auto_upload`) are accepted and ignored.
#[derive(Debug, Deserialize)]
pub struct SaveInvoiceBody {
    pub invoice_data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct SaveInvoiceResponse {
    pub success: bool,
    pub message: String,
    pub invoice_path: String,
}

async fn save_invoice(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SaveInvoiceBody>,
) -> ApiResult<Json<SaveInvoiceResponse>> {
    let invoice = body
        .invoice_data
        .ok_or_else(|| AppError::bad_request("invoice_data is required"))?;

    let path = state.invoices.save(&invoice).await?;

    Ok(Json(SaveInvoiceResponse {
        success: true,
        message: "Invoice data saved".to_string(),
        invoice_path: path.display().to_string(),
    }))
}
