//! Local records of generated invoices.

use chrono::Local;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use invoicedrive_common::{Error, Result};

use crate::persist;

/// Writes invoice documents into the data directory.
#[derive(Debug, Clone)]
pub struct InvoiceStore {
    data_dir: PathBuf,
}

impl InvoiceStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Save `invoice` as `invoice_<no>_<YYYYmmdd_HHMMSS>.json`.
    ///
    /// The number is read from `invoice_no` (string or number) and defaults
    /// to `unknown`.
    pub async fn save(&self, invoice: &Value) -> Result<PathBuf> {
        if !invoice.is_object() {
            return Err(Error::InvalidInput(
                "Invoice data must be a JSON object".to_string(),
            ));
        }

        let file_name = format!(
            "invoice_{}_{}.json",
            invoice_number(invoice),
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.data_dir.join(file_name);

        let json = serde_json::to_string_pretty(invoice)
            .map_err(|e| Error::Persistence(format!("Failed to serialize invoice: {}", e)))?;
        persist::write_file(path.clone(), json.into_bytes()).await?;

        info!("Invoice saved: {}", path.display());
        Ok(path)
    }
}

fn invoice_number(invoice: &Value) -> String {
    let raw = match invoice.get("invoice_no") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "unknown".to_string(),
    };
    raw.replace(['/', '\\'], "-")
}
