use std::sync::Arc;

use invoicedrive_storage::{DriveService, InvoiceStore};

/// Shared handles passed to every route.
#[derive(Clone)]
pub struct AppState {
    pub drive: Arc<DriveService>,
    pub invoices: InvoiceStore,
}

impl AppState {
    pub fn new(drive: Arc<DriveService>, invoices: InvoiceStore) -> Self {
        Self { drive, invoices }
    }
}
