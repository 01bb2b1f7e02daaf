//! Google Drive upload backend for InvoiceDrive.
//!
//! - [`credentials`]: ordered credential resolution with in-place refresh
//! - [`gdrive`]: the Drive REST client and OAuth helpers
//! - [`service`]: upload orchestration over the two
//! - [`config`], [`invoices`], [`staging`]: local state

pub mod config;
pub mod credentials;
pub mod gdrive;
pub mod invoices;
pub mod naming;
pub mod persist;
pub mod service;
pub mod staging;

pub use config::{ConfigStore, DriveConfig};
pub use credentials::{Credential, CredentialResolver, CredentialStrategy, ResolverOptions};
pub use gdrive::{DriveClient, DriveEndpoints};
pub use invoices::InvoiceStore;
pub use naming::derive_invoice_filename;
pub use service::{DriveService, Payload, UploadRequest, UploadResult};
