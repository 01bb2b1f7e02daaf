//! Common utilities and types shared across InvoiceDrive modules.
//!
//! This module provides the error taxonomy and the provider-facing data
//! shapes that both the storage layer and the HTTP layer speak.

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::{FolderRef, UploadedFile, UserInfo};
