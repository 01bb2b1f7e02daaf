//! Common types used throughout InvoiceDrive.

use serde::{Deserialize, Serialize};

/// A folder as reported by a single provider listing.
///
/// This is a read-only projection; it is never cached beyond the call
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRef {
    /// Provider folder ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// IDs of the parent folders.
    #[serde(default)]
    pub parents: Vec<String>,
}

/// The account the current credential acts on behalf of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: Option<String>,
    pub name: Option<String>,
    pub photo: Option<String>,
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Provider-assigned file ID.
    pub file_id: String,
    /// Name confirmed by the provider.
    pub file_name: String,
    /// Shareable link, when the provider returns one.
    pub web_link: Option<String>,
}
