//! Google Drive REST access and OAuth plumbing.

pub mod auth;
pub mod client;

pub use auth::{AuthConfig, AuthManager, Tokens};
pub use client::{DriveClient, DriveEndpoints, DriveFile, FileMetadata};
