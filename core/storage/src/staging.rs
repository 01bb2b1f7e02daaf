//! Scoped staging of in-memory payloads.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;

use invoicedrive_common::{Error, Result};

/// A payload written under the staging root.
///
/// The file lives in its own temp directory, which is removed when the
/// guard is dropped, whatever path the caller leaves by.
#[derive(Debug)]
pub struct StagedFile {
    dir: TempDir,
    path: PathBuf,
}

impl StagedFile {
    /// Write `data` as `file_name` in a fresh directory under `root`.
    pub async fn create(root: &Path, file_name: &str, data: &[u8]) -> Result<Self> {
        let file_name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| Error::InvalidInput(format!("Invalid file name: {}", file_name)))?;

        fs::create_dir_all(root).await.map_err(|e| {
            Error::Persistence(format!("Failed to create {}: {}", root.display(), e))
        })?;

        let dir = tempfile::Builder::new()
            .prefix("upload-")
            .tempdir_in(root)
            .map_err(|e| Error::Persistence(format!("Failed to create staging dir: {}", e)))?;

        let path = dir.path().join(file_name);
        fs::write(&path, data)
            .await
            .map_err(|e| Error::Persistence(format!("Failed to stage {}: {}", path.display(), e)))?;

        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the staged file.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}
