//! Atomic replacement of small local state files.

use std::io::Write;
use std::path::{Path, PathBuf};

use invoicedrive_common::{Error, Result};

/// Replace `path` with `contents`, creating parent directories as needed.
///
/// The data is written to a sibling temp file and renamed over the target,
/// so readers never observe a half-written file.
pub fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    std::fs::create_dir_all(dir)
        .map_err(|e| Error::Persistence(format!("Failed to create {}: {}", dir.display(), e)))?;

    let mut file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::Persistence(format!("Failed to stage {}: {}", path.display(), e)))?;
    file.write_all(contents)
        .map_err(|e| Error::Persistence(format!("Failed to write {}: {}", path.display(), e)))?;
    file.persist(path).map_err(|e| {
        Error::Persistence(format!("Failed to replace {}: {}", path.display(), e.error))
    })?;

    Ok(())
}

/// Async wrapper around [`write_atomically`].
pub async fn write_file(path: PathBuf, contents: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || write_atomically(&path, &contents))
        .await
        .map_err(|e| Error::Persistence(format!("Writer task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_replaces_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");

        write_atomically(&path, b"one").unwrap();
        write_atomically(&path, b"two").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a").join("b").join("state.json");

        write_file(path.clone(), b"{}".to_vec()).await.unwrap();
        assert!(path.exists());
    }
}
