//! Persisted upload preferences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use invoicedrive_common::{Error, Result};

use crate::persist;

/// File name of the preferences document inside the config directory.
pub const CONFIG_FILE: &str = "drive_config.json";

fn default_true() -> bool {
    true
}

/// Upload preferences shared by every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Destination used when a request names none. Empty means the root.
    #[serde(default)]
    pub folder_id: String,
    #[serde(default = "default_true")]
    pub auto_upload: bool,
    /// Remove caller-owned files after a successful upload.
    #[serde(default)]
    pub delete_after_upload: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            folder_id: String::new(),
            auto_upload: true,
            delete_after_upload: false,
            updated_at: None,
        }
    }
}

impl DriveConfig {
    /// The default destination, if one is set.
    pub fn default_folder(&self) -> Option<&str> {
        Some(self.folder_id.as_str()).filter(|id| !id.is_empty())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Persistence(format!("Failed to serialize config: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Parse(format!("Invalid config: {}", e)))
    }
}

/// Reads and writes the preferences document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store backed by [`CONFIG_FILE`] inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CONFIG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, creating it with defaults on first use.
    ///
    /// A malformed document is reported and replaced by defaults in memory;
    /// the file itself is left untouched until the next save.
    pub async fn load_or_init(&self) -> Result<DriveConfig> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => match DriveConfig::from_json(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    warn!("Ignoring unreadable {}: {}", self.path.display(), e);
                    Ok(DriveConfig::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = DriveConfig::default();
                self.save(&config).await?;
                info!("Created default config at {}", self.path.display());
                Ok(config)
            }
            Err(e) => Err(Error::Persistence(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Replace the whole document.
    pub async fn save(&self, config: &DriveConfig) -> Result<()> {
        let json = config.to_json()?;
        persist::write_file(self.path.clone(), json.into_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_first_load_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::in_dir(temp.path());

        let config = store.load_or_init().await.unwrap();
        assert_eq!(config, DriveConfig::default());
        assert!(config.auto_upload);
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::in_dir(temp.path());

        let config = DriveConfig {
            folder_id: "folder-123".to_string(),
            auto_upload: false,
            delete_after_upload: true,
            updated_at: Some(Utc::now()),
        };
        store.save(&config).await.unwrap();

        assert_eq!(store.load_or_init().await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_malformed_document_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::in_dir(temp.path());
        std::fs::write(store.path(), "{ not json").unwrap();

        assert_eq!(store.load_or_init().await.unwrap(), DriveConfig::default());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "{ not json");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = DriveConfig::from_json(r#"{"folder_id":"abc"}"#).unwrap();
        assert_eq!(config.default_folder(), Some("abc"));
        assert!(config.auto_upload);
        assert!(!config.delete_after_upload);

        assert_eq!(DriveConfig::default().default_folder(), None);
    }
}
