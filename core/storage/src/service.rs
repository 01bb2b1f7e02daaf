//! Upload orchestration on top of the credential resolver and Drive client.
//!
//! [`DriveService`] is the single entry point the HTTP layer and the CLI use.
//! Every operation first obtains a credential from the shared
//! [`CredentialResolver`] and then performs exactly one provider call.

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use invoicedrive_common::{Error, FolderRef, Result, UploadedFile, UserInfo};

use crate::config::{ConfigStore, DriveConfig};
use crate::credentials::CredentialResolver;
use crate::gdrive::client::{DriveClient, FileMetadata};
use crate::staging::StagedFile;

/// Outcome of one upload.
pub type UploadResult = Result<UploadedFile>;

/// Bytes to upload.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A file owned by the caller. Eligible for delete-after-upload.
    File(PathBuf),
    /// In-memory content, staged to disk for the duration of the upload.
    Bytes(Vec<u8>),
}

/// A single upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub payload: Payload,
    /// Destination override. Falls back to the configured folder.
    pub folder_id: Option<String>,
    /// Display name on Drive. Defaults to the file's own name.
    pub name: Option<String>,
}

impl UploadRequest {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            payload: Payload::File(path.into()),
            folder_id: None,
            name: None,
        }
    }

    pub fn bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            payload: Payload::Bytes(data),
            folder_id: None,
            name: Some(name.into()),
        }
    }

    pub fn in_folder(mut self, folder_id: Option<String>) -> Self {
        self.folder_id = folder_id;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Guess a MIME type from the file extension.
fn mime_type_for(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Uploads invoices and manages Drive folders for one account.
pub struct DriveService {
    resolver: Arc<CredentialResolver>,
    client: DriveClient,
    store: ConfigStore,
    config: RwLock<DriveConfig>,
    staging_root: PathBuf,
}

impl DriveService {
    /// Create the service, loading (or initializing) the persisted config.
    pub async fn open(
        resolver: Arc<CredentialResolver>,
        client: DriveClient,
        store: ConfigStore,
        staging_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let config = store.load_or_init().await?;
        debug!("Loaded drive config: {:?}", config);

        Ok(Self {
            resolver,
            client,
            store,
            config: RwLock::new(config),
            staging_root: staging_root.into(),
        })
    }

    /// Whether a credential is currently held.
    pub async fn is_authenticated(&self) -> bool {
        self.resolver.is_authenticated().await
    }

    /// Snapshot of the current config.
    pub async fn config(&self) -> DriveConfig {
        self.config.read().await.clone()
    }

    /// Replace the whole config record and persist it.
    ///
    /// The in-memory copy only changes once the file is written.
    pub async fn update_config(&self, mut config: DriveConfig) -> Result<DriveConfig> {
        config.updated_at = Some(chrono::Utc::now());
        self.store.save(&config).await?;

        *self.config.write().await = config.clone();
        info!("Drive config updated (folder: {:?})", config.default_folder());
        Ok(config)
    }

    async fn access_token(&self) -> Result<String> {
        match self.resolver.credential().await {
            Ok(credential) => Ok(credential.access_token().to_string()),
            Err(Error::Unauthenticated(message)) => Err(Error::Unauthenticated(message)),
            Err(e) => Err(Error::Unauthenticated(e.to_string())),
        }
    }

    /// Upload one payload.
    ///
    /// # Errors
    /// - `PayloadNotFound` when the payload is missing or empty; nothing is
    ///   sent to the provider
    /// - `Unauthenticated` when no credential can be obtained
    /// - `Provider` with the provider's own message when the upload fails
    pub async fn upload(&self, request: UploadRequest) -> UploadResult {
        let UploadRequest {
            payload,
            folder_id,
            name,
        } = request;

        // Keeps the staged copy alive until this function returns.
        let (path, staged, caller_owned) = match payload {
            Payload::File(path) => (path, None, true),
            Payload::Bytes(data) => {
                if data.is_empty() {
                    return Err(Error::PayloadNotFound("empty payload".to_string()));
                }
                let file_name = name.as_deref().ok_or_else(|| {
                    Error::InvalidInput("A file name is required for in-memory payloads".to_string())
                })?;
                let staged = StagedFile::create(&self.staging_root, file_name, &data).await?;
                (staged.path().to_path_buf(), Some(staged), false)
            }
        };

        let data = read_payload(&path).await?;

        let file_name = match name {
            Some(name) => name,
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::PayloadNotFound(path.display().to_string()))?,
        };

        let access_token = self.access_token().await?;

        let config = self.config().await;
        let parent = folder_id
            .filter(|id| !id.is_empty())
            .or_else(|| config.default_folder().map(str::to_string));

        let metadata = FileMetadata {
            name: file_name.clone(),
            description: Some(format!(
                "Auto-uploaded from Invoice Generator on {}",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            )),
            parents: parent.into_iter().collect(),
        };

        let file = match self
            .client
            .upload_multipart(&access_token, &metadata, mime_type_for(&file_name), data)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                error!("Upload of {} failed: {}", file_name, e);
                return Err(e);
            }
        };

        info!("Successfully uploaded: {} (ID: {})", file.name, file.id);

        if caller_owned && config.delete_after_upload {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("Deleted local file: {}", path.display()),
                Err(e) => warn!("Could not delete {}: {}", path.display(), e),
            }
        }
        drop(staged);

        Ok(UploadedFile {
            file_id: file.id,
            file_name: file.name,
            web_link: file.web_view_link,
        })
    }

    /// List folders, optionally under `parent_id`.
    ///
    /// Never fails: any error, including a missing credential, is logged and
    /// yields an empty list.
    pub async fn list_folders(&self, parent_id: Option<&str>) -> Vec<FolderRef> {
        let access_token = match self.access_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!("Cannot list folders: {}", e);
                return Vec::new();
            }
        };

        match self.client.list_folders(&access_token, parent_id).await {
            Ok(files) => files.into_iter().map(FolderRef::from).collect(),
            Err(e) => {
                error!("Error listing folders: {}", e);
                Vec::new()
            }
        }
    }

    /// Create a folder, optionally under `parent_id`.
    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FolderRef> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Folder name is required".to_string()));
        }

        let access_token = self.access_token().await?;
        let folder = self
            .client
            .create_folder(&access_token, name, parent_id)
            .await?;

        info!("Created folder: {} (ID: {})", folder.name, folder.id);
        Ok(folder.into())
    }

    /// The account the current credential belongs to.
    pub async fn user_info(&self) -> Result<UserInfo> {
        let access_token = self.access_token().await?;
        self.client.about_user(&access_token).await
    }
}

async fn read_payload(path: &Path) -> Result<Vec<u8>> {
    let not_found = || Error::PayloadNotFound(path.display().to_string());

    let metadata = tokio::fs::metadata(path).await.map_err(|_| not_found())?;
    if !metadata.is_file() || metadata.len() == 0 {
        return Err(not_found());
    }

    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => not_found(),
        _ => Error::Persistence(format!("Failed to read {}: {}", path.display(), e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{any, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    use crate::credentials::testing::token_http;
    use crate::credentials::Credential;
    use crate::gdrive::client::DriveEndpoints;

    struct Fixture {
        server: MockServer,
        temp: TempDir,
        service: DriveService,
    }

    async fn fixture(authenticated: bool) -> Fixture {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();

        let resolver = CredentialResolver::new(Vec::new(), token_http());
        let resolver = if authenticated {
            resolver.with_credential(Credential::fixed("test-token"))
        } else {
            resolver
        };

        let client =
            DriveClient::new(DriveEndpoints::with_base(&server.uri()), Duration::from_secs(5))
                .unwrap();
        let service = DriveService::open(
            Arc::new(resolver),
            client,
            ConfigStore::in_dir(&temp.path().join("config")),
            temp.path().join("staging"),
        )
        .await
        .unwrap();

        Fixture {
            server,
            temp,
            service,
        }
    }

    fn uploaded(id: &str, name: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": id,
            "name": name,
            "webViewLink": format!("https://drive.google.com/file/d/{}/view", id)
        }))
    }

    fn write_invoice(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"%PDF-1.4 invoice").unwrap();
        path
    }

    #[tokio::test]
    async fn test_missing_payload_makes_no_calls() {
        let f = fixture(true).await;
        Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0).mount(&f.server).await;

        let result = f
            .service
            .upload(UploadRequest::file(f.temp.path().join("missing.pdf")))
            .await;
        assert!(matches!(result, Err(Error::PayloadNotFound(_))));

        let empty = f.temp.path().join("empty.pdf");
        std::fs::write(&empty, b"").unwrap();
        let result = f.service.upload(UploadRequest::file(empty)).await;
        assert!(matches!(result, Err(Error::PayloadNotFound(_))));

        let result = f.service.upload(UploadRequest::bytes("a.pdf", Vec::new())).await;
        assert!(matches!(result, Err(Error::PayloadNotFound(_))));
    }

    #[tokio::test]
    async fn test_unauthenticated_makes_no_calls() {
        let f = fixture(false).await;
        Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0).mount(&f.server).await;

        let invoice = write_invoice(f.temp.path(), "invoice.pdf");
        let result = f.service.upload(UploadRequest::file(invoice)).await;
        assert!(matches!(result, Err(Error::Unauthenticated(_))));

        assert!(f.service.list_folders(None).await.is_empty());
        assert!(matches!(f.service.user_info().await, Err(Error::Unauthenticated(_))));
        assert!(matches!(
            f.service.create_folder("Invoices", None).await,
            Err(Error::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_uses_configured_folder() {
        let f = fixture(true).await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "multipart"))
            .and(body_string_contains(r#""parents":["cfg-folder"]"#))
            .and(body_string_contains("Auto-uploaded from Invoice Generator on "))
            .respond_with(uploaded("file-1", "invoice.pdf"))
            .expect(1)
            .mount(&f.server)
            .await;

        f.service
            .update_config(DriveConfig {
                folder_id: "cfg-folder".to_string(),
                ..DriveConfig::default()
            })
            .await
            .unwrap();

        let invoice = write_invoice(f.temp.path(), "invoice.pdf");
        let result = f.service.upload(UploadRequest::file(&invoice)).await.unwrap();

        assert_eq!(result.file_id, "file-1");
        assert_eq!(result.file_name, "invoice.pdf");
        assert!(result.web_link.unwrap().contains("file-1"));
        assert!(invoice.exists());
    }

    #[tokio::test]
    async fn test_explicit_folder_overrides_config() {
        let f = fixture(true).await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(body_string_contains(r#""parents":["explicit"]"#))
            .respond_with(uploaded("file-2", "Acme_(Invoice_7).pdf"))
            .expect(1)
            .mount(&f.server)
            .await;

        f.service
            .update_config(DriveConfig {
                folder_id: "cfg-folder".to_string(),
                ..DriveConfig::default()
            })
            .await
            .unwrap();

        let request = UploadRequest::bytes("Acme_(Invoice_7).pdf", b"%PDF".to_vec())
            .in_folder(Some("explicit".to_string()));
        let result = f.service.upload(request).await.unwrap();
        assert_eq!(result.file_id, "file-2");

        // Staged copy is gone
        let staging = f.temp.path().join("staging");
        assert_eq!(std::fs::read_dir(staging).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_no_folder_means_no_parents() {
        let f = fixture(true).await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(|request: &Request| {
                let body = String::from_utf8_lossy(&request.body);
                if body.contains("\"parents\"") {
                    ResponseTemplate::new(400)
                } else {
                    uploaded("root-file", "invoice.pdf")
                }
            })
            .expect(1)
            .mount(&f.server)
            .await;

        let invoice = write_invoice(f.temp.path(), "invoice.pdf");
        let result = f.service.upload(UploadRequest::file(invoice)).await.unwrap();
        assert_eq!(result.file_id, "root-file");
    }

    /// Removes the payload while the provider handles the upload, so the
    /// service's own deletion fails.
    struct RemoveDuringUpload(PathBuf);

    impl Respond for RemoveDuringUpload {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            std::fs::remove_file(&self.0).unwrap();
            uploaded("file-3", "invoice.pdf")
        }
    }

    #[tokio::test]
    async fn test_deletion_failure_keeps_success() {
        let f = fixture(true).await;
        let invoice = write_invoice(f.temp.path(), "invoice.pdf");

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(RemoveDuringUpload(invoice.clone()))
            .expect(1)
            .mount(&f.server)
            .await;

        f.service
            .update_config(DriveConfig {
                delete_after_upload: true,
                ..DriveConfig::default()
            })
            .await
            .unwrap();

        let result = f.service.upload(UploadRequest::file(&invoice)).await.unwrap();
        assert_eq!(result.file_id, "file-3");
    }

    #[tokio::test]
    async fn test_delete_after_upload_removes_caller_file() {
        let f = fixture(true).await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(uploaded("file-4", "invoice.pdf"))
            .mount(&f.server)
            .await;

        f.service
            .update_config(DriveConfig {
                delete_after_upload: true,
                ..DriveConfig::default()
            })
            .await
            .unwrap();

        let invoice = write_invoice(f.temp.path(), "invoice.pdf");
        f.service.upload(UploadRequest::file(&invoice)).await.unwrap();
        assert!(!invoice.exists());
    }

    #[tokio::test]
    async fn test_provider_error_is_verbatim() {
        let f = fixture(true).await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"code": 404, "message": "File not found: bogus-folder."}
            })))
            .expect(1)
            .mount(&f.server)
            .await;

        let invoice = write_invoice(f.temp.path(), "invoice.pdf");
        let err = f
            .service
            .upload(UploadRequest::file(&invoice).in_folder(Some("bogus-folder".to_string())))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider(_)));
        assert_eq!(err.to_string(), "File not found: bogus-folder.");
        assert!(invoice.exists());
    }

    #[tokio::test]
    async fn test_list_folders_maps_and_swallows_errors() {
        let f = fixture(true).await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("pageSize", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [
                    {"id": "f1", "name": "Invoices", "parents": ["root"]},
                    {"id": "f2", "name": "Archive"}
                ]
            })))
            .up_to_n_times(1)
            .mount(&f.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&f.server)
            .await;

        let folders = f.service.list_folders(None).await;
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].parents, vec!["root".to_string()]);
        assert!(folders[1].parents.is_empty());

        assert!(f.service.list_folders(Some("f1")).await.is_empty());
    }

    #[tokio::test]
    async fn test_create_folder_and_user_info() {
        let f = fixture(true).await;
        Mock::given(method("POST"))
            .and(path("/drive/v3/files"))
            .and(body_string_contains("\"name\":\"2024\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "new-folder", "name": "2024", "parents": ["f1"]
            })))
            .expect(1)
            .mount(&f.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/about"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user": {"emailAddress": "ada@example.com", "displayName": "Ada"}
            })))
            .expect(1)
            .mount(&f.server)
            .await;

        let folder = f.service.create_folder(" 2024 ", Some("f1")).await.unwrap();
        assert_eq!(folder.id, "new-folder");
        assert_eq!(folder.parents, vec!["f1".to_string()]);

        assert!(matches!(
            f.service.create_folder("  ", None).await,
            Err(Error::InvalidInput(_))
        ));

        let user = f.service.user_info().await.unwrap();
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));
        assert_eq!(user.photo, None);
    }

    #[tokio::test]
    async fn test_update_config_persists_whole_record() {
        let f = fixture(true).await;
        let saved = f
            .service
            .update_config(DriveConfig {
                folder_id: "abc".to_string(),
                auto_upload: false,
                delete_after_upload: true,
                updated_at: None,
            })
            .await
            .unwrap();
        assert!(saved.updated_at.is_some());

        let store = ConfigStore::in_dir(&f.temp.path().join("config"));
        assert_eq!(store.load_or_init().await.unwrap(), saved);
        assert_eq!(f.service.config().await, saved);
    }

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for("a.PDF"), "application/pdf");
        assert_eq!(mime_type_for("invoice_7.json"), "application/json");
        assert_eq!(mime_type_for("noext"), "application/octet-stream");
    }
}
