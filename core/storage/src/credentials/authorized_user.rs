//! User-delegated token bundles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use invoicedrive_common::{Error, Result};

use crate::gdrive::auth::{
    AuthConfig, AuthManager, Tokens, DRIVE_SCOPE, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL,
};
use crate::persist;

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// A previously issued user-delegated token bundle.
///
/// The on-disk shape matches Google's `authorized_user` documents, so
/// bundles written by other Google tooling load unchanged. Unknown fields
/// survive a load/save cycle.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizedUser {
    #[serde(default, alias = "access_token", skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("client_id", &self.client_id)
            .field("has_token", &self.token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl AuthorizedUser {
    /// Build a bundle from a completed code exchange.
    pub fn from_tokens(config: &AuthConfig, tokens: Tokens) -> Self {
        Self {
            token: Some(tokens.access_token),
            refresh_token: tokens.refresh_token,
            token_uri: config.token_uri.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scopes: vec![DRIVE_SCOPE.to_string()],
            expiry: tokens.expires_at,
            extra: serde_json::Map::new(),
        }
    }

    /// Parse a bundle document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Parse(format!("Invalid token bundle: {}", e)))
    }

    /// Serialize the bundle.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Persistence(format!("Failed to serialize token bundle: {}", e)))
    }

    /// Load a bundle from disk. Returns `None` when the file does not exist.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::from_json(&content).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Persistence(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Write the bundle, replacing any previous file atomically.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        persist::write_file(path.to_path_buf(), json.into_bytes()).await
    }

    /// Current access token material, if any.
    pub fn tokens(&self) -> Option<Tokens> {
        self.token.as_ref().map(|access_token| Tokens {
            access_token: access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expiry,
        })
    }

    /// Whether the bundle needs a refresh before use.
    pub fn is_expired(&self) -> bool {
        self.tokens().map(|t| t.is_expired()).unwrap_or(true)
    }

    /// Whether the bundle carries a refresh token.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// # Errors
    /// - `RefreshFailed` when there is no refresh token or the provider
    ///   rejects it
    pub async fn refreshed(&self, http: &oauth2::reqwest::Client) -> Result<Self> {
        let refresh_token = self
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::RefreshFailed("Bundle has no refresh token".to_string()))?;

        let config = AuthConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            auth_uri: GOOGLE_AUTH_URL.to_string(),
            token_uri: self.token_uri.clone(),
            redirect_url: None,
        };

        let tokens = AuthManager::new(config, http.clone())
            .map_err(|e| Error::RefreshFailed(e.to_string()))?
            .refresh_token(refresh_token)
            .await?;

        let mut refreshed = self.clone();
        refreshed.token = Some(tokens.access_token);
        refreshed.refresh_token = tokens.refresh_token;
        refreshed.expiry = tokens.expires_at;
        Ok(refreshed)
    }
}
