//! Credential resolution for the Drive API.
//!
//! A [`CredentialResolver`] walks an ordered list of [`CredentialStrategy`]
//! implementations and keeps the first valid [`Credential`] it obtains.
//! Expired credentials are refreshed in place when their source allows it;
//! otherwise they are dropped and the chain runs again on the next request.

pub mod authorized_user;
pub mod interactive;
pub mod service_account;
pub mod strategies;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use invoicedrive_common::{Error, Result};

use crate::gdrive::auth::{token_http_client, Tokens};

pub use authorized_user::AuthorizedUser;
pub use interactive::{ClientRegistration, InteractiveFlow};
pub use service_account::ServiceAccountKey;
pub use strategies::{default_chain, CredentialEnv, ResolverOptions};

/// Where a [`Credential`] came from, and therefore how it can be renewed.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Minted from a service-account key; renewed by minting again.
    ServiceAccount(Arc<ServiceAccountKey>),
    /// A user-delegated bundle; renewed with its refresh token. When
    /// `cache_path` is set the renewed bundle is written back there.
    AuthorizedUser {
        bundle: AuthorizedUser,
        cache_path: Option<PathBuf>,
    },
    /// Supplied directly; cannot be renewed.
    Static,
}

/// Token material authorizing calls to the Drive API.
#[derive(Debug, Clone)]
pub struct Credential {
    tokens: Tokens,
    source: CredentialSource,
}

impl Credential {
    pub fn new(tokens: Tokens, source: CredentialSource) -> Self {
        Self { tokens, source }
    }

    /// A non-expiring credential wrapping a bare access token.
    pub fn fixed(access_token: impl Into<String>) -> Self {
        Self::new(
            Tokens {
                access_token: access_token.into(),
                refresh_token: None,
                expires_at: None,
            },
            CredentialSource::Static,
        )
    }

    pub(crate) fn from_bundle(bundle: AuthorizedUser, cache_path: Option<PathBuf>) -> Result<Self> {
        let tokens = bundle
            .tokens()
            .ok_or_else(|| Error::Parse("Token bundle has no access token".to_string()))?;
        Ok(Self::new(
            tokens,
            CredentialSource::AuthorizedUser { bundle, cache_path },
        ))
    }

    pub fn access_token(&self) -> &str {
        &self.tokens.access_token
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Usable right now: non-empty and not about to expire.
    pub fn is_valid(&self) -> bool {
        !self.tokens.access_token.is_empty() && !self.tokens.is_expired()
    }

    /// Whether [`CredentialResolver`] can renew this credential in place.
    pub fn is_renewable(&self) -> bool {
        match &self.source {
            CredentialSource::ServiceAccount(_) => true,
            CredentialSource::AuthorizedUser { bundle, .. } => bundle.can_refresh(),
            CredentialSource::Static => false,
        }
    }
}

/// HTTP clients used against token endpoints.
#[derive(Clone)]
pub struct TokenHttp {
    pub(crate) http: reqwest::Client,
    pub(crate) oauth: oauth2::reqwest::Client,
}

impl TokenHttp {
    /// Build clients that give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            oauth: token_http_client(timeout)?,
        })
    }
}

/// One source of credentials in the resolution chain.
#[async_trait]
pub trait CredentialStrategy: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Try to produce a credential.
    ///
    /// `Ok(None)` means the source is not configured. `Err` means it is
    /// configured but unusable. Both make the resolver move on.
    async fn try_resolve(&self) -> Result<Option<Credential>>;
}

/// Owns the current credential and the chain that produces it.
pub struct CredentialResolver {
    strategies: Vec<Box<dyn CredentialStrategy>>,
    http: TokenHttp,
    current: RwLock<Option<Credential>>,
    /// Serializes resolution and refresh so they never run twice at once.
    resolve_lock: Mutex<()>,
}

impl CredentialResolver {
    pub fn new(strategies: Vec<Box<dyn CredentialStrategy>>, http: TokenHttp) -> Self {
        Self {
            strategies,
            http,
            current: RwLock::new(None),
            resolve_lock: Mutex::new(()),
        }
    }

    /// Build the standard six-source chain.
    pub fn from_options(options: ResolverOptions) -> Result<Self> {
        let http = TokenHttp::new(options.token_timeout)?;
        let strategies = default_chain(&options, &http);
        Ok(Self::new(strategies, http))
    }

    /// Seed the resolver with an already-obtained credential.
    pub fn with_credential(self, credential: Credential) -> Self {
        Self {
            current: RwLock::new(Some(credential)),
            ..self
        }
    }

    /// Whether a credential is currently held. Does not trigger resolution.
    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Get a valid credential, resolving or refreshing as needed.
    ///
    /// # Errors
    /// - `Unauthenticated` when no strategy yields a credential
    /// - `RefreshFailed` when the held credential expired and renewal was
    ///   rejected; the credential is dropped so the next call re-resolves
    pub async fn credential(&self) -> Result<Credential> {
        {
            let current = self.current.read().await;
            if let Some(credential) = current.as_ref().filter(|c| c.is_valid()) {
                return Ok(credential.clone());
            }
        }

        let _guard = self.resolve_lock.lock().await;

        // Double-check after acquiring the lock
        let held = self.current.read().await.clone();
        match held {
            Some(credential) if credential.is_valid() => return Ok(credential),
            Some(credential) if credential.is_renewable() => {
                info!("Refreshing expired credential");
                match self.renew(&credential).await {
                    Ok(renewed) => {
                        *self.current.write().await = Some(renewed.clone());
                        return Ok(renewed);
                    }
                    Err(e) => {
                        warn!("Credential refresh failed: {}", e);
                        *self.current.write().await = None;
                        return Err(e);
                    }
                }
            }
            Some(_) => {
                debug!("Held credential expired and cannot be renewed; re-resolving");
                *self.current.write().await = None;
            }
            None => {}
        }

        self.run_chain().await
    }

    async fn run_chain(&self) -> Result<Credential> {
        for strategy in &self.strategies {
            match strategy.try_resolve().await {
                Ok(Some(credential)) if credential.is_valid() => {
                    info!("Authenticated using {}", strategy.name());
                    *self.current.write().await = Some(credential.clone());
                    return Ok(credential);
                }
                Ok(Some(_)) => {
                    warn!("{} produced an expired credential", strategy.name());
                }
                Ok(None) => debug!("{} not configured", strategy.name()),
                Err(e) => warn!("{} failed: {}", strategy.name(), e),
            }
        }

        *self.current.write().await = None;
        Err(Error::Unauthenticated(
            "No credential source produced a valid credential".to_string(),
        ))
    }

    async fn renew(&self, credential: &Credential) -> Result<Credential> {
        match credential.source() {
            CredentialSource::ServiceAccount(key) => {
                let tokens = key
                    .mint(&self.http.http)
                    .await
                    .map_err(|e| Error::RefreshFailed(e.to_string()))?;
                Ok(Credential::new(
                    tokens,
                    CredentialSource::ServiceAccount(key.clone()),
                ))
            }
            CredentialSource::AuthorizedUser { bundle, cache_path } => {
                let refreshed = bundle.refreshed(&self.http.oauth).await?;
                if let Some(path) = cache_path {
                    if let Err(e) = refreshed.save(path).await {
                        warn!("Failed to update token cache {}: {}", path.display(), e);
                    }
                }
                Credential::from_bundle(refreshed, cache_path.clone())
            }
            CredentialSource::Static => Err(Error::RefreshFailed(
                "Static credentials cannot be refreshed".to_string(),
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEST_KEY: &str = include_str!("../../tests/fixtures/service_account_key.pem");

    pub fn key_document(token_uri: &str) -> String {
        serde_json::json!({
            "type": "service_account",
            "client_email": "uploader@invoices.iam.gserviceaccount.com",
            "private_key": TEST_KEY,
            "private_key_id": "kid-1",
            "token_uri": token_uri
        })
        .to_string()
    }

    pub fn bundle_json(
        token_uri: &str,
        expiry: Option<DateTime<Utc>>,
        refresh_token: Option<&str>,
    ) -> String {
        let mut doc = serde_json::json!({
            "token": "bundle-access",
            "token_uri": token_uri,
            "client_id": "cid.apps.googleusercontent.com",
            "client_secret": "secret",
            "scopes": [crate::gdrive::auth::DRIVE_SCOPE],
        });
        if let Some(expiry) = expiry {
            doc["expiry"] = serde_json::json!(expiry);
        }
        if let Some(refresh_token) = refresh_token {
            doc["refresh_token"] = serde_json::json!(refresh_token);
        }
        doc.to_string()
    }

    pub fn token_http() -> TokenHttp {
        TokenHttp::new(Duration::from_secs(5)).unwrap()
    }

    #[derive(Clone)]
    pub enum Outcome {
        Absent,
        Fails,
        Yields(Credential),
    }

    /// Strategy double that records how often it was consulted.
    pub struct FakeStrategy {
        pub outcome: Outcome,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeStrategy {
        pub fn boxed(outcome: Outcome) -> (Box<dyn CredentialStrategy>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let strategy = Self {
                outcome,
                calls: calls.clone(),
            };
            (Box::new(strategy), calls)
        }
    }

    #[async_trait]
    impl CredentialStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn try_resolve(&self) -> Result<Option<Credential>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Outcome::Absent => Ok(None),
                Outcome::Fails => Err(Error::Parse("broken source".to_string())),
                Outcome::Yields(credential) => Ok(Some(credential.clone())),
            }
        }
    }

    pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
        counter.load(Ordering::SeqCst)
    }
}
