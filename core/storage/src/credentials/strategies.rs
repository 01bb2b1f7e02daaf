//! The six credential sources, in priority order.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use invoicedrive_common::{Error, Result};

use super::authorized_user::AuthorizedUser;
use super::interactive::{ClientRegistration, InteractiveFlow};
use super::service_account::ServiceAccountKey;
use super::{Credential, CredentialSource, CredentialStrategy, TokenHttp};

/// Inline service-account key document.
pub const SERVICE_ACCOUNT_ENV: &str = "GOOGLE_SERVICE_ACCOUNT_JSON";
/// Inline user-delegated token bundle.
pub const TOKEN_ENV: &str = "GOOGLE_TOKEN_JSON";
/// Inline OAuth client secrets document.
pub const CLIENT_CONFIG_ENV: &str = "GOOGLE_CREDENTIALS_JSON";

pub const SERVICE_ACCOUNT_FILE: &str = "service_account.json";
pub const TOKEN_FILE: &str = "token.json";
pub const CLIENT_SECRETS_FILE: &str = "credentials.json";

/// Credential material supplied through the process environment.
#[derive(Clone, Default)]
pub struct CredentialEnv {
    pub service_account_json: Option<String>,
    pub token_json: Option<String>,
    pub client_config_json: Option<String>,
}

impl std::fmt::Debug for CredentialEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEnv")
            .field("service_account_json", &self.service_account_json.is_some())
            .field("token_json", &self.token_json.is_some())
            .field("client_config_json", &self.client_config_json.is_some())
            .finish()
    }
}

impl CredentialEnv {
    /// Capture the relevant variables. Empty values count as unset.
    pub fn from_process() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            service_account_json: read(SERVICE_ACCOUNT_ENV),
            token_json: read(TOKEN_ENV),
            client_config_json: read(CLIENT_CONFIG_ENV),
        }
    }
}

/// Inputs for [`default_chain`].
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Directory holding the key, token cache and client secrets files.
    pub config_dir: PathBuf,
    /// Whether a browser consent flow may be started.
    pub interactive: bool,
    /// Timeout for token endpoint calls.
    pub token_timeout: Duration,
    /// How long to wait for the user to finish consent.
    pub consent_timeout: Duration,
    pub env: CredentialEnv,
}

impl ResolverOptions {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            interactive: false,
            token_timeout: Duration::from_secs(15),
            consent_timeout: Duration::from_secs(300),
            env: CredentialEnv::default(),
        }
    }
}

/// Build the standard chain: service account (env, file), token bundle
/// (env, cache file), interactive consent, client config (env).
pub fn default_chain(options: &ResolverOptions, http: &TokenHttp) -> Vec<Box<dyn CredentialStrategy>> {
    let token_cache = options.config_dir.join(TOKEN_FILE);

    vec![
        Box::new(ServiceAccountEnv {
            document: options.env.service_account_json.clone(),
            http: http.clone(),
        }),
        Box::new(ServiceAccountFile {
            path: options.config_dir.join(SERVICE_ACCOUNT_FILE),
            http: http.clone(),
        }),
        Box::new(TokenBundleEnv {
            document: options.env.token_json.clone(),
            shadowed_cache: token_cache.clone(),
            http: http.clone(),
        }),
        Box::new(TokenCacheFile {
            path: token_cache.clone(),
            http: http.clone(),
        }),
        Box::new(InteractiveConsent::new(
            options.config_dir.join(CLIENT_SECRETS_FILE),
            token_cache,
            options.interactive,
            InteractiveFlow::new(http.oauth.clone(), options.consent_timeout),
        )),
        Box::new(ClientConfigEnv {
            document: options.env.client_config_json.clone(),
        }),
    ]
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::ConfigMissing(format!(
            "Cannot read {}: {}",
            path.display(),
            e
        ))),
    }
}

async fn mint_service_account(json: &str, http: &TokenHttp) -> Result<Credential> {
    let key = ServiceAccountKey::from_json(json)?;
    let tokens = key.mint(&http.http).await?;
    Ok(Credential::new(
        tokens,
        CredentialSource::ServiceAccount(Arc::new(key)),
    ))
}

/// Refresh an expired bundle; a bundle that cannot refresh is unusable.
async fn ensure_fresh(bundle: AuthorizedUser, http: &TokenHttp) -> Result<AuthorizedUser> {
    if !bundle.is_expired() {
        return Ok(bundle);
    }
    if !bundle.can_refresh() {
        return Err(Error::RefreshFailed(
            "Token expired and no refresh token is available".to_string(),
        ));
    }
    debug!("Token bundle expired, refreshing");
    bundle.refreshed(&http.oauth).await
}

/// Strategy 1: service-account key from the environment.
pub struct ServiceAccountEnv {
    pub document: Option<String>,
    pub http: TokenHttp,
}

#[async_trait]
impl CredentialStrategy for ServiceAccountEnv {
    fn name(&self) -> &'static str {
        "service account (environment)"
    }

    async fn try_resolve(&self) -> Result<Option<Credential>> {
        match &self.document {
            Some(json) => mint_service_account(json, &self.http).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Strategy 2: service-account key file.
pub struct ServiceAccountFile {
    pub path: PathBuf,
    pub http: TokenHttp,
}

#[async_trait]
impl CredentialStrategy for ServiceAccountFile {
    fn name(&self) -> &'static str {
        "service account (file)"
    }

    async fn try_resolve(&self) -> Result<Option<Credential>> {
        match read_optional(&self.path).await? {
            Some(json) => mint_service_account(&json, &self.http).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Strategy 3: user-delegated token bundle from the environment.
pub struct TokenBundleEnv {
    pub document: Option<String>,
    /// Cache file that this source takes precedence over.
    pub shadowed_cache: PathBuf,
    pub http: TokenHttp,
}

#[async_trait]
impl CredentialStrategy for TokenBundleEnv {
    fn name(&self) -> &'static str {
        "token bundle (environment)"
    }

    async fn try_resolve(&self) -> Result<Option<Credential>> {
        let Some(json) = &self.document else {
            return Ok(None);
        };

        if tokio::fs::try_exists(&self.shadowed_cache).await.unwrap_or(false) {
            warn!(
                "{} is set and takes precedence over {}; the cache file is ignored",
                TOKEN_ENV,
                self.shadowed_cache.display()
            );
        }

        let bundle = ensure_fresh(AuthorizedUser::from_json(json)?, &self.http).await?;
        Credential::from_bundle(bundle, None).map(Some)
    }
}

/// Strategy 4: user-delegated token cache file, written back after use.
pub struct TokenCacheFile {
    pub path: PathBuf,
    pub http: TokenHttp,
}

#[async_trait]
impl CredentialStrategy for TokenCacheFile {
    fn name(&self) -> &'static str {
        "token cache (file)"
    }

    async fn try_resolve(&self) -> Result<Option<Credential>> {
        let Some(bundle) = AuthorizedUser::load(&self.path).await? else {
            return Ok(None);
        };

        let bundle = ensure_fresh(bundle, &self.http).await?;
        if let Err(e) = bundle.save(&self.path).await {
            warn!("Failed to update token cache {}: {}", self.path.display(), e);
        }

        Credential::from_bundle(bundle, Some(self.path.clone())).map(Some)
    }
}

/// Strategy 5: browser consent using the client secrets file.
///
/// Consent is attempted at most once per strategy instance. The first
/// resolution (server startup or `invoicedrive auth`) may block on the
/// browser; later resolutions report the source as unavailable.
pub struct InteractiveConsent {
    client_secrets: PathBuf,
    token_cache: PathBuf,
    armed: AtomicBool,
    flow: InteractiveFlow,
}

impl InteractiveConsent {
    pub fn new(
        client_secrets: PathBuf,
        token_cache: PathBuf,
        enabled: bool,
        flow: InteractiveFlow,
    ) -> Self {
        Self {
            client_secrets,
            token_cache,
            armed: AtomicBool::new(enabled),
            flow,
        }
    }
}

#[async_trait]
impl CredentialStrategy for InteractiveConsent {
    fn name(&self) -> &'static str {
        "interactive consent"
    }

    async fn try_resolve(&self) -> Result<Option<Credential>> {
        let Some(json) = read_optional(&self.client_secrets).await? else {
            return Ok(None);
        };

        if !self.armed.swap(false, Ordering::SeqCst) {
            return Err(Error::InteractiveUnavailable(format!(
                "{} exists but interactive authorization is disabled or already attempted; run `invoicedrive auth`",
                self.client_secrets.display()
            )));
        }

        let registration = ClientRegistration::from_json(&json)?;
        let bundle = self.flow.run(&registration).await?;

        bundle.save(&self.token_cache).await?;
        info!("Saved token cache to {}", self.token_cache.display());

        Credential::from_bundle(bundle, Some(self.token_cache.clone())).map(Some)
    }
}

/// Strategy 6: client secrets in the environment. Consent cannot complete
/// without a user, so this only reports what to do instead.
pub struct ClientConfigEnv {
    pub document: Option<String>,
}

#[async_trait]
impl CredentialStrategy for ClientConfigEnv {
    fn name(&self) -> &'static str {
        "client config (environment)"
    }

    async fn try_resolve(&self) -> Result<Option<Credential>> {
        if let Some(json) = &self.document {
            ClientRegistration::from_json(json)?;
            warn!(
                "{} is set, but interactive consent cannot complete here. \
                 Run `invoicedrive auth` on a machine with a browser and supply the \
                 resulting token.json through {}",
                CLIENT_CONFIG_ENV, TOKEN_ENV
            );
        }
        Ok(None)
    }
}
