//! OAuth2 token exchange for Google Drive.

use chrono::{DateTime, Duration, Utc};
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};

use invoicedrive_common::{Error, Result};

/// OAuth2 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google Drive OAuth2 scope. Only files created by this app are visible.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Assumed token lifetime when the provider omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

type GoogleOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth2 tokens with expiration tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    /// Access token for API requests.
    pub access_token: String,
    /// Refresh token for obtaining new access tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token expires. `None` means the provider did not say.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Tokens {
    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        // Consider expired if less than 5 minutes remaining
        self.expires_at
            .map(|at| at < Utc::now() + Duration::minutes(5))
            .unwrap_or(false)
    }
}

/// Compute an absolute expiry from a relative lifetime.
pub(crate) fn expiry_from(expires_in: Option<std::time::Duration>) -> DateTime<Utc> {
    let expires_in =
        expires_in.unwrap_or_else(|| std::time::Duration::from_secs(DEFAULT_TOKEN_LIFETIME_SECS));
    Utc::now() + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1))
}

/// OAuth2 client registration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Authorization endpoint.
    pub auth_uri: String,
    /// Token endpoint.
    pub token_uri: String,
    /// Redirect URL for the authorization-code callback.
    pub redirect_url: Option<String>,
}

/// Build the HTTP client used for token endpoint calls.
///
/// Redirects are disabled so that a misconfigured token URI cannot bounce
/// credentials to another host.
pub fn token_http_client(timeout: std::time::Duration) -> Result<oauth2::reqwest::Client> {
    oauth2::reqwest::ClientBuilder::new()
        .redirect(oauth2::reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|e| Error::InvalidInput(format!("Failed to create token HTTP client: {}", e)))
}

/// A pending authorization-code request.
pub struct AuthorizationRequest {
    /// URL the user must visit.
    pub url: String,
    /// CSRF state that must come back on the callback.
    pub csrf_state: String,
    /// PKCE verifier matching the challenge embedded in `url`.
    pub pkce_verifier: PkceCodeVerifier,
}

/// OAuth2 authentication manager for Google Drive.
pub struct AuthManager {
    client: GoogleOAuthClient,
    http: oauth2::reqwest::Client,
}

impl AuthManager {
    /// Create a new authentication manager.
    pub fn new(config: AuthConfig, http: oauth2::reqwest::Client) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(config.auth_uri.clone())
                    .map_err(|e| Error::Parse(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(config.token_uri.clone())
                    .map_err(|e| Error::Parse(format!("Invalid token URL: {}", e)))?,
            );

        if let Some(redirect_url) = &config.redirect_url {
            client = client.set_redirect_uri(
                RedirectUrl::new(redirect_url.clone())
                    .map_err(|e| Error::Parse(format!("Invalid redirect URL: {}", e)))?,
            );
        }

        Ok(Self { client, http })
    }

    /// Generate the authorization URL for the user to visit.
    pub fn authorization_url(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(DRIVE_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRequest {
            url: auth_url.to_string(),
            csrf_state: csrf_token.secret().clone(),
            pkce_verifier,
        }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    /// - Invalid authorization code
    /// - Network errors
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<Tokens> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Provider(format!("Token exchange failed: {}", e)))?;

        Ok(Tokens {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().clone()),
            expires_at: Some(expiry_from(token_result.expires_in())),
        })
    }

    /// Refresh an access token using the refresh token.
    ///
    /// # Errors
    /// - `RefreshFailed` when the provider rejects the refresh token or the
    ///   endpoint is unreachable
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens> {
        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::RefreshFailed(e.to_string()))?;

        // Refresh tokens may or may not be returned in refresh response
        let new_refresh_token = token_result
            .refresh_token()
            .map(|t| t.secret().clone())
            .unwrap_or_else(|| refresh_token.to_string());

        Ok(Tokens {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: Some(new_refresh_token),
            expires_at: Some(expiry_from(token_result.expires_in())),
        })
    }
}
