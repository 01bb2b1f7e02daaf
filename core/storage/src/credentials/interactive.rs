//! Interactive consent flow with a loopback callback listener.

use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use invoicedrive_common::{Error, Result};

use super::authorized_user::AuthorizedUser;
use crate::gdrive::auth::{AuthConfig, AuthManager, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL};

/// Largest request head accepted on the callback listener.
const MAX_CALLBACK_REQUEST: usize = 8 * 1024;

const SUCCESS_PAGE: &str = "<html><body><h3>Authorization complete.</h3>\
<p>You may close this window and return to InvoiceDrive.</p></body></html>";

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// An OAuth client registration as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct ClientSecretsDocument {
    installed: Option<ClientRegistration>,
    web: Option<ClientRegistration>,
}

impl ClientRegistration {
    /// Parse a client secrets document (`installed` or `web` flavour).
    pub fn from_json(json: &str) -> Result<Self> {
        let document: ClientSecretsDocument = serde_json::from_str(json)
            .map_err(|e| Error::Parse(format!("Invalid client secrets document: {}", e)))?;

        document.installed.or(document.web).ok_or_else(|| {
            Error::Parse("Client secrets document has neither 'installed' nor 'web'".to_string())
        })
    }

    fn auth_config(&self, redirect_url: String) -> AuthConfig {
        AuthConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            auth_uri: self.auth_uri.clone(),
            token_uri: self.token_uri.clone(),
            redirect_url: Some(redirect_url),
        }
    }
}

/// Query parameters delivered to the loopback redirect.
#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code { code: String, state: String },
    Denied(String),
}

/// Runs the authorization-code flow against a loopback listener.
pub struct InteractiveFlow {
    http: oauth2::reqwest::Client,
    timeout: Duration,
    open_browser: bool,
}

impl InteractiveFlow {
    pub fn new(http: oauth2::reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            timeout,
            open_browser: true,
        }
    }

    /// Print the URL only instead of launching a browser.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    /// Obtain a user-delegated bundle through browser consent.
    ///
    /// # Errors
    /// - `InteractiveUnavailable` when no callback arrives before the timeout
    /// - `InvalidInput` on a CSRF state mismatch
    /// - `Provider` when consent is denied or the code exchange fails
    pub async fn run(&self, registration: &ClientRegistration) -> Result<AuthorizedUser> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        let config = registration.auth_config(format!("http://127.0.0.1:{}/", port));

        let manager = AuthManager::new(config.clone(), self.http.clone())?;
        let request = manager.authorization_url();

        info!(
            "Please visit this URL to authorize InvoiceDrive: {}",
            request.url
        );
        if self.open_browser {
            if let Err(e) = open::that(&request.url) {
                warn!("Could not open a browser: {}", e);
            }
        }

        let callback = tokio::time::timeout(self.timeout, wait_for_callback(&listener))
            .await
            .map_err(|_| {
                Error::InteractiveUnavailable(
                    "Timed out waiting for the authorization callback".to_string(),
                )
            })??;

        let (code, state) = match callback {
            Callback::Code { code, state } => (code, state),
            Callback::Denied(reason) => {
                return Err(Error::Provider(format!("Authorization denied: {}", reason)))
            }
        };

        if state != request.csrf_state {
            return Err(Error::InvalidInput(
                "Authorization callback state mismatch".to_string(),
            ));
        }

        let tokens = manager.exchange_code(&code, request.pkce_verifier).await?;
        info!("Interactive authorization completed");

        Ok(AuthorizedUser::from_tokens(&config, tokens))
    }
}

/// Accept connections until one carries the authorization response.
async fn wait_for_callback(listener: &TcpListener) -> Result<Callback> {
    loop {
        let (mut stream, peer) = listener.accept().await?;
        debug!("Callback connection from {}", peer);

        let head = match read_request_head(&mut stream).await {
            Ok(head) => head,
            Err(e) => {
                debug!("Discarding unreadable callback request: {}", e);
                continue;
            }
        };

        match parse_callback(&head) {
            Some(callback) => {
                respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
                return Ok(callback);
            }
            None => respond(&mut stream, "404 Not Found", "").await,
        }
    }
}

async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    while !buffer.windows(4).any(|w| w == b"\r\n\r\n") && buffer.len() < MAX_CALLBACK_REQUEST {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!("Failed to answer callback request: {}", e);
    }
    let _ = stream.shutdown().await;
}

fn parse_callback(head: &str) -> Option<Callback> {
    let request_line = head.lines().next()?;
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;

    let url = url::Url::parse(&format!("http://127.0.0.1{}", target)).ok()?;
    let mut code = None;
    let mut state = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Some(Callback::Denied(value.into_owned())),
            _ => {}
        }
    }

    Some(Callback::Code {
        code: code?,
        state: state.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed_client_secrets() {
        let json = r#"{"installed":{"client_id":"cid","client_secret":"cs","redirect_uris":["http://localhost"]}}"#;
        let registration = ClientRegistration::from_json(json).unwrap();
        assert_eq!(registration.client_id, "cid");
        assert_eq!(registration.token_uri, GOOGLE_TOKEN_URL);
    }

    #[test]
    fn test_parse_web_client_secrets() {
        let json = r#"{"web":{"client_id":"w","client_secret":"s","token_uri":"https://t"}}"#;
        let registration = ClientRegistration::from_json(json).unwrap();
        assert_eq!(registration.client_id, "w");
        assert_eq!(registration.token_uri, "https://t");
    }

    #[test]
    fn test_client_secrets_without_registration() {
        assert!(matches!(
            ClientRegistration::from_json(r#"{"other":{}}"#),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_parse_callback() {
        let head = "GET /?state=abc&code=4%2F0Ad&scope=drive HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n";
        assert_eq!(
            parse_callback(head),
            Some(Callback::Code {
                code: "4/0Ad".to_string(),
                state: "abc".to_string()
            })
        );

        let denied = "GET /?error=access_denied&state=abc HTTP/1.1\r\n\r\n";
        assert_eq!(
            parse_callback(denied),
            Some(Callback::Denied("access_denied".to_string()))
        );

        assert_eq!(parse_callback("GET /favicon.ico HTTP/1.1\r\n\r\n"), None);
        assert_eq!(parse_callback("POST /?code=x HTTP/1.1\r\n\r\n"), None);
    }

    #[tokio::test]
    async fn test_wait_for_callback_skips_unrelated_requests() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut favicon = TcpStream::connect(addr).await.unwrap();
            favicon
                .write_all(b"GET /favicon.ico HTTP/1.1\r\nHost: x\r\n\r\n")
                .await
                .unwrap();
            let mut reply = String::new();
            favicon.read_to_string(&mut reply).await.unwrap();
            assert!(reply.starts_with("HTTP/1.1 404"));

            let mut callback = TcpStream::connect(addr).await.unwrap();
            callback
                .write_all(b"GET /?code=c1&state=s1 HTTP/1.1\r\nHost: x\r\n\r\n")
                .await
                .unwrap();
            let mut reply = String::new();
            callback.read_to_string(&mut reply).await.unwrap();
            assert!(reply.starts_with("HTTP/1.1 200"));
        });

        let callback = wait_for_callback(&listener).await.unwrap();
        client.await.unwrap();

        assert_eq!(
            callback,
            Callback::Code {
                code: "c1".to_string(),
                state: "s1".to_string()
            }
        );
    }
}
