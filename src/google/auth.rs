//! OAuth2 identity provider for Google APIs.
//!
//! Sign-in opens the user's browser for consent, captures the redirect on a
//! loopback listener and exchanges the code for tokens. A configured
//! refresh token skips the browser entirely. Tokens live in memory only.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{GoogleApiError, REAUTHORIZE_SCOPES, SIGN_IN_SCOPES};
use crate::credentials::GoogleClientCredentials;
use crate::providers::sanitize_http_error_body;

/// Tokens within this many seconds of expiry are refreshed first.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Fallback lifetime when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// A loopback connection silent for this long is dropped.
const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(3);

/// Identity/session provider.
///
/// Publishes the signed-in flag on a watch channel so the hosting loop can
/// react to transitions instead of registering callbacks.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sign the user in with the base scope set.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleApiError`] when consent or the token exchange fails.
    async fn sign_in(&self) -> Result<(), GoogleApiError>;

    /// Drop the session and revoke its token.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleApiError`] only for failures that leave the user
    /// signed in.
    async fn sign_out(&self) -> Result<(), GoogleApiError>;

    /// Whether a user is currently signed in.
    fn is_signed_in(&self) -> bool;

    /// Subscribe to signed-in state changes.
    fn subscribe(&self) -> watch::Receiver<bool>;

    /// A bearer token valid for at least the expiry margin.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleApiError::NotSignedIn`] without a session, or
    /// [`GoogleApiError::AuthExpired`] when the token cannot be refreshed.
    async fn access_token(&self) -> Result<String, GoogleApiError>;

    /// Re-request the broader write scope set after a permission failure.
    ///
    /// # Errors
    ///
    /// Returns [`GoogleApiError`] when the user declines or consent fails.
    async fn reauthorize(&self) -> Result<(), GoogleApiError>;
}

// ============================================================================
// Token
// ============================================================================

/// An in-memory OAuth token.
#[derive(Clone, PartialEq, Eq)]
pub struct GoogleToken {
    /// Bearer token.
    pub access_token: String,
    /// Long-lived refresh token, when granted.
    pub refresh_token: Option<String>,
    /// Access-token expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for GoogleToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleToken")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Whether `token` expires within the margin of `now`.
///
/// Tokens without a known expiry are treated as valid.
pub fn is_token_expired(token: &GoogleToken, now: DateTime<Utc>) -> bool {
    match token.expires_at {
        None => false,
        Some(expiry) => {
            let threshold = now
                .checked_add_signed(TimeDelta::seconds(EXPIRY_MARGIN_SECS))
                .unwrap_or(now);
            expiry <= threshold
        }
    }
}

/// Token endpoint response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// Bearer token.
    pub access_token: String,
    /// Present on code exchange with `access_type=offline`.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space-separated granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert to a token, keeping `previous_refresh` when none was issued.
    pub fn into_token(self, now: DateTime<Utc>, previous_refresh: Option<String>) -> GoogleToken {
        let after = |secs: i64| TimeDelta::try_seconds(secs).and_then(|d| now.checked_add_signed(d));
        GoogleToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|s| !s.is_empty()).or(previous_refresh),
            expires_at: self
                .expires_in
                .and_then(after)
                .or_else(|| after(DEFAULT_EXPIRES_IN_SECS)),
            scopes: self
                .scope
                .map(|s| s.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default(),
        }
    }
}

fn map_token_error(status: u16, body: &str) -> GoogleApiError {
    let lowered = body.to_lowercase();
    if (status == 400 || status == 401) && lowered.contains("invalid_grant") {
        return GoogleApiError::AuthExpired;
    }
    GoogleApiError::TokenRequest(format!("HTTP {status}: {}", sanitize_http_error_body(body)))
}

// ============================================================================
// Consent helpers
// ============================================================================

/// OAuth endpoints and consent settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    /// Authorization endpoint.
    pub auth_uri: String,
    /// Token endpoint.
    pub token_uri: String,
    /// Revocation endpoint.
    pub revoke_uri: String,
    /// Maximum wait for the consent redirect.
    pub consent_timeout: Duration,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            auth_uri: "https://accounts.google.com/o/oauth2/v2/auth".to_owned(),
            token_uri: "https://oauth2.googleapis.com/token".to_owned(),
            revoke_uri: "https://oauth2.googleapis.com/revoke".to_owned(),
            consent_timeout: Duration::from_secs(300),
        }
    }
}

/// Build the browser consent URL.
///
/// # Errors
///
/// Returns [`GoogleApiError::FlowCancelled`] if `auth_uri` is not a URL.
#[doc(hidden)]
pub fn authorization_url(
    auth_uri: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[&str],
) -> Result<Url, GoogleApiError> {
    Url::parse_with_params(
        auth_uri,
        &[
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", &scopes.join(" ")),
            ("access_type", "offline"),
            ("include_granted_scopes", "true"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| GoogleApiError::FlowCancelled(format!("invalid authorization endpoint: {e}")))
}

/// Extract the authorization code from the redirect's request line
/// (`GET /?code=...&scope=... HTTP/1.1`).
///
/// # Errors
///
/// Returns [`GoogleApiError::FlowCancelled`] when the user denied access or
/// the request carries no code.
#[doc(hidden)]
pub fn parse_redirect(request_line: &str) -> Result<String, GoogleApiError> {
    let path = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| GoogleApiError::FlowCancelled("malformed redirect request".to_owned()))?;
    let url = Url::parse(&format!("http://localhost{path}"))
        .map_err(|e| GoogleApiError::FlowCancelled(format!("malformed redirect: {e}")))?;

    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "error" => return Err(GoogleApiError::FlowCancelled(value.into_owned())),
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            _ => {}
        }
    }
    code.ok_or_else(|| GoogleApiError::FlowCancelled("no authorization code received".to_owned()))
}

/// Whether a loopback request line is the consent redirect, carrying
/// either `code` or `error`.
#[doc(hidden)]
pub fn is_consent_redirect(request_line: &str) -> bool {
    let Some(path) = request_line.split_whitespace().nth(1) else {
        return false;
    };
    Url::parse(&format!("http://localhost{path}")).is_ok_and(|url| {
        url.query_pairs()
            .any(|(key, _)| key == "code" || key == "error")
    })
}

/// Accept loopback connections until the consent redirect arrives.
///
/// Connections that send nothing (browser preconnects) or ask for
/// something else (`/favicon.ico`) are skipped.
///
/// # Errors
///
/// Returns [`GoogleApiError::Io`] if the listener fails, or
/// [`GoogleApiError::FlowCancelled`] when the redirect carries an error.
#[doc(hidden)]
pub async fn wait_for_auth_code(listener: &TcpListener) -> Result<String, GoogleApiError> {
    loop {
        let (mut stream, _) = listener.accept().await?;

        let mut buffer = vec![0u8; 8192];
        let n = match tokio::time::timeout(IDLE_CONNECTION_TIMEOUT, stream.read(&mut buffer)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!(error = %e, "dropping unreadable loopback connection");
                continue;
            }
            Err(_) => {
                debug!("dropping idle loopback connection");
                continue;
            }
        };
        let request = String::from_utf8_lossy(&buffer[..n]);
        let first_line = request.lines().next().unwrap_or_default();

        if !is_consent_redirect(first_line) {
            if n > 0 {
                debug!(request = %first_line, "ignoring non-redirect request");
                respond(&mut stream, "404 Not Found", "").await;
            }
            continue;
        }

        let result = parse_redirect(first_line);
        let message = match &result {
            Ok(_) => "Authorization successful! You can close this tab and return to the terminal.",
            Err(_) => "Authorization was not completed. You can close this tab.",
        };
        let body = format!(
            "<html><body style=\"font-family: system-ui; text-align: center; padding: 40px;\">\
             <h2>{message}</h2></body></html>"
        );
        respond(&mut stream, "200 OK", &body).await;
        return result;
    }
}

async fn respond(stream: &mut tokio::net::TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "failed to answer loopback request");
    }
    let _ = stream.shutdown().await;
}

// ============================================================================
// Provider
// ============================================================================

/// Google OAuth identity provider.
pub struct GoogleIdentity {
    client: GoogleClientCredentials,
    settings: OAuthSettings,
    http: reqwest::Client,
    bootstrap_refresh_token: Option<String>,
    token: Mutex<Option<GoogleToken>>,
    state: watch::Sender<bool>,
}

impl std::fmt::Debug for GoogleIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleIdentity")
            .field("client", &self.client)
            .field("settings", &self.settings)
            .field("signed_in", &*self.state.borrow())
            .finish()
    }
}

impl GoogleIdentity {
    /// Create a signed-out provider.
    ///
    /// With `bootstrap_refresh_token`, [`IdentityProvider::sign_in`] uses
    /// the refresh grant instead of browser consent.
    pub fn new(
        client: GoogleClientCredentials,
        settings: OAuthSettings,
        bootstrap_refresh_token: Option<String>,
    ) -> Self {
        let (state, _) = watch::channel(false);
        Self {
            client,
            settings,
            http: reqwest::Client::new(),
            bootstrap_refresh_token,
            token: Mutex::new(None),
            state,
        }
    }

    #[instrument(skip(self))]
    async fn run_consent_flow(&self, scopes: &[&str]) -> Result<GoogleToken, GoogleApiError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{port}");

        let auth_url = authorization_url(
            &self.settings.auth_uri,
            &self.client.client_id,
            &redirect_uri,
            scopes,
        )?;

        info!(url = %auth_url, "open this URL to authorize Google access");
        if let Err(e) = open::that(auth_url.as_str()) {
            warn!(error = %e, "failed to open browser; visit the logged URL manually");
        }

        let timeout = self.settings.consent_timeout;
        let code = tokio::time::timeout(timeout, wait_for_auth_code(&listener))
            .await
            .map_err(|_| GoogleApiError::ConsentTimeout(timeout.as_secs()))??;

        let mut form = vec![
            ("code", code.as_str()),
            ("client_id", self.client.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        if let Some(secret) = self.client.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        self.token_request(&form, None).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<GoogleToken, GoogleApiError> {
        let mut form = vec![
            ("client_id", self.client.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = self.client.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        self.token_request(&form, Some(refresh_token.to_owned()))
            .await
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
        previous_refresh: Option<String>,
    ) -> Result<GoogleToken, GoogleApiError> {
        let response = self
            .http
            .post(&self.settings.token_uri)
            .form(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(map_token_error(status.as_u16(), &body));
        }
        let parsed: TokenResponse = serde_json::from_str(&body)?;
        Ok(parsed.into_token(Utc::now(), previous_refresh))
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentity {
    async fn sign_in(&self) -> Result<(), GoogleApiError> {
        let token = match self.bootstrap_refresh_token.as_deref() {
            Some(refresh_token) => {
                debug!("signing in with configured refresh token");
                self.refresh(refresh_token).await?
            }
            None => self.run_consent_flow(SIGN_IN_SCOPES).await?,
        };
        *self.token.lock().await = Some(token);
        self.state.send_replace(true);
        info!("signed in to Google");
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), GoogleApiError> {
        let token = self.token.lock().await.take();
        if let Some(token) = token {
            let revoke_value = token
                .refresh_token
                .clone()
                .unwrap_or_else(|| token.access_token.clone());
            match self
                .http
                .post(&self.settings.revoke_uri)
                .form(&[("token", revoke_value.as_str())])
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => debug!("token revoked"),
                Ok(resp) => warn!(status = resp.status().as_u16(), "token revocation rejected"),
                Err(e) => warn!(error = %e, "token revocation failed"),
            }
        }
        self.state.send_replace(false);
        info!("signed out of Google");
        Ok(())
    }

    fn is_signed_in(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    async fn access_token(&self) -> Result<String, GoogleApiError> {
        let mut guard = self.token.lock().await;
        let current = guard.as_ref().ok_or(GoogleApiError::NotSignedIn)?;
        if !is_token_expired(current, Utc::now()) {
            return Ok(current.access_token.clone());
        }

        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or(GoogleApiError::AuthExpired)?;
        debug!("access token near expiry, refreshing");
        let refreshed = self.refresh(&refresh_token).await?;
        let access = refreshed.access_token.clone();
        *guard = Some(refreshed);
        Ok(access)
    }

    async fn reauthorize(&self) -> Result<(), GoogleApiError> {
        info!("requesting broader Google permissions");
        let mut token = self.run_consent_flow(REAUTHORIZE_SCOPES).await?;
        let mut guard = self.token.lock().await;
        if token.refresh_token.is_none() {
            token.refresh_token = guard.as_ref().and_then(|t| t.refresh_token.clone());
        }
        *guard = Some(token);
        drop(guard);
        self.state.send_replace(true);
        Ok(())
    }
}
