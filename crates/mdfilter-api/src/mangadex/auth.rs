use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::error::AuthError;

pub const TOKEN_URL: &str =
    "https://auth.mangadex.org/realms/mangadex/protocol/openid-connect/token";

/// How long a freshly acquired access token is trusted.
pub const SESSION_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Personal API client credentials plus the account login.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    /// Names of the fields that are still empty, in form order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("username", &self.username),
            ("password", &self.password),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// An access token held in memory.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    /// Kept for completeness; expiry always triggers a new password login.
    pub refresh_token: Option<String>,
    pub expires_at: Instant,
}

impl Session {
    fn new(token: TokenResponse, ttl: Duration) -> Self {
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Password-grant client that owns the in-memory session.
///
/// Callers never touch the token directly: [`AuthClient::ensure_valid_session`]
/// hands out a token that is valid right now, logging in first if needed.
pub struct AuthClient {
    http: reqwest::Client,
    token_url: String,
    ttl: Duration,
    credentials: RwLock<Credentials>,
    // Held across the login exchange so concurrent callers share one login.
    session: Mutex<Option<Session>>,
    logins: AtomicU64,
}

impl AuthClient {
    pub fn new(http: reqwest::Client, credentials: Credentials) -> Self {
        Self {
            http,
            token_url: TOKEN_URL.to_string(),
            ttl: SESSION_TTL,
            credentials: RwLock::new(credentials),
            session: Mutex::new(None),
            logins: AtomicU64::new(0),
        }
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the credentials. The cached session is dropped so the next
    /// call logs in with the new account.
    pub async fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.write().unwrap_or_else(|e| e.into_inner()) = credentials;
        self.invalidate().await;
    }

    pub async fn invalidate(&self) {
        *self.session.lock().await = None;
    }

    /// Number of successful login exchanges since construction.
    pub fn login_count(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    /// Return a non-expired access token, logging in first when the session
    /// is absent or past its expiry.
    pub async fn ensure_valid_session(&self) -> Result<String, AuthError> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            if !session.is_expired() {
                return Ok(session.access_token.clone());
            }
            tracing::debug!("MangaDex session expired, logging in again");
        }

        let session = self.exchange().await?;
        let token = session.access_token.clone();
        *slot = Some(session);
        Ok(token)
    }

    /// Force a password-grant login and replace the cached session.
    pub async fn login(&self) -> Result<(), AuthError> {
        let mut slot = self.session.lock().await;
        *slot = Some(self.exchange().await?);
        Ok(())
    }

    async fn exchange(&self) -> Result<Session, AuthError> {
        let creds = self.credentials();
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "password"),
                ("username", creds.username.as_str()),
                ("password", creds.password.as_str()),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status, "MangaDex login rejected");
            return Err(AuthError::Api {
                status,
                message: body,
            });
        }

        let body = resp.text().await?;
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::Parse(e.to_string()))?;

        self.logins.fetch_add(1, Ordering::Relaxed);
        tracing::info!(username = %creds.username, "logged in to MangaDex");
        Ok(Session::new(token, self.ttl))
    }
}
