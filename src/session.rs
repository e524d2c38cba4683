//! Management platform login
//!
//! Exchanges username/password for a bearer token. The token lives for one
//! test run; it is never persisted or renewed.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument};

use crate::config::GatewayConfig;

/// Error type for login
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("login request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("login rejected with status {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed login response: {0}")]
    MalformedResponse(String),

    #[error("login response has no access_token")]
    MissingToken,

    #[error("access token is not a valid header value")]
    InvalidToken,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: Option<String>,
}

/// An authenticated platform session
#[derive(Clone)]
pub struct Session {
    access_token: String,
}

impl Session {
    /// Wrap an already obtained token
    pub fn from_token(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    /// POST the configured credentials to the login endpoint
    #[instrument(skip(client, config), fields(user = %config.username))]
    pub async fn login(client: &Client, config: &GatewayConfig) -> Result<Self, SessionError> {
        let url = join_uri(&config.proxy_uri, &config.login_uri);
        info!(url = %url, "Signing in to management platform");

        let response = client
            .post(&url)
            .json(&LoginRequest {
                username: &config.username,
                password: &config.password,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SessionError::Rejected { status, body });
        }

        let parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))?;
        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::MissingToken)?;

        Ok(Self::from_token(token))
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// `Authorization` header value for this session
    pub fn bearer(&self) -> Result<HeaderValue, SessionError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
            .map_err(|_| SessionError::InvalidToken)?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// A client that sends the session's `Authorization` header on every call
    pub fn authorized_client(&self) -> Result<Client, SessionError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.bearer()?);
        Ok(Client::builder().default_headers(headers).build()?)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Join a base URI and a path with exactly one slash between them
pub(crate) fn join_uri(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
