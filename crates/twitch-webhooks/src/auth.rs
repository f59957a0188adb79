//! App access token cache for Twitch authentication.
//!
//! Fetches tokens with the OAuth client credentials grant and reuses them
//! until they expire. Without a client secret, requests carry only the
//! `Client-Id` header.

use chrono::Utc;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{Token, TwitchError};

/// Twitch OAuth token response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    scope: Option<ScopeField>,
}

/// Twitch returns `scope` as a list; other OAuth servers use a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeField {
    One(String),
    Many(Vec<String>),
}

impl ScopeField {
    fn joined(self) -> String {
        match self {
            Self::One(s) => s,
            Self::Many(list) => list.join(" "),
        }
    }
}

/// Twitch OAuth error response.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Caches the app access token and builds request auth headers.
///
/// A miss holds the lock for the duration of the token request, so
/// concurrent callers wait for a single fetch instead of racing.
pub struct TokenCache {
    client_id: String,
    client_secret: String,
    token_url: String,
    http: reqwest::Client,
    token: Mutex<Option<Token>>,
}

impl TokenCache {
    pub fn new(
        client_id: String,
        client_secret: String,
        token_url: String,
        http: reqwest::Client,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            token_url,
            http,
            token: Mutex::new(None),
        }
    }

    /// Build the auth headers for one outbound request.
    pub async fn auth_headers(&self) -> Result<HeaderMap, TwitchError> {
        if self.client_id.is_empty() {
            return Err(TwitchError::Config("client id is required".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert("Client-Id", header_value(&self.client_id)?);

        if self.client_secret.is_empty() {
            tracing::debug!("Client secret not configured, using client id only");
            return Ok(headers);
        }

        let access_token = self.access_token().await?;
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {access_token}"))?,
        );
        Ok(headers)
    }

    async fn access_token(&self) -> Result<String, TwitchError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now().timestamp();

        if let Some(token) = cached.as_ref() {
            if token.is_valid_at(now) {
                tracing::trace!(expires_at = token.expires_at, "Using cached access token");
                return Ok(token.access_token.clone());
            }
            tracing::debug!(expires_at = token.expires_at, "Cached access token expired");
        }

        let token = self.request_token().await?;
        tracing::info!(expires_at = token.expires_at, "Obtained new app access token");
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn request_token(&self) -> Result<Token, TwitchError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let resp = self.http.post(&self.token_url).form(&params).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let err: ErrorResponse = serde_json::from_str(&body).unwrap_or(ErrorResponse {
                error: Some(status.to_string()),
                message: Some(body.clone()),
            });
            return Err(TwitchError::TokenRefreshFailed(format!(
                "{}: {}",
                err.error.unwrap_or_else(|| status.to_string()),
                err.message.unwrap_or_default()
            )));
        }

        let token_resp: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            TwitchError::TokenRefreshFailed(format!("failed to parse response: {e}"))
        })?;

        Ok(Token {
            access_token: token_resp.access_token,
            refresh_token: token_resp.refresh_token.unwrap_or_default(),
            scope: token_resp.scope.map(ScopeField::joined).unwrap_or_default(),
            expires_at: Utc::now().timestamp() + token_resp.expires_in,
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TwitchError> {
    HeaderValue::from_str(value)
        .map_err(|_| TwitchError::Config(format!("invalid header value: {value:?}")))
}
