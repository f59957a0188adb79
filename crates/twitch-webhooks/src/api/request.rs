use std::sync::Arc;

use reqwest::header::{CONTENT_TYPE, HeaderValue, USER_AGENT as USER_AGENT_HEADER};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::*;
use crate::TwitchError;
use crate::auth::TokenCache;

/// Status code and unwrapped `data` payload of one Helix call.
#[derive(Debug)]
pub struct HelixReply {
    pub status: StatusCode,
    pub envelope: HelixEnvelope,
}

impl HelixReply {
    /// Fail with [`TwitchError::ApiError`] unless the status is `expected`.
    pub fn expect_status(self, expected: StatusCode) -> Result<Self, TwitchError> {
        if self.status != expected {
            return Err(TwitchError::ApiError {
                status: self.status.as_u16(),
                message: format!("unexpected status code (wanted {expected})"),
            });
        }
        Ok(self)
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        self.envelope.data.as_ref()
    }

    pub fn list<T: DeserializeOwned>(&self) -> Result<Vec<T>, TwitchError> {
        self.envelope.list()
    }
}

/// Helix transport with automatic auth header injection.
#[derive(Clone)]
pub struct HelixTransport {
    http: reqwest::Client,
    base: String,
    tokens: Arc<TokenCache>,
}

impl HelixTransport {
    pub fn new(http: reqwest::Client, base: &str, tokens: Arc<TokenCache>) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Build `<base>/<path>?<query>`.
    pub fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, TwitchError> {
        let mut url = Url::parse(&format!("{}/{}", self.base, path.trim_start_matches('/')))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Execute an authenticated request and unwrap the response envelope.
    ///
    /// The status code is not interpreted here.
    pub async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<HelixReply, TwitchError> {
        let url = self.endpoint(path, query)?;
        let mut headers = self.tokens.auth_headers().await?;
        headers.insert(USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut req = self.http.request(method.clone(), url.clone()).headers(headers);
        if let Some(body) = body {
            req = req.body(serde_json::to_vec(body)?);
        }

        tracing::debug!(%method, %url, "Helix request");
        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        tracing::trace!(
            %method,
            %url,
            status = status.as_u16(),
            body = %String::from_utf8_lossy(&bytes),
            "Helix response"
        );

        let envelope = HelixEnvelope::parse(&bytes)?;
        Ok(HelixReply { status, envelope })
    }
}
