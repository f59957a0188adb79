//! Twitch Helix client with webhook push subscriptions.
//!
//! Provides app-token caching, an authenticated Helix transport, and the
//! webhook subscription subsystem: a registry of live watchers, lease
//! renewal, and the inbound callback handler that answers hub challenges
//! and routes delivered events to consumers.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};

pub use client::TwitchClient;
pub use config::ClientConfig;
pub use webhooks::{Follow, Stream, StreamEvent, SubscriptionKey, Topic, Watcher};

/// App access token obtained through the client credentials grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub expires_at: i64,
}

impl Token {
    /// A token is reusable only while its expiry lies in the future.
    pub fn is_valid_at(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

/// Unified error type for the twitch-webhooks crate.
#[derive(Debug, thiserror::Error)]
pub enum TwitchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Token request failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Twitch API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Already subscribed to {topic}/{user_id}")]
    AlreadySubscribed { topic: Topic, user_id: String },

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Subscription denied by hub")]
    Denied,

    #[error("Client closed")]
    Closed,

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_invalid_at_and_after_expiry() {
        let token = Token {
            access_token: "abc".into(),
            refresh_token: String::new(),
            scope: String::new(),
            expires_at: 1_000,
        };
        assert!(token.is_valid_at(999));
        assert!(!token.is_valid_at(1_000));
        assert!(!token.is_valid_at(1_001));
    }
}
