//! Client configuration.

use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.twitch.tv/helix";
pub const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Settings for a [`TwitchClient`](crate::TwitchClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: String,
    /// Empty means identifier-only requests (no app token is fetched).
    pub client_secret: String,
    /// Public URL the hub calls back. Required only for watching.
    pub callback_url: String,
    pub api_base: String,
    pub token_url: String,
    pub request_timeout: Duration,
    pub lease: Duration,
    /// Buffered events per watcher queue before the oldest is dropped.
    pub queue_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            callback_url: String::new(),
            api_base: DEFAULT_API_BASE.into(),
            token_url: DEFAULT_TOKEN_URL.into(),
            request_timeout: Duration::from_secs(10),
            lease: Duration::from_secs(600),
            queue_capacity: 5,
        }
    }
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    pub fn with_callback_url(mut self, callback_url: impl Into<String>) -> Self {
        self.callback_url = callback_url.into();
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}
