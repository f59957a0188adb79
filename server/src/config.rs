//! Runtime configuration loaded from environment variables (and `.env`).

use std::time::Duration;

use twitch_webhooks::ClientConfig;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LEASE_SECS: u64 = 600;
const DEFAULT_QUEUE_CAPACITY: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub server_port: u16,
    pub lease_secs: u64,
    pub queue_capacity: usize,
    /// User ids whose stream up/down events are watched.
    pub watch_streams: Vec<String>,
    /// User ids whose new followers are watched.
    pub watch_follows: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            callback_url: String::new(),
            server_port: DEFAULT_PORT,
            lease_secs: DEFAULT_LEASE_SECS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            watch_streams: Vec::new(),
            watch_follows: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn load() -> Self {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve each key.
    pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let g = |key: &str| -> String { lookup(key).unwrap_or_default().trim().to_string() };

        Self {
            client_id: g("CLIENT_ID"),
            client_secret: g("CLIENT_SECRET"),
            callback_url: g("CALLBACK_URL"),
            server_port: parse_u16(&g("SERVER_PORT"), DEFAULT_PORT),
            lease_secs: parse_u64(&g("LEASE_SECONDS"), DEFAULT_LEASE_SECS).max(1),
            queue_capacity: parse_u64(&g("QUEUE_CAPACITY"), DEFAULT_QUEUE_CAPACITY as u64)
                .max(1) as usize,
            watch_streams: parse_list(&g("WATCH_STREAMS")),
            watch_follows: parse_list(&g("WATCH_FOLLOWS")),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            callback_url: self.callback_url.clone(),
            lease: Duration::from_secs(self.lease_secs),
            queue_capacity: self.queue_capacity,
            ..ClientConfig::default()
        }
    }

    /// Settings whose absence disables part of the server.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.is_empty() {
            missing.push("CLIENT_ID");
        }
        if self.callback_url.is_empty() {
            missing.push("CALLBACK_URL");
        }
        missing
    }
}

/// Load .env from multiple candidate paths.
pub fn load_dotenv() {
    let candidates = [".env", "../.env", "../../.env"];
    for path in &candidates {
        if dotenvy::from_filename(path).is_ok() {
            tracing::info!("Loaded .env from: {path}");
            return;
        }
    }
    tracing::info!("No .env file found, using system environment variables");
}

fn parse_u16(s: &str, default: u16) -> u16 {
    if s.is_empty() {
        return default;
    }
    s.parse().unwrap_or(default)
}

fn parse_u64(s: &str, default: u64) -> u64 {
    if s.is_empty() {
        return default;
    }
    s.parse().unwrap_or(default)
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::load_from(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = load(&[]);
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.missing_settings(), vec!["CLIENT_ID", "CALLBACK_URL"]);
    }

    #[test]
    fn values_are_parsed() {
        let config = load(&[
            ("CLIENT_ID", "abc"),
            ("CLIENT_SECRET", "shh"),
            ("CALLBACK_URL", "https://bot.example.com/twitch/webhook"),
            ("SERVER_PORT", "9000"),
            ("LEASE_SECONDS", "3600"),
            ("QUEUE_CAPACITY", "16"),
            ("WATCH_STREAMS", "42, 43,,"),
            ("WATCH_FOLLOWS", " 42 "),
        ]);

        assert_eq!(config.server_port, 9000);
        assert_eq!(config.lease_secs, 3600);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.watch_streams, vec!["42", "43"]);
        assert_eq!(config.watch_follows, vec!["42"]);
        assert!(config.missing_settings().is_empty());

        let client = config.client_config();
        assert_eq!(client.client_id, "abc");
        assert_eq!(client.lease, Duration::from_secs(3600));
        assert_eq!(client.queue_capacity, 16);
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let config = load(&[
            ("SERVER_PORT", "eighty"),
            ("LEASE_SECONDS", "-5"),
            ("QUEUE_CAPACITY", "0"),
        ]);
        assert_eq!(config.server_port, DEFAULT_PORT);
        assert_eq!(config.lease_secs, DEFAULT_LEASE_SECS);
        assert_eq!(config.queue_capacity, 1);
    }
}
