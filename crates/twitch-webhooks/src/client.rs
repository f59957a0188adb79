//! Client object owning the token cache, transport and webhook registry.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::api::HelixTransport;
use crate::auth::TokenCache;
use crate::config::ClientConfig;
use crate::TwitchError;
use crate::webhooks::{HubContext, Registry, Topic, Watcher, WebhookDispatcher};

/// Shortest lease sent to the hub; it is advertised in whole seconds.
const MIN_LEASE: Duration = Duration::from_secs(1);

/// Twitch client with webhook subscriptions.
///
/// Every client owns its own registry and token cache. Closing the client
/// cancels every watcher created through it.
pub struct TwitchClient {
    transport: HelixTransport,
    registry: Arc<Registry>,
    dispatcher: Arc<WebhookDispatcher>,
    callback_path: String,
    has_callback: bool,
    cancel: CancellationToken,
}

impl TwitchClient {
    pub fn new(config: ClientConfig) -> Result<Self, TwitchError> {
        Self::with_parent(config, &CancellationToken::new())
    }

    /// Build a client whose cancellation scope is a child of `parent`, so
    /// shutting down the embedding application also stops every watcher.
    pub fn with_parent(
        config: ClientConfig,
        parent: &CancellationToken,
    ) -> Result<Self, TwitchError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let tokens = Arc::new(TokenCache::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.token_url.clone(),
            http.clone(),
        ));
        let transport = HelixTransport::new(http, &config.api_base, tokens);

        let has_callback = !config.callback_url.is_empty();
        let callback_url = if has_callback {
            Url::parse(&config.callback_url)?
        } else {
            // Placeholder; `watch` refuses to run without a callback.
            Url::parse("http://localhost/")?
        };
        let callback_path = callback_url.path().to_string();

        let cancel = parent.child_token();
        let hub = Arc::new(HubContext {
            transport: transport.clone(),
            callback_url,
            secret: uuid::Uuid::new_v4().simple().to_string(),
            lease: config.lease.max(MIN_LEASE),
            queue_capacity: config.queue_capacity.max(1),
        });
        let registry = Registry::new(hub, cancel.clone());
        let dispatcher = Arc::new(WebhookDispatcher::new(registry.clone()));

        Ok(Self {
            transport,
            registry,
            dispatcher,
            callback_path,
            has_callback,
            cancel,
        })
    }

    pub fn transport(&self) -> &HelixTransport {
        &self.transport
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<WebhookDispatcher> {
        &self.dispatcher
    }

    /// Router serving the webhook callback on the callback URL's path.
    pub fn webhook_router(&self) -> Router {
        self.dispatcher.clone().router(&self.callback_path)
    }

    /// Subscribe to `topic` events for `user_id`.
    pub async fn watch(&self, topic: Topic, user_id: &str) -> Result<Watcher, TwitchError> {
        if !self.has_callback {
            return Err(TwitchError::Config(
                "callback url is required for webhooks".into(),
            ));
        }
        self.registry.add(topic, user_id).await
    }

    /// Watch a channel going live or offline.
    pub async fn watch_stream(&self, user_id: &str) -> Result<Watcher, TwitchError> {
        self.watch(Topic::Streams, user_id).await
    }

    /// Watch new followers of a channel.
    pub async fn watch_follows(&self, user_id: &str) -> Result<Watcher, TwitchError> {
        self.watch(Topic::Follows, user_id).await
    }

    /// Cancel every watcher's renewal and end all event streams.
    pub fn close(&self) {
        self.cancel.cancel();
        let watchers = self.registry.drain();
        tracing::info!(count = watchers.len(), "Closing Twitch client");
        for watcher in watchers {
            watcher.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockHub, spawn_mock};
    use crate::webhooks::StreamEvent;

    #[tokio::test]
    async fn watch_requires_callback_url() {
        let hub = MockHub::start().await;
        let mut config = hub.config();
        config.callback_url = String::new();
        let client = TwitchClient::new(config).unwrap();

        let err = client.watch_stream("42").await.unwrap_err();
        assert!(matches!(err, TwitchError::Config(_)));
        assert!(hub.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_client_id_fails_subscribe() {
        let hub = MockHub::start().await;
        let mut config = hub.config();
        config.client_id = String::new();
        let client = TwitchClient::new(config).unwrap();

        let err = client.watch_follows("42").await.unwrap_err();
        assert!(matches!(err, TwitchError::Config(_)));
        assert!(client.registry().is_empty());
    }

    #[tokio::test]
    async fn close_ends_every_watcher() {
        let hub = MockHub::start().await;
        let client = TwitchClient::new(hub.config()).unwrap();
        let mut streams = client.watch_stream("42").await.unwrap();
        let mut follows = client.watch_follows("42").await.unwrap();
        assert_eq!(client.registry().len(), 2);

        client.close();

        assert!(client.is_closed());
        assert!(client.registry().is_empty());
        assert_eq!(streams.next_stream().await, None);
        assert_eq!(follows.next_follow().await, None);
        assert!(matches!(
            client.watch_stream("43").await,
            Err(TwitchError::Closed)
        ));
    }

    #[tokio::test]
    async fn zero_lease_and_capacity_are_clamped() {
        let hub = MockHub::start().await;
        let mut config = hub.config().with_lease(Duration::ZERO);
        config.queue_capacity = 0;
        let client = TwitchClient::new(config).unwrap();

        let watcher = client.watch_stream("42").await.unwrap();
        assert_eq!(hub.requests()[0]["hub.lease_seconds"], "1");

        // The renewal task runs on a one second lease instead of panicking.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(hub.requests().len() >= 2);
        assert!(!watcher.is_closed());
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_client() {
        let hub = MockHub::start().await;
        let app = CancellationToken::new();
        let client = TwitchClient::with_parent(hub.config(), &app).unwrap();

        app.cancel();
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn stream_goes_live_end_to_end() {
        let hub = MockHub::start().await;
        let client = TwitchClient::new(hub.config()).unwrap();

        let mut watcher = client.watch_stream("42").await.unwrap();
        assert_eq!(hub.requests().len(), 1);

        let callback = spawn_mock(client.webhook_router()).await;
        let http = reqwest::Client::new();

        let challenge = http
            .get(format!(
                "{callback}/twitch/webhook?user_id=42&topic=streams&hub.mode=subscribe&hub.topic=x&hub.challenge=abc123&hub.lease_seconds=600"
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(challenge.status(), reqwest::StatusCode::OK);
        assert_eq!(challenge.text().await.unwrap(), "abc123");

        let delivery = http
            .post(format!("{callback}/twitch/webhook?topic=streams&user_id=42"))
            .header("Content-Type", "application/json")
            .body(r#"{"data":[{"id":"1","user_id":"42","game_id":"33214","type":"live","title":"t","viewer_count":10,"started_at":"2026-02-16T00:00:00Z","language":"en","thumbnail_url":"x"}]}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(delivery.status(), reqwest::StatusCode::OK);

        match watcher.next_stream().await {
            Some(StreamEvent::Online(stream)) => assert_eq!(stream.viewer_count, 10),
            other => panic!("expected online event, got {other:?}"),
        }

        // Garbage still gets a 200.
        let garbage = http
            .post(format!("{callback}/twitch/webhook?topic=streams&user_id=42"))
            .body("{oops")
            .send()
            .await
            .unwrap();
        assert_eq!(garbage.status(), reqwest::StatusCode::OK);
        assert!(watcher.streams().is_empty());
    }
}
