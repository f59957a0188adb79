//! Inbound webhook handler.
//!
//! Answers hub challenges and routes delivered events to the watcher named
//! by the `topic`/`user_id` query parameters of the callback URL. Every
//! request is acknowledged with 200: the hub treats anything else as a
//! failed delivery and retries, so failures are only logged.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use super::registry::Registry;
use super::watcher::WatcherShared;
use super::*;
use crate::api::HelixEnvelope;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// What the handler answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookReply {
    /// 200 with the challenge echoed verbatim.
    Challenge(String),
    /// Empty 200.
    Ack,
}

impl IntoResponse for WebhookReply {
    fn into_response(self) -> Response {
        match self {
            Self::Challenge(challenge) => (StatusCode::OK, challenge).into_response(),
            Self::Ack => StatusCode::OK.into_response(),
        }
    }
}

pub struct WebhookDispatcher {
    registry: Arc<Registry>,
}

impl WebhookDispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Router serving the callback at `path` for both GET (challenges) and
    /// POST (deliveries).
    pub fn router(self: Arc<Self>, path: &str) -> Router {
        Router::new()
            .route(path, get(handle_webhook).post(handle_webhook))
            .with_state(self)
    }

    /// Handle one inbound request given its raw query string and body.
    pub fn dispatch(&self, query: Option<&str>, body: &[u8]) -> WebhookReply {
        let params: HashMap<String, String> = url::form_urlencoded::parse(
            query.unwrap_or_default().as_bytes(),
        )
        .into_owned()
        .collect();
        let param = |name: &str| params.get(name).map(String::as_str).unwrap_or_default();

        match param("hub.mode") {
            mode @ ("subscribe" | "unsubscribe") => {
                tracing::info!(
                    mode,
                    topic = param("hub.topic"),
                    "Answering hub challenge"
                );
                WebhookReply::Challenge(param("hub.challenge").to_string())
            }
            "denied" => {
                self.handle_denied(param("topic"), param("user_id"), param("hub.reason"));
                WebhookReply::Ack
            }
            "" => {
                self.handle_delivery(param("topic"), param("user_id"), body);
                WebhookReply::Ack
            }
            other => {
                tracing::warn!(mode = other, "Ignoring webhook with unknown hub.mode");
                WebhookReply::Ack
            }
        }
    }

    fn handle_denied(&self, topic: &str, user_id: &str, reason: &str) {
        let Ok(topic) = topic.parse::<Topic>() else {
            tracing::warn!(topic, user_id, reason, "Subscription denied for unknown topic");
            return;
        };
        let removed = self.registry.remove(topic, user_id);
        tracing::warn!(%topic, user_id, reason, removed, "Subscription denied");
    }

    fn handle_delivery(&self, topic: &str, user_id: &str, body: &[u8]) {
        if topic.is_empty() || user_id.is_empty() {
            tracing::debug!("Ignoring event: missing topic/user_id params");
            return;
        }
        let Ok(topic) = topic.parse::<Topic>() else {
            tracing::warn!(topic, "Got event for unknown topic");
            return;
        };
        let Some(watcher) = self.registry.lookup(topic, user_id) else {
            tracing::debug!(%topic, user_id, "Got event for topic with no active watcher");
            return;
        };
        if let Err(e) = deliver(&watcher, body) {
            tracing::warn!(key = %watcher.key(), error = %e, "Failed to parse webhook body");
        }
    }
}

fn deliver(watcher: &WatcherShared, body: &[u8]) -> Result<(), crate::TwitchError> {
    let envelope = HelixEnvelope::parse(body)?;
    match watcher.key().topic {
        Topic::Streams => {
            let streams: Vec<Stream> = envelope.list()?;
            if streams.is_empty() {
                tracing::info!(key = %watcher.key(), "Stream is down");
                watcher.deliver_stream(StreamEvent::Offline);
                return Ok(());
            }
            tracing::info!(key = %watcher.key(), "Stream is up");
            for stream in streams {
                watcher.deliver_stream(StreamEvent::Online(stream));
            }
        }
        Topic::Follows => {
            let follows: Vec<Follow> = envelope.list()?;
            if follows.is_empty() {
                tracing::debug!(key = %watcher.key(), "Empty follow event");
            }
            for follow in follows {
                tracing::info!(
                    key = %watcher.key(),
                    from_id = %follow.from_id,
                    to_id = %follow.to_id,
                    "New follow"
                );
                watcher.deliver_follow(follow);
            }
        }
    }
    Ok(())
}

async fn handle_webhook(
    State(dispatcher): State<Arc<WebhookDispatcher>>,
    RawQuery(query): RawQuery,
    body: Body,
) -> WebhookReply {
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot read webhook body");
            return WebhookReply::Ack;
        }
    };
    dispatcher.dispatch(query.as_deref(), &body)
}
