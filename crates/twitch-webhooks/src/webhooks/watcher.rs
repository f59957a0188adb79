use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use reqwest::{Method, StatusCode};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::registry::Registry;
use super::topic::HubRequest;
use super::*;
use crate::TwitchError;
use crate::api::HelixTransport;

const HUB_PATH: &str = "webhooks/hub";

/// Client-wide settings every watcher subscribes with.
pub(crate) struct HubContext {
    pub transport: HelixTransport,
    pub callback_url: Url,
    pub secret: String,
    pub lease: Duration,
    pub queue_capacity: usize,
}

/// Resubscribe ~10% before the lease actually expires.
pub(crate) fn renewal_period(lease: Duration) -> Duration {
    lease * 9 / 10
}

/// Registry-side half of a watcher: the delivery queues, the renewal
/// scope and the hub protocol calls.
pub(crate) struct WatcherShared {
    key: SubscriptionKey,
    hub: Arc<HubContext>,
    cancel: CancellationToken,
    closed: AtomicBool,
    streams: Mutex<Option<broadcast::Sender<StreamEvent>>>,
    follows: Mutex<Option<broadcast::Sender<Follow>>>,
    registry: Weak<Registry>,
}

impl WatcherShared {
    pub(crate) fn new(
        key: SubscriptionKey,
        hub: Arc<HubContext>,
        parent: &CancellationToken,
        registry: Weak<Registry>,
    ) -> (Arc<Self>, Watcher) {
        let capacity = hub.queue_capacity.max(1);
        let (streams_tx, streams_rx) = broadcast::channel(capacity);
        let (follows_tx, follows_rx) = broadcast::channel(capacity);
        let watcher_key = key.clone();
        let shared = Arc::new(Self {
            key,
            hub,
            cancel: parent.child_token(),
            closed: AtomicBool::new(false),
            streams: Mutex::new(Some(streams_tx)),
            follows: Mutex::new(Some(follows_tx)),
            registry,
        });
        let watcher = Watcher {
            shared: shared.clone(),
            streams: EventReceiver::new(streams_rx, capacity, watcher_key.clone()),
            follows: EventReceiver::new(follows_rx, capacity, watcher_key),
        };
        (shared, watcher)
    }

    pub(crate) fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub(crate) async fn subscribe(&self) -> Result<(), TwitchError> {
        self.hub_request("subscribe").await
    }

    async fn hub_request(&self, mode: &'static str) -> Result<(), TwitchError> {
        let topic = self
            .key
            .topic
            .topic_url(self.hub.transport.base(), &self.key.user_id)?;
        let body = HubRequest {
            mode,
            topic: topic.into(),
            callback: self.key.callback_url(&self.hub.callback_url).into(),
            lease_seconds: self.hub.lease.as_secs().to_string(),
            secret: self.hub.secret.clone(),
        };

        self.hub
            .transport
            .call(Method::POST, HUB_PATH, &[], Some(&body))
            .await?
            .expect_status(StatusCode::ACCEPTED)?;
        tracing::debug!(key = %self.key, mode, "Hub accepted request");
        Ok(())
    }

    /// Keep the subscription alive until the watcher is cancelled.
    ///
    /// A failed renewal is retried on the next tick; the watcher stays open.
    pub(crate) async fn renew_loop(self: Arc<Self>) {
        let period = renewal_period(self.hub.lease);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!(key = %self.key, "Renewal loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    tracing::debug!(key = %self.key, "Re-subscribing to topic");
                    match self.subscribe().await {
                        Ok(()) => tracing::info!(key = %self.key, "Re-subscribed to topic"),
                        Err(e) => tracing::warn!(
                            key = %self.key,
                            error = %e,
                            retry_in_secs = period.as_secs(),
                            "Re-subscribe failed, will retry"
                        ),
                    }
                }
            }
        }
    }

    pub(crate) fn deliver_stream(&self, event: StreamEvent) {
        push(&self.key, "stream", &self.streams, event);
    }

    pub(crate) fn deliver_follow(&self, follow: Follow) {
        push(&self.key, "follow", &self.follows, follow);
    }

    /// Tear the watcher down. Only the first call does anything; it returns
    /// `true` for that call.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.cancel();
        // Dropping the senders ends both streams once they are drained.
        lock(&self.streams).take();
        lock(&self.follows).take();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_exact(&self.key, self);
        }
        tracing::info!(key = %self.key, "Watcher closed");
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Send under the slot lock so a push racing `close` either lands before the
/// sender is dropped or is discarded.
fn push<T>(key: &SubscriptionKey, kind: &str, slot: &Mutex<Option<broadcast::Sender<T>>>, event: T) {
    match lock(slot).as_ref() {
        Some(tx) => {
            if tx.send(event).is_err() {
                tracing::debug!(%key, kind, "No consumer, event discarded");
            }
        }
        None => tracing::debug!(%key, kind, "Watcher closed, event discarded"),
    }
}

/// Receiving half of one watcher queue.
///
/// Holds at most `capacity` events. A consumer that falls behind loses the
/// oldest ones and keeps the newest.
pub struct EventReceiver<T> {
    rx: broadcast::Receiver<T>,
    capacity: usize,
    key: SubscriptionKey,
}

impl<T: Clone> EventReceiver<T> {
    fn new(rx: broadcast::Receiver<T>, capacity: usize, key: SubscriptionKey) -> Self {
        Self { rx, capacity, key }
    }

    /// Next event, or `None` once the watcher is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.trim();
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.trim();
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len().min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    // The channel rounds its buffer up to a power of two; skip anything
    // beyond the configured capacity.
    fn trim(&mut self) {
        let mut skipped = 0;
        while self.rx.len() > self.capacity {
            match self.rx.try_recv() {
                Ok(_) => skipped += 1,
                Err(TryRecvError::Lagged(n)) => skipped += n,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        if skipped > 0 {
            self.lagged(skipped);
        }
    }

    fn lagged(&self, skipped: u64) {
        tracing::warn!(key = %self.key, skipped, "Consumer is behind, dropped oldest events");
    }
}

/// Caller's handle to one live webhook subscription.
///
/// Events arrive on per-kind queues; only the queue matching the topic is
/// ever fed. Dropping the handle closes the subscription.
pub struct Watcher {
    shared: Arc<WatcherShared>,
    streams: EventReceiver<StreamEvent>,
    follows: EventReceiver<Follow>,
}

impl Watcher {
    pub fn key(&self) -> &SubscriptionKey {
        &self.shared.key
    }

    pub fn topic(&self) -> Topic {
        self.shared.key.topic
    }

    pub fn user_id(&self) -> &str {
        &self.shared.key.user_id
    }

    /// Next stream up/down event, or `None` once closed and drained.
    pub async fn next_stream(&mut self) -> Option<StreamEvent> {
        self.streams.recv().await
    }

    /// Next follow event, or `None` once closed and drained.
    pub async fn next_follow(&mut self) -> Option<Follow> {
        self.follows.recv().await
    }

    pub fn streams(&mut self) -> &mut EventReceiver<StreamEvent> {
        &mut self.streams
    }

    pub fn follows(&mut self) -> &mut EventReceiver<Follow> {
        &mut self.follows
    }

    /// Stop renewing, end both event streams and leave the registry.
    /// Repeated calls are no-ops.
    pub fn close(&self) -> bool {
        self.shared.close()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Ask the hub to end the subscription, then close the watcher.
    ///
    /// The watcher is closed even when the hub rejects the request.
    pub async fn unsubscribe(&self) -> Result<(), TwitchError> {
        let result = self.shared.hub_request("unsubscribe").await;
        if let Err(e) = &result {
            tracing::warn!(key = %self.shared.key, error = %e, "Unsubscribe request failed");
        }
        self.shared.close();
        result
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("key", &self.shared.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.shared.close();
    }
}
