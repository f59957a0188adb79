//! Registry of live webhook subscriptions.
//!
//! One mutex guards a plain map and is never held across an `.await`. A key
//! is reserved as pending while its subscribe request is in flight, so a
//! duplicate `add` is rejected immediately but the watcher cannot be found
//! by the dispatcher until the hub has accepted the subscription.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use super::watcher::{HubContext, WatcherShared};
use super::*;
use crate::TwitchError;

enum Slot {
    Pending(u64),
    Active(Arc<WatcherShared>),
}

pub struct Registry {
    entries: Mutex<HashMap<SubscriptionKey, Slot>>,
    next_reservation: AtomicU64,
    hub: Arc<HubContext>,
    cancel: CancellationToken,
}

impl Registry {
    pub(crate) fn new(hub: Arc<HubContext>, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            next_reservation: AtomicU64::new(1),
            hub,
            cancel,
        })
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SubscriptionKey, Slot>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Subscribe to `topic` for `user_id` and return the new watcher.
    ///
    /// Fails with [`TwitchError::AlreadySubscribed`] if the key is pending or
    /// active. A failed subscribe request frees the key again.
    pub async fn add(self: &Arc<Self>, topic: Topic, user_id: &str) -> Result<Watcher, TwitchError> {
        if self.cancel.is_cancelled() {
            return Err(TwitchError::Closed);
        }

        let key = SubscriptionKey::new(topic, user_id);
        let id = self.next_reservation.fetch_add(1, Ordering::Relaxed);
        {
            let mut entries = self.entries();
            if entries.contains_key(&key) {
                return Err(TwitchError::AlreadySubscribed {
                    topic,
                    user_id: user_id.to_string(),
                });
            }
            entries.insert(key.clone(), Slot::Pending(id));
        }
        // Released on every early exit, including the future being dropped
        // while the subscribe request is in flight.
        let mut reservation = Reservation {
            registry: self,
            key: key.clone(),
            id,
            armed: true,
        };

        let (shared, watcher) = WatcherShared::new(
            key.clone(),
            self.hub.clone(),
            &self.cancel,
            Arc::downgrade(self),
        );

        if let Err(e) = shared.subscribe().await {
            tracing::warn!(%key, error = %e, "Subscribe request failed");
            return Err(e);
        }

        let activated = {
            let mut entries = self.entries();
            let reserved = !self.cancel.is_cancelled()
                && matches!(entries.get(&key), Some(Slot::Pending(r)) if *r == id);
            if reserved {
                entries.insert(key.clone(), Slot::Active(shared.clone()));
                reservation.armed = false;
            }
            reserved
        };
        if !activated {
            tracing::warn!(%key, "Subscription removed while subscribing");
            return Err(if self.cancel.is_cancelled() {
                TwitchError::Closed
            } else {
                TwitchError::Denied
            });
        }

        tokio::spawn(shared.renew_loop());
        tracing::info!(%key, lease_secs = self.hub.lease.as_secs(), "Watching topic");
        Ok(watcher)
    }

    fn release(&self, key: &SubscriptionKey, id: u64) {
        let mut entries = self.entries();
        if matches!(entries.get(key), Some(Slot::Pending(r)) if *r == id) {
            entries.remove(key);
        }
    }

    /// Drop the subscription for `(topic, user_id)` and close its watcher.
    /// Returns whether anything was registered; absent keys are not an error.
    pub fn remove(&self, topic: Topic, user_id: &str) -> bool {
        let key = SubscriptionKey::new(topic, user_id);
        let removed = self.entries().remove(&key);
        match removed {
            Some(Slot::Active(watcher)) => {
                watcher.close();
                true
            }
            Some(Slot::Pending(_)) => true,
            None => false,
        }
    }

    /// Active watcher for `(topic, user_id)`. Pending subscriptions are not
    /// visible.
    pub(crate) fn lookup(&self, topic: Topic, user_id: &str) -> Option<Arc<WatcherShared>> {
        match self.entries().get(&SubscriptionKey::new(topic, user_id)) {
            Some(Slot::Active(watcher)) => Some(watcher.clone()),
            _ => None,
        }
    }

    pub fn is_active(&self, topic: Topic, user_id: &str) -> bool {
        self.lookup(topic, user_id).is_some()
    }

    /// Remove `key` only if it still maps to `watcher`.
    pub(crate) fn remove_exact(&self, key: &SubscriptionKey, watcher: &WatcherShared) {
        let mut entries = self.entries();
        if matches!(entries.get(key), Some(Slot::Active(w)) if std::ptr::eq(Arc::as_ptr(w), watcher))
        {
            entries.remove(key);
        }
    }

    /// Empty the registry, returning the watchers that were active.
    pub(crate) fn drain(&self) -> Vec<Arc<WatcherShared>> {
        self.entries()
            .drain()
            .filter_map(|(_, slot)| match slot {
                Slot::Active(watcher) => Some(watcher),
                Slot::Pending(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pending slot owned by an in-flight `add`.
struct Reservation<'a> {
    registry: &'a Registry,
    key: SubscriptionKey,
    id: u64,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.release(&self.key, self.id);
        }
    }
}
