//! Webhook (WebSub) push subscriptions.
//!
//! A [`Registry`] maps `(topic, user_id)` to a live [`Watcher`]. Each
//! watcher subscribes through the Helix hub, renews at 90% of its lease and
//! receives events pushed to the callback endpoint served by
//! [`WebhookDispatcher`].

mod dispatcher;
mod registry;
mod topic;
mod watcher;

pub use crate::api::models::{Follow, Stream};
pub use dispatcher::{WebhookDispatcher, WebhookReply};
pub use registry::Registry;
pub use topic::{SubscriptionKey, Topic};
pub use watcher::{EventReceiver, Watcher};

pub(crate) use watcher::HubContext;

/// State change pushed for a `streams` subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Online(Stream),
    /// The hub pushed an empty stream list: the subject went offline.
    Offline,
}
