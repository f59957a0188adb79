//! Twitch Helix REST transport.
//!
//! Issues authenticated requests against the Helix API and unwraps the
//! `{"data": ...}` envelope. Status codes are handed back to the caller,
//! which decides what counts as success.

mod request;

pub mod models;

pub use models::{Follow, HelixEnvelope, Stream};
pub use request::{HelixReply, HelixTransport};

const USER_AGENT: &str = concat!("twitch-webhooks/", env!("CARGO_PKG_VERSION"));
