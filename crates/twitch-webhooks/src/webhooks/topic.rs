use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use url::Url;

use crate::TwitchError;

/// Class of push event a subscription delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Streams,
    Follows,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Streams => "streams",
            Self::Follows => "follows",
        }
    }

    /// Hub topic URL for `user_id`, rooted at the Helix base.
    pub(crate) fn topic_url(self, api_base: &str, user_id: &str) -> Result<Url, TwitchError> {
        let base = api_base.trim_end_matches('/');
        let url = match self {
            Self::Streams => {
                Url::parse_with_params(&format!("{base}/streams"), &[("user_id", user_id)])?
            }
            Self::Follows => Url::parse_with_params(
                &format!("{base}/users/follows"),
                &[("first", "1"), ("to_id", user_id)],
            )?,
        };
        Ok(url)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = TwitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "streams" => Ok(Self::Streams),
            "follows" => Ok(Self::Follows),
            other => Err(TwitchError::InvalidTopic(other.to_string())),
        }
    }
}

/// Registry key: one live watcher per `(topic, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub topic: Topic,
    pub user_id: String,
}

impl SubscriptionKey {
    pub fn new(topic: Topic, user_id: impl Into<String>) -> Self {
        Self {
            topic,
            user_id: user_id.into(),
        }
    }

    /// Callback URL carrying `topic` and `user_id` so inbound traffic can be
    /// routed without extra state.
    pub(crate) fn callback_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.query_pairs_mut()
            .append_pair("user_id", &self.user_id)
            .append_pair("topic", self.topic.as_str());
        url
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.user_id)
    }
}

/// Body of POST /webhooks/hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct HubRequest {
    #[serde(rename = "hub.mode")]
    pub mode: &'static str,
    #[serde(rename = "hub.topic")]
    pub topic: String,
    #[serde(rename = "hub.callback")]
    pub callback: String,
    #[serde(rename = "hub.lease_seconds", skip_serializing_if = "String::is_empty")]
    pub lease_seconds: String,
    #[serde(rename = "hub.secret", skip_serializing_if = "String::is_empty")]
    pub secret: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_round_trips_through_wire_name() {
        assert_eq!("streams".parse::<Topic>().unwrap(), Topic::Streams);
        assert_eq!("follows".parse::<Topic>().unwrap(), Topic::Follows);
        assert!(matches!(
            "subs".parse::<Topic>(),
            Err(TwitchError::InvalidTopic(t)) if t == "subs"
        ));
    }

    #[test]
    fn topic_urls_match_helix_resources() {
        let base = "https://api.twitch.tv/helix/";
        assert_eq!(
            Topic::Streams.topic_url(base, "42").unwrap().as_str(),
            "https://api.twitch.tv/helix/streams?user_id=42"
        );
        assert_eq!(
            Topic::Follows.topic_url(base, "42").unwrap().as_str(),
            "https://api.twitch.tv/helix/users/follows?first=1&to_id=42"
        );
    }

    #[test]
    fn callback_url_embeds_routing_params() {
        let base = Url::parse("https://bot.example.com/twitch/webhook").unwrap();
        let key = SubscriptionKey::new(Topic::Streams, "42");
        assert_eq!(
            key.callback_url(&base).as_str(),
            "https://bot.example.com/twitch/webhook?user_id=42&topic=streams"
        );
        assert_eq!(key.to_string(), "streams/42");
    }

    #[test]
    fn hub_request_uses_dotted_field_names() {
        let req = HubRequest {
            mode: "subscribe",
            topic: "t".into(),
            callback: "c".into(),
            lease_seconds: "600".into(),
            secret: String::new(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["hub.mode"], "subscribe");
        assert_eq!(value["hub.lease_seconds"], "600");
        assert!(value.get("hub.secret").is_none());
    }
}
