use serde::{Deserialize, Serialize};

use crate::TwitchError;

/// Top-level Helix response wrapper. `data` is absent for empty bodies.
#[derive(Debug, Default, Deserialize)]
pub struct HelixEnvelope {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl HelixEnvelope {
    /// Decode a raw body. An empty body yields an envelope without data.
    pub fn parse(body: &[u8]) -> Result<Self, TwitchError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(body)?)
    }

    /// Decode `data` as a list, treating absent or null data as empty.
    pub fn list<T: serde::de::DeserializeOwned>(&self) -> Result<Vec<T>, TwitchError> {
        match &self.data {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(value) => Ok(Vec::<T>::deserialize(value)?),
        }
    }
}

/// Stream information as returned by GET /helix/streams and pushed to the
/// `streams` webhook topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub community_ids: Vec<String>,
    #[serde(rename = "type", default)]
    pub stream_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewer_count: u64,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub thumbnail_url: String,
}

/// Follow relationship pushed to the `follows` webhook topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Follow {
    pub from_id: String,
    pub to_id: String,
    #[serde(default)]
    pub followed_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_has_no_data() {
        let envelope = HelixEnvelope::parse(b"").unwrap();
        assert!(envelope.data.is_none());
        assert!(envelope.list::<Stream>().unwrap().is_empty());

        let envelope = HelixEnvelope::parse(b" \n").unwrap();
        assert!(envelope.data.is_none());
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let err = HelixEnvelope::parse(b"{not json").unwrap_err();
        assert!(matches!(err, TwitchError::Decode(_)));
    }

    #[test]
    fn stream_deserializes_with_missing_optional_fields() {
        let body = br#"{
          "data": [{
            "user_id": "42",
            "game_id": "509658",
            "title": "title",
            "viewer_count": 10,
            "started_at": "2026-02-16T00:00:00Z",
            "type": "live"
          }]
        }"#;

        let streams: Vec<Stream> = HelixEnvelope::parse(body).unwrap().list().unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].user_id, "42");
        assert_eq!(streams[0].viewer_count, 10);
        assert_eq!(streams[0].stream_type, "live");
        assert!(streams[0].language.is_empty());
    }

    #[test]
    fn follow_deserializes() {
        let body = br#"{"data":[{"from_id":"1","to_id":"42","followed_at":"2026-02-16T00:00:00Z"}]}"#;
        let follows: Vec<Follow> = HelixEnvelope::parse(body).unwrap().list().unwrap();
        assert_eq!(
            follows,
            vec![Follow {
                from_id: "1".into(),
                to_id: "42".into(),
                followed_at: "2026-02-16T00:00:00Z".into(),
            }]
        );
    }
}
