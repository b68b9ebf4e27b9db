//! Feed item model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single post in the feed.
///
/// Identity is `id`; `time` is the secondary ordering key used by the
/// `by-date` index. Fields the store doesn't interpret (body, author name,
/// ...) ride along in `payload` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    #[serde(with = "wire_time")]
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub avatar: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl FeedItem {
    /// Index key: milliseconds since the epoch.
    pub fn time_key(&self) -> i64 {
        self.time.timestamp_millis()
    }

    /// Image paths this item references, photo first.
    pub fn image_refs(&self) -> impl Iterator<Item = &str> {
        self.photo.as_deref().into_iter().chain(std::iter::once(self.avatar.as_str()))
    }
}

/// Decode a live-update message: a bare JSON array of items, no envelope.
pub fn parse_batch(raw: &str) -> Result<Vec<FeedItem>, crate::Error> {
    serde_json::from_str(raw).map_err(|e| crate::Error::InvalidMessage(e.to_string()))
}

/// Times arrive either as RFC 3339 strings or as epoch milliseconds and are
/// always written back as RFC 3339.
mod wire_time {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireTime {
        Millis(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        match WireTime::deserialize(deserializer)? {
            WireTime::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {ms}"))),
            WireTime::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(D::Error::custom),
        }
    }
}
