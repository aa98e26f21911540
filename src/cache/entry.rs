//! Persisted cache entry
//!
//! One entry per content key, stored as a JSON string in a
//! [`KeyValueStorage`](super::KeyValueStorage) slot.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::store::ContentBlock;

/// A cached content block with its synchronization timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// The block exactly as the store returned it
    pub data: ContentBlock,
    /// When `data` was fetched (ms since epoch)
    pub fetched_at_epoch_millis: i64,
    /// Change-markers at or before this instant are already reflected in `data`
    pub last_meta_check_epoch_millis: i64,
}

impl CacheEntry {
    /// Create an entry for data fetched at `now`
    pub fn fetched(data: ContentBlock, now: i64) -> Self {
        Self {
            data,
            fetched_at_epoch_millis: now,
            last_meta_check_epoch_millis: now,
        }
    }

    /// Age of the entry at `now`, in milliseconds
    pub fn age_millis(&self, now: i64) -> i64 {
        now.saturating_sub(self.fetched_at_epoch_millis)
    }

    /// Whether the entry can still be served at `now`.
    ///
    /// An entry exactly `ttl` old is stale. An entry stamped in the future
    /// (clock moved backwards) is stale as well.
    pub fn is_fresh(&self, now: i64, ttl: Duration) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let age = self.age_millis(now);
        (0..ttl_ms).contains(&age)
    }

    /// Serialize for storage
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a stored entry
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(30 * 60);
    const TTL_MS: i64 = 30 * 60 * 1000;

    fn sample() -> CacheEntry {
        let data = match json!({ "title": "X", "images": ["a.png"], "cta": { "href": "/join" } }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        CacheEntry::fetched(data, 1_000)
    }

    #[test]
    fn test_round_trip_preserves_data() {
        let entry = sample();
        let decoded = CacheEntry::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_persisted_field_names() {
        let raw = sample().encode().unwrap();
        assert!(raw.contains("\"fetchedAtEpochMillis\":1000"));
        assert!(raw.contains("\"lastMetaCheckEpochMillis\":1000"));
        assert!(raw.contains("\"data\""));
    }

    #[test]
    fn test_freshness_boundary() {
        let entry = sample();
        assert!(entry.is_fresh(1_000, TTL));
        assert!(entry.is_fresh(1_000 + TTL_MS - 1, TTL));
        assert!(!entry.is_fresh(1_000 + TTL_MS, TTL));
        assert!(!entry.is_fresh(1_000 + TTL_MS + 1, TTL));
    }

    #[test]
    fn test_future_entry_is_stale() {
        let entry = sample();
        assert!(!entry.is_fresh(999, TTL));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(CacheEntry::decode("not json").is_err());
        assert!(CacheEntry::decode(r#"{"data":{}}"#).is_err());
    }
}
