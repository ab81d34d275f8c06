//! Cached response entries and statistics

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of cacheable response classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    Availability,
    Quote,
    Webhook,
}

impl CacheType {
    pub const ALL: [CacheType; 3] = [Self::Availability, Self::Quote, Self::Webhook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Availability => "availability",
            Self::Quote => "quote",
            Self::Webhook => "webhook",
        }
    }

    /// Derives the type from the first component of a raw key.
    pub fn from_raw_key(raw_key: &str) -> Option<Self> {
        match raw_key.split(':').next()? {
            "availability" => Some(Self::Availability),
            "quote" => Some(Self::Quote),
            "webhook" => Some(Self::Webhook),
            _ => None,
        }
    }

    /// Default time to live. Quotes go stale the fastest since prices move
    /// with every booking.
    pub fn default_ttl(&self) -> Duration {
        match self {
            Self::Availability => Duration::from_secs(90),
            Self::Quote => Duration::from_secs(30),
            Self::Webhook => Duration::from_secs(60),
        }
    }
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One cached payload plus its bookkeeping metadata.
///
/// Stored as JSON under a hashed storage key. Expiry is logical; `get`
/// re-checks `expires_at` so a stale backing entry is never served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub raw_key: String,
    pub payload: Value,
    #[serde(rename = "type")]
    pub kind: CacheType,
    pub created_at: i64,
    pub accessed_at: i64,
    pub expires_at: i64,
    pub ttl_secs: u64,
    pub size: usize,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl CacheEntry {
    pub fn new(
        raw_key: String,
        payload: Value,
        kind: CacheType,
        ttl: Duration,
        meta: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Self {
        let size = payload.to_string().len();
        let timestamp = now.timestamp();

        Self {
            raw_key,
            payload,
            kind,
            created_at: timestamp,
            accessed_at: timestamp,
            expires_at: timestamp + ttl.as_secs() as i64,
            ttl_secs: ttl.as_secs(),
            size,
            meta,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }
}

/// Aggregate statistics for one cache type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheTypeStats {
    pub entries: usize,
    pub size: usize,
}

/// Snapshot of cache contents, computed by scanning live entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size: usize,
    pub by_type: BTreeMap<String, CacheTypeStats>,
    pub oldest_created_at: Option<i64>,
    pub newest_created_at: Option<i64>,
}

impl CacheStats {
    pub fn observe(&mut self, entry: &CacheEntry) {
        self.total_entries += 1;
        self.total_size += entry.size;

        let per_type = self.by_type.entry(entry.kind.to_string()).or_default();
        per_type.entries += 1;
        per_type.size += entry.size;

        self.oldest_created_at = Some(match self.oldest_created_at {
            Some(oldest) => oldest.min(entry.created_at),
            None => entry.created_at,
        });
        self.newest_created_at = Some(match self.newest_created_at {
            Some(newest) => newest.max(entry.created_at),
            None => entry.created_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_ttls() {
        assert_eq!(CacheType::Availability.default_ttl(), Duration::from_secs(90));
        assert_eq!(CacheType::Quote.default_ttl(), Duration::from_secs(30));
        assert_eq!(CacheType::Webhook.default_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_type_from_raw_key() {
        assert_eq!(
            CacheType::from_raw_key("availability:property:1:range:a:b"),
            Some(CacheType::Availability)
        );
        assert_eq!(
            CacheType::from_raw_key("quote:property:1:dates:a:b:guests:2"),
            Some(CacheType::Quote)
        );
        assert_eq!(CacheType::from_raw_key("bogus:whatever"), None);
    }

    #[test]
    fn test_entry_expiry() {
        let now = Utc::now();
        let entry = CacheEntry::new(
            "quote:property:1:dates:a:b:guests:2".to_string(),
            json!({"total": 100}),
            CacheType::Quote,
            Duration::from_secs(30),
            BTreeMap::new(),
            now,
        );

        assert!(!entry.is_expired(now));
        assert!(!entry.is_expired(now + chrono::Duration::seconds(29)));
        assert!(entry.is_expired(now + chrono::Duration::seconds(30)));
    }

    #[test]
    fn test_entry_serializes_type_field() {
        let entry = CacheEntry::new(
            "webhook:endpoint:bookings".to_string(),
            json!([]),
            CacheType::Webhook,
            Duration::from_secs(60),
            BTreeMap::new(),
            Utc::now(),
        );

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "webhook");
    }

    #[test]
    fn test_stats_observe() {
        let now = Utc::now();
        let mut stats = CacheStats::default();

        let a = CacheEntry::new(
            "availability:property:1:range:a:b".to_string(),
            json!({"days": []}),
            CacheType::Availability,
            Duration::from_secs(90),
            BTreeMap::new(),
            now,
        );
        let b = CacheEntry::new(
            "quote:property:1:dates:a:b:guests:2".to_string(),
            json!({"total": 250}),
            CacheType::Quote,
            Duration::from_secs(30),
            BTreeMap::new(),
            now + chrono::Duration::seconds(5),
        );

        stats.observe(&a);
        stats.observe(&b);

        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.by_type["availability"].entries, 1);
        assert_eq!(stats.by_type["quote"].entries, 1);
        assert_eq!(stats.oldest_created_at, Some(a.created_at));
        assert_eq!(stats.newest_created_at, Some(b.created_at));
    }
}
