//! Response cache over the shared key-value store
//!
//! Entries live under `cache:{type}:{digest}` storage keys. Each
//! property-scoped entry also writes one marker key under
//! `cache-index:{type}:property:{id}:{digest}`, so property-scoped
//! eviction scans only that property's markers instead of the whole
//! store. A marker is a single independent write, so concurrent puts
//! cannot clobber each other's index state. Arbitrary glob patterns fall
//! back to a prefix scan.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::cache::key::{glob_to_regex, parse_range, property_component};
use crate::domain::cache::{CacheEntry, CacheStats, CacheType};
use crate::domain::clock::Clock;
use crate::domain::store::{key_digest, KeyValueStore, StoreExt};
use crate::domain::DomainError;

/// Entries are kept in the store slightly past their logical expiry so a
/// read can still observe and evict them.
const STORE_TTL_BUFFER: Duration = Duration::from_secs(60);

/// TTL-keyed response cache with pattern-based bulk eviction.
#[derive(Debug)]
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    /// TTL overrides in seconds, keyed by cache type name
    ttl_overrides: BTreeMap<String, u64>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl_overrides: BTreeMap::new(),
        }
    }

    pub fn with_ttl_overrides(mut self, overrides: BTreeMap<String, u64>) -> Self {
        self.ttl_overrides = overrides;
        self
    }

    /// Looks up a cached payload. Expired entries are evicted on read and
    /// reported as absent.
    pub async fn get(&self, raw_key: &str) -> Result<Option<Value>, DomainError> {
        let storage_key = match Self::storage_key(raw_key) {
            Some(key) => key,
            None => return Ok(None),
        };

        let entry: Option<CacheEntry> = self.store.get_json(&storage_key).await?;

        let mut entry = match entry {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let now = self.clock.now();

        if entry.is_expired(now) {
            let _ = self.store.delete(&storage_key).await;
            return Ok(None);
        }

        let payload = entry.payload.clone();

        // Access-time refresh is best-effort
        entry.accessed_at = now.timestamp();
        let remaining = (entry.expires_at - now.timestamp()).max(0) as u64;
        let store_ttl = Duration::from_secs(remaining) + STORE_TTL_BUFFER;
        if let Err(e) = self.store.set_json(&storage_key, &entry, Some(store_ttl)).await {
            debug!(error = %e, "Failed to refresh cache entry access time");
        }

        Ok(Some(payload))
    }

    /// Stores a payload under a raw key. The TTL chain is call-site
    /// override, then configured per-type override, then the type default.
    pub async fn put(
        &self,
        raw_key: &str,
        payload: Value,
        ttl: Option<Duration>,
        meta: BTreeMap<String, String>,
    ) -> Result<(), DomainError> {
        let kind = CacheType::from_raw_key(raw_key).ok_or_else(|| {
            DomainError::validation(format!("Unrecognized cache key prefix: '{}'", raw_key))
        })?;

        let ttl = ttl.unwrap_or_else(|| self.effective_ttl(kind));
        let now = self.clock.now();
        let entry = CacheEntry::new(raw_key.to_string(), payload, kind, ttl, meta, now);

        let storage_key = format!("cache:{}:{}", kind.as_str(), key_digest(raw_key));
        self.store
            .set_json(&storage_key, &entry, Some(ttl + STORE_TTL_BUFFER))
            .await?;

        if let Some((kind, property_id)) = property_component(raw_key) {
            self.index_add(kind, property_id, raw_key, ttl + STORE_TTL_BUFFER)
                .await;
        }

        Ok(())
    }

    /// Removes one entry, returning whether it existed.
    pub async fn delete(&self, raw_key: &str) -> Result<bool, DomainError> {
        match Self::storage_key(raw_key) {
            Some(storage_key) => self.store.delete(&storage_key).await,
            None => Ok(false),
        }
    }

    /// Deletes every live entry whose raw key matches the glob pattern.
    /// Returns the number of entries removed.
    pub async fn forget(&self, pattern: &str) -> Result<usize, DomainError> {
        let regex = glob_to_regex(pattern)
            .map_err(|e| DomainError::validation(format!("Invalid pattern: {}", e)))?;

        // Property-scoped patterns go through the secondary index
        if let Some((kind, property_id)) = Self::pattern_property(pattern) {
            return self.forget_indexed(kind, property_id, &regex).await;
        }

        let prefix = match Self::pattern_type(pattern) {
            Some(kind) => format!("cache:{}:", kind.as_str()),
            None => "cache:".to_string(),
        };

        let mut deleted = 0;

        for storage_key in self.store.scan_prefix(&prefix).await? {
            let entry: Option<CacheEntry> = self.store.get_json(&storage_key).await?;

            if let Some(entry) = entry {
                if regex.is_match(&entry.raw_key) && self.store.delete(&storage_key).await? {
                    deleted += 1;
                }
            }
        }

        debug!(pattern, deleted, "Cache pattern eviction");
        Ok(deleted)
    }

    /// Evicts availability entries for one property whose cached date range
    /// overlaps the given span.
    pub async fn forget_availability_overlapping(
        &self,
        property_id: u64,
        span_start: chrono::NaiveDate,
        span_end: chrono::NaiveDate,
    ) -> Result<usize, DomainError> {
        let prefix = Self::index_prefix(CacheType::Availability, property_id);
        let mut deleted = 0;

        for marker_key in self.store.scan_prefix(&prefix).await? {
            let raw_key: Option<String> = self.store.get_json(&marker_key).await?;
            let raw_key = match raw_key {
                Some(raw_key) => raw_key,
                None => continue,
            };

            let overlaps = parse_range(&raw_key)
                .map(|(start, end)| start <= span_end && span_start <= end)
                .unwrap_or(false);

            if overlaps {
                if self.delete(&raw_key).await? {
                    deleted += 1;
                }
                let _ = self.store.delete(&marker_key).await;
            }
        }

        Ok(deleted)
    }

    /// Snapshot of live entries, grouped by type.
    pub async fn stats(&self) -> Result<CacheStats, DomainError> {
        let now = self.clock.now();
        let mut stats = CacheStats::default();

        for storage_key in self.store.scan_prefix("cache:").await? {
            let entry: Option<CacheEntry> = self.store.get_json(&storage_key).await?;

            if let Some(entry) = entry {
                if entry.is_expired(now) {
                    let _ = self.store.delete(&storage_key).await;
                } else {
                    stats.observe(&entry);
                }
            }
        }

        Ok(stats)
    }

    /// Drops all entries of one type, or everything when no type is given.
    pub async fn clear(&self, kind: Option<CacheType>) -> Result<usize, DomainError> {
        let prefix = match kind {
            Some(kind) => format!("cache:{}:", kind.as_str()),
            None => "cache:".to_string(),
        };

        let mut deleted = 0;

        for storage_key in self.store.scan_prefix(&prefix).await? {
            if self.store.delete(&storage_key).await? {
                deleted += 1;
            }
        }

        let index_prefix = match kind {
            Some(kind) => format!("cache-index:{}:", kind.as_str()),
            None => "cache-index:".to_string(),
        };

        for index_key in self.store.scan_prefix(&index_prefix).await? {
            let _ = self.store.delete(&index_key).await;
        }

        Ok(deleted)
    }

    fn effective_ttl(&self, kind: CacheType) -> Duration {
        match self.ttl_overrides.get(kind.as_str()) {
            Some(secs) => Duration::from_secs(*secs),
            None => kind.default_ttl(),
        }
    }

    fn storage_key(raw_key: &str) -> Option<String> {
        let kind = CacheType::from_raw_key(raw_key)?;
        Some(format!("cache:{}:{}", kind.as_str(), key_digest(raw_key)))
    }

    fn index_prefix(kind: CacheType, property_id: u64) -> String {
        format!("cache-index:{}:property:{}:", kind.as_str(), property_id)
    }

    fn index_marker(kind: CacheType, property_id: u64, raw_key: &str) -> String {
        format!(
            "{}{}",
            Self::index_prefix(kind, property_id),
            key_digest(raw_key)
        )
    }

    /// Matches patterns of the shape `<type>:property:<id>:...` with no
    /// wildcard before the property id.
    fn pattern_property(pattern: &str) -> Option<(CacheType, u64)> {
        let (kind, property_id) = property_component(pattern)?;
        let head = format!("{}:property:{}", kind.as_str(), property_id);

        if pattern.starts_with(&head) && !head.contains('*') {
            Some((kind, property_id))
        } else {
            None
        }
    }

    /// Literal type prefix of a pattern, used to narrow the scan fallback.
    fn pattern_type(pattern: &str) -> Option<CacheType> {
        let head = pattern.split(':').next()?;
        if head.contains('*') {
            return None;
        }
        CacheType::from_raw_key(pattern)
    }

    async fn forget_indexed(
        &self,
        kind: CacheType,
        property_id: u64,
        regex: &regex::Regex,
    ) -> Result<usize, DomainError> {
        let prefix = Self::index_prefix(kind, property_id);
        let mut deleted = 0;

        for marker_key in self.store.scan_prefix(&prefix).await? {
            let raw_key: Option<String> = self.store.get_json(&marker_key).await?;
            let raw_key = match raw_key {
                Some(raw_key) => raw_key,
                None => continue,
            };

            if regex.is_match(&raw_key) {
                if self.delete(&raw_key).await? {
                    deleted += 1;
                }
                let _ = self.store.delete(&marker_key).await;
            }
        }

        debug!(property_id, deleted, "Indexed cache eviction");
        Ok(deleted)
    }

    /// One marker key per entry, written in a single `set`, so concurrent
    /// puts for the same property cannot overwrite each other's index state.
    async fn index_add(&self, kind: CacheType, property_id: u64, raw_key: &str, ttl: Duration) {
        let marker_key = Self::index_marker(kind, property_id, raw_key);

        if let Err(e) = self.store.set_json(&marker_key, &raw_key, Some(ttl)).await {
            warn!(error = %e, "Cache index write failed");
        }
    }
}
