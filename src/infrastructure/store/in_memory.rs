//! In-memory key-value store implementation using moka

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;

use crate::domain::clock::{Clock, SystemClock};
use crate::domain::store::KeyValueStore;
use crate::domain::DomainError;

const DEFAULT_MAX_CAPACITY: u64 = 100_000;

/// Value stored in moka
#[derive(Debug, Clone)]
struct StoredEntry {
    /// Serialized JSON value
    data: String,
    /// Logical expiration (millis since epoch); None = never expires
    expires_at: Option<i64>,
}

/// Thread-safe in-memory store backed by moka.
///
/// Expiry is checked against the injected clock on every read rather than
/// delegated to moka, so tests can drive time without sleeping and moka's
/// eviction timing never affects correctness. Capacity eviction still comes
/// from moka.
#[derive(Debug)]
pub struct InMemoryStore {
    cache: MokaCache<String, StoredEntry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(DEFAULT_MAX_CAPACITY)
            .build();

        Self { cache, clock }
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    fn is_expired(&self, entry: &StoredEntry) -> bool {
        match entry.expires_at {
            Some(expires_at) => self.now_millis() >= expires_at,
            None => false,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        match self.cache.get(key).await {
            Some(entry) => {
                if self.is_expired(&entry) {
                    self.cache.remove(key).await;
                    return Ok(None);
                }

                Ok(Some(entry.data.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set_raw(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), DomainError> {
        let expires_at = ttl.map(|t| self.now_millis() + t.as_millis() as i64);
        let entry = StoredEntry {
            data: value.to_string(),
            expires_at,
        };

        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let existed = self.cache.get(key).await.is_some();
        self.cache.remove(key).await;
        Ok(existed)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, DomainError> {
        // Sync pending tasks first
        self.cache.run_pending_tasks().await;

        let cache_clone = self.cache.clone();
        let prefix = prefix.to_string();
        let candidates: Vec<(String, StoredEntry)> = tokio::task::spawn_blocking(move || {
            cache_clone
                .iter()
                .filter_map(|(k, v)| {
                    let key_str = k.as_str();

                    if key_str.starts_with(&prefix) {
                        Some((key_str.to_string(), v))
                    } else {
                        None
                    }
                })
                .collect()
        })
        .await
        .map_err(|e| DomainError::storage(format!("Failed to iterate store: {}", e)))?;

        let mut keys = Vec::with_capacity(candidates.len());

        for (key, entry) in candidates {
            if self.is_expired(&entry) {
                self.cache.remove(&key).await;
            } else {
                keys.push(key);
            }
        }

        Ok(keys)
    }
}
