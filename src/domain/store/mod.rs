//! Backing key-value store contract
//!
//! All protection components share one store: rate windows, cache entries
//! and API key records live side by side under distinct key prefixes. The
//! store is the only point of concurrent contention in the system.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::DomainError;

/// Key-value store with optional per-entry TTL and a prefix-scan primitive.
///
/// Values are JSON strings so the trait stays dyn-compatible; typed access
/// goes through [`StoreExt`]. A `ttl` of `None` means the entry never
/// expires on its own (used by the API key registry).
#[async_trait]
pub trait KeyValueStore: Send + Sync + Debug {
    /// Gets a raw JSON value, or `None` when absent or expired.
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Sets a raw JSON value.
    async fn set_raw(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), DomainError>;

    /// Deletes a value, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, DomainError>;

    /// Returns all live keys starting with the given prefix.
    ///
    /// Used only by pattern-based eviction, statistics and cleanup sweeps;
    /// never on the per-request hot path.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, DomainError>;
}

/// Extension trait providing typed get/set operations.
pub trait StoreExt: KeyValueStore {
    /// Gets a typed value from the store.
    fn get_json<'a, V>(
        &'a self,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<V>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            match self.get_raw(key).await? {
                Some(data) => {
                    let value: V = serde_json::from_str(&data).map_err(|e| {
                        DomainError::storage(format!("Failed to deserialize stored value: {}", e))
                    })?;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        }
    }

    /// Sets a typed value in the store.
    fn set_json<'a, V>(
        &'a self,
        key: &'a str,
        value: &'a V,
        ttl: Option<Duration>,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let data = serde_json::to_string(value).map_err(|e| {
                DomainError::storage(format!("Failed to serialize value: {}", e))
            })?;
            self.set_raw(key, &data, ttl).await
        }
    }
}

impl<T: KeyValueStore + ?Sized> StoreExt for T {}

/// Stable hex digest used to derive storage keys from raw composite keys
/// and identifiers.
pub fn key_digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;

    /// Mock store for testing, with optional injected failure.
    #[derive(Debug, Default)]
    pub struct MockStore {
        entries: Mutex<HashMap<String, (String, Option<i64>)>>,
        error: Mutex<Option<String>>,
        /// Number of read operations performed, for no-lookup assertions.
        reads: Mutex<usize>,
    }

    impl MockStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_error(self, error: impl Into<String>) -> Self {
            *self.error.lock().unwrap() = Some(error.into());
            self
        }

        pub fn set_error(&self, error: Option<String>) {
            *self.error.lock().unwrap() = error;
        }

        pub fn read_count(&self) -> usize {
            *self.reads.lock().unwrap()
        }

        fn check_error(&self) -> Result<(), DomainError> {
            if let Some(error) = self.error.lock().unwrap().clone() {
                return Err(DomainError::storage(error));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl KeyValueStore for MockStore {
        async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
            *self.reads.lock().unwrap() += 1;
            self.check_error()?;
            let entries = self.entries.lock().unwrap();

            match entries.get(key) {
                Some((data, expires_at)) => {
                    if let Some(expires_at) = expires_at {
                        if Utc::now().timestamp() > *expires_at {
                            return Ok(None);
                        }
                    }
                    Ok(Some(data.clone()))
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
            self.check_error()?;
            let expires_at = ttl.map(|t| Utc::now().timestamp() + t.as_secs() as i64);
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value.to_string(), expires_at));
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<bool, DomainError> {
            self.check_error()?;
            Ok(self.entries.lock().unwrap().remove(key).is_some())
        }

        async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, DomainError> {
            *self.reads.lock().unwrap() += 1;
            self.check_error()?;
            let entries = self.entries.lock().unwrap();

            Ok(entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_store_set_get() {
            let store = MockStore::new();
            store
                .set_json("key1", &"value1", Some(Duration::from_secs(60)))
                .await
                .unwrap();

            let result: Option<String> = store.get_json("key1").await.unwrap();
            assert_eq!(result, Some("value1".to_string()));
        }

        #[tokio::test]
        async fn test_mock_store_with_error() {
            let store = MockStore::new().with_error("store unreachable");

            let result: Result<Option<String>, _> = store.get_json("key").await;
            assert!(result.is_err());
        }

        #[tokio::test]
        async fn test_mock_store_scan_prefix() {
            let store = MockStore::new();
            store.set_raw("a:1", "1", None).await.unwrap();
            store.set_raw("a:2", "2", None).await.unwrap();
            store.set_raw("b:1", "3", None).await.unwrap();

            let keys = store.scan_prefix("a:").await.unwrap();
            assert_eq!(keys.len(), 2);
        }

        #[tokio::test]
        async fn test_mock_store_counts_reads() {
            let store = MockStore::new();
            assert_eq!(store.read_count(), 0);

            let _ = store.get_raw("anything").await;
            assert_eq!(store.read_count(), 1);
        }
    }

    #[test]
    fn test_key_digest_is_stable() {
        assert_eq!(key_digest("abc"), key_digest("abc"));
        assert_ne!(key_digest("abc"), key_digest("abd"));
        assert_eq!(key_digest("abc").len(), 64);
    }
}
