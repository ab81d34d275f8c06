//! API key lifecycle over the shared key-value store
//!
//! Records live under `apikey:{digest(secret)}` with no store TTL; expiry
//! is a property of the record so an expired key can still be listed and
//! swept by `cleanup`.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::api_key::{
    sanitize_permissions, validate_secret_format, ApiKeyRecord, Permission, RedactedApiKey,
};
use crate::domain::clock::Clock;
use crate::domain::rate_limit::BucketConfig;
use crate::domain::store::{key_digest, KeyValueStore, StoreExt};
use crate::domain::DomainError;

use super::generator::{constant_time_eq, ApiKeyGenerator};

/// Partial update for one key. Outer `None` leaves a field untouched;
/// the nested options clear nullable fields when set to `None`.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyUpdate {
    pub name: Option<String>,
    pub permissions: Option<Vec<String>>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub rate_limit_override: Option<Option<BucketConfig>>,
    pub ip_allowlist: Option<Vec<IpAddr>>,
    pub user_agent_pattern: Option<Option<String>>,
}

/// Aggregate usage over a trailing window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_keys: usize,
    pub active_keys: usize,
    pub keys_used_in_window: usize,
    pub total_requests: u64,
}

/// Issues, validates, and retires API keys.
#[derive(Debug)]
pub struct ApiKeyRegistry {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    generator: ApiKeyGenerator,
}

impl ApiKeyRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            generator: ApiKeyGenerator::new(),
        }
    }

    /// Issues a new key. Unknown permissions are dropped silently; the
    /// secret is only ever returned here, inside the record.
    pub async fn generate(
        &self,
        name: impl Into<String>,
        permissions: &[String],
        expires_at: Option<DateTime<Utc>>,
        created_by: Option<&str>,
    ) -> Result<ApiKeyRecord, DomainError> {
        let secret = self.generator.generate();
        let now = self.clock.now();

        let mut record = ApiKeyRecord::new(
            secret.clone(),
            name,
            sanitize_permissions(permissions),
            now,
        );

        if let Some(expires_at) = expires_at {
            record = record.with_expiration(expires_at);
        }
        if let Some(created_by) = created_by {
            record = record.with_created_by(created_by);
        }

        self.save(&record).await?;

        info!(name = record.name(), "API key issued");
        Ok(record)
    }

    /// Resolves a presented secret to its record.
    ///
    /// Every rejection looks the same to the caller (`None`); the concrete
    /// reason is only logged. Malformed secrets are refused before any
    /// store access.
    pub async fn validate(
        &self,
        secret: &str,
        client_ip: Option<IpAddr>,
        user_agent: Option<&str>,
    ) -> Result<Option<ApiKeyRecord>, DomainError> {
        if let Err(e) = validate_secret_format(secret) {
            debug!(error = %e, "Rejected malformed API key");
            return Ok(None);
        }

        let mut record = match self.load(secret).await? {
            Some(record) => record,
            None => {
                debug!("Rejected unknown API key");
                return Ok(None);
            }
        };

        // Digest collision or tampered record
        if !constant_time_eq(record.secret(), secret) {
            debug!("Rejected API key with mismatched secret");
            return Ok(None);
        }

        let now = self.clock.now();

        if !record.is_active() {
            debug!(name = record.name(), "Rejected revoked API key");
            return Ok(None);
        }

        if record.is_expired(now) {
            debug!(name = record.name(), "Rejected expired API key");
            return Ok(None);
        }

        if !record.ip_allowlist().is_empty() {
            let allowed = client_ip
                .map(|ip| record.ip_allowlist().contains(&ip))
                .unwrap_or(false);

            if !allowed {
                debug!(name = record.name(), "Rejected API key from disallowed address");
                return Ok(None);
            }
        }

        if let Some(pattern) = record.user_agent_pattern() {
            if !Self::user_agent_matches(pattern, user_agent) {
                debug!(name = record.name(), "Rejected API key with mismatched user agent");
                return Ok(None);
            }
        }

        // Usage tracking is best-effort on the hot path
        record.record_usage(now);
        if let Err(e) = self.save(&record).await {
            warn!(name = record.name(), error = %e, "Failed to persist API key usage");
        }

        Ok(Some(record))
    }

    /// Deactivates a key. Returns false when the secret resolves to
    /// nothing.
    pub async fn revoke(&self, secret: &str, actor: Option<&str>) -> Result<bool, DomainError> {
        let mut record = match self.load(secret).await? {
            Some(record) => record,
            None => return Ok(false),
        };

        record.revoke(self.clock.now(), actor.map(str::to_string));
        self.save(&record).await?;

        info!(name = record.name(), "API key revoked");
        Ok(true)
    }

    /// Applies a partial update. Returns false for an unknown secret.
    pub async fn update(&self, secret: &str, update: ApiKeyUpdate) -> Result<bool, DomainError> {
        let mut record = match self.load(secret).await? {
            Some(record) => record,
            None => return Ok(false),
        };

        let now = self.clock.now();

        if let Some(name) = update.name {
            record.set_name(name, now);
        }
        if let Some(permissions) = update.permissions {
            record.set_permissions(sanitize_permissions(&permissions), now);
        }
        if let Some(expires_at) = update.expires_at {
            record.set_expiration(expires_at, now);
        }
        if let Some(config) = update.rate_limit_override {
            record.set_rate_limit_override(config, now);
        }
        if let Some(allowlist) = update.ip_allowlist {
            record.set_ip_allowlist(allowlist, now);
        }
        if let Some(pattern) = update.user_agent_pattern {
            record.set_user_agent_pattern(pattern, now);
        }

        self.save(&record).await?;
        Ok(true)
    }

    /// Lists keys in redacted form, newest first.
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<RedactedApiKey>, DomainError> {
        let now = self.clock.now();
        let mut keys = Vec::new();

        for record in self.all_records().await? {
            if include_inactive || record.is_usable(now) {
                keys.push(record.redacted());
            }
        }

        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    /// Whether a valid key grants the permission. Invalid keys grant
    /// nothing.
    pub async fn has_permission(
        &self,
        secret: &str,
        permission: Permission,
    ) -> Result<bool, DomainError> {
        match self.validate(secret, None, None).await? {
            Some(record) => Ok(record.has_permission(permission)),
            None => Ok(false),
        }
    }

    /// Removes keys that are expired, or revoked for longer than the
    /// threshold. Active unexpired keys are never touched, no matter how
    /// long they have been idle.
    pub async fn cleanup(&self, inactive_days: i64) -> Result<usize, DomainError> {
        let now = self.clock.now();
        let threshold = now - Duration::days(inactive_days);
        let mut removed = 0;

        for record in self.all_records().await? {
            let sweep = record.is_expired(now)
                || record
                    .revoked_at()
                    .map(|revoked_at| revoked_at < threshold)
                    .unwrap_or(false);

            if sweep {
                let storage_key = Self::storage_key(record.secret());
                if self.store.delete(&storage_key).await? {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!(removed, "Swept retired API keys");
        }

        Ok(removed)
    }

    /// Aggregate usage over the last `days` days.
    pub async fn usage_stats(&self, days: i64) -> Result<UsageStats, DomainError> {
        let now = self.clock.now();
        let window_start = now - Duration::days(days);
        let mut stats = UsageStats::default();

        for record in self.all_records().await? {
            stats.total_keys += 1;
            stats.total_requests += record.usage_count();

            if record.is_usable(now) {
                stats.active_keys += 1;
            }

            if record
                .last_used_at()
                .map(|used| used >= window_start)
                .unwrap_or(false)
            {
                stats.keys_used_in_window += 1;
            }
        }

        Ok(stats)
    }

    fn storage_key(secret: &str) -> String {
        format!("apikey:{}", key_digest(secret))
    }

    async fn load(&self, secret: &str) -> Result<Option<ApiKeyRecord>, DomainError> {
        self.store.get_json(&Self::storage_key(secret)).await
    }

    async fn save(&self, record: &ApiKeyRecord) -> Result<(), DomainError> {
        self.store
            .set_json(&Self::storage_key(record.secret()), record, None)
            .await
    }

    async fn all_records(&self) -> Result<Vec<ApiKeyRecord>, DomainError> {
        let mut records = Vec::new();

        for storage_key in self.store.scan_prefix("apikey:").await? {
            if let Some(record) = self.store.get_json(&storage_key).await? {
                records.push(record);
            }
        }

        Ok(records)
    }

    fn user_agent_matches(pattern: &str, user_agent: Option<&str>) -> bool {
        let user_agent = match user_agent {
            Some(ua) => ua,
            None => return false,
        };

        match Regex::new(pattern) {
            Ok(regex) => regex.is_match(user_agent),
            Err(e) => {
                warn!(pattern, error = %e, "Invalid user agent pattern on API key");
                false
            }
        }
    }
}
