//! Fixed-window rate governor
//!
//! One JSON window record per (bucket, identifier) in the shared store.
//! `allow` and `record` are deliberately two separate steps; concurrent
//! callers racing between them can over-admit by a bounded handful of
//! requests, which is acceptable for abuse protection.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::clock::Clock;
use crate::domain::rate_limit::{BucketConfig, BucketOverride, FailPolicy, Identifier, RateBucket};
use crate::domain::store::{key_digest, KeyValueStore, StoreExt};

/// Windows outlive their logical reset so a stale record can be reused;
/// the store drops them after an hour of inactivity.
const WINDOW_STORE_TTL: Duration = Duration::from_secs(3600);

const DEFAULT_LOG_SAMPLE_RATE: u32 = 10;

/// Persisted window state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RateWindow {
    /// Epoch seconds at which the current window opened
    window_start: i64,
    count: u32,
}

/// Outcome of a combined admission check, shaped for header emission.
#[derive(Debug, Clone)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub count: u32,
    pub retry_after: Duration,
}

impl RateDecision {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}

/// Per-bucket, per-identifier fixed-window admission control.
#[derive(Debug)]
pub struct RateGovernor {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    /// Configured overrides keyed by bucket name
    overrides: BTreeMap<String, BucketOverride>,
    fail_policy: FailPolicy,
    /// Denials are logged roughly 1 in N
    log_sample_rate: u32,
}

impl RateGovernor {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            overrides: BTreeMap::new(),
            fail_policy: FailPolicy::default(),
            log_sample_rate: DEFAULT_LOG_SAMPLE_RATE,
        }
    }

    pub fn with_overrides(mut self, overrides: BTreeMap<String, BucketOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_fail_policy(mut self, policy: FailPolicy) -> Self {
        self.fail_policy = policy;
        self
    }

    pub fn with_log_sample_rate(mut self, rate: u32) -> Self {
        self.log_sample_rate = rate.max(1);
        self
    }

    /// Effective configuration for a bucket: call-site override wins over
    /// the configured override, which wins over the compiled default.
    pub fn effective_config(
        &self,
        bucket: RateBucket,
        call_override: Option<BucketConfig>,
    ) -> BucketConfig {
        if let Some(config) = call_override {
            return config;
        }

        let base = bucket.default_config();

        match self.overrides.get(bucket.as_str()) {
            Some(configured) => configured.apply(base),
            None => base,
        }
    }

    /// Whether the identifier still has budget in the current window.
    /// Does not consume budget; pair with [`record`](Self::record).
    pub async fn allow(&self, bucket: RateBucket, identifier: &Identifier) -> bool {
        self.allow_with(bucket, identifier, None).await
    }

    pub async fn allow_with(
        &self,
        bucket: RateBucket,
        identifier: &Identifier,
        call_override: Option<BucketConfig>,
    ) -> bool {
        self.check_with(bucket, identifier, call_override)
            .await
            .allowed
    }

    /// Full admission decision, including the data the HTTP layer puts into
    /// rate-limit headers.
    pub async fn check(&self, bucket: RateBucket, identifier: &Identifier) -> RateDecision {
        self.check_with(bucket, identifier, None).await
    }

    pub async fn check_with(
        &self,
        bucket: RateBucket,
        identifier: &Identifier,
        call_override: Option<BucketConfig>,
    ) -> RateDecision {
        let config = self.effective_config(bucket, call_override);

        let window = match self.load_window(bucket, identifier).await {
            Ok(window) => window,
            Err(e) => {
                warn!(
                    bucket = %bucket,
                    identifier = %identifier.preview(),
                    error = %e,
                    "Rate window read failed, applying fail policy"
                );
                let allowed = self.fail_policy == FailPolicy::Open;
                return RateDecision {
                    allowed,
                    limit: config.limit,
                    count: 0,
                    retry_after: Duration::ZERO,
                };
            }
        };

        let now = self.clock.now().timestamp();
        let count = Self::live_count(window.as_ref(), now, &config);
        let allowed = count < config.limit;

        if !allowed {
            self.log_denial_sampled(bucket, identifier, count, &config);
        }

        RateDecision {
            allowed,
            limit: config.limit,
            count,
            retry_after: Self::window_retry_after(window.as_ref(), now, &config),
        }
    }

    /// Consumes one unit of budget. Best-effort on store failure; an
    /// unrecorded request errs on the side of admission.
    pub async fn record(&self, bucket: RateBucket, identifier: &Identifier) {
        self.record_with(bucket, identifier, None).await
    }

    pub async fn record_with(
        &self,
        bucket: RateBucket,
        identifier: &Identifier,
        call_override: Option<BucketConfig>,
    ) {
        let config = self.effective_config(bucket, call_override);
        let key = self.window_key(bucket, identifier);
        let now = self.clock.now().timestamp();

        let window = match self.store.get_json::<RateWindow>(&key).await {
            Ok(window) => window,
            Err(e) => {
                warn!(
                    bucket = %bucket,
                    identifier = %identifier.preview(),
                    error = %e,
                    "Rate window read failed, skipping record"
                );
                return;
            }
        };

        let updated = match window {
            Some(mut window) if now - window.window_start < config.window_secs as i64 => {
                window.count += 1;
                window
            }
            _ => RateWindow {
                window_start: now,
                count: 1,
            },
        };

        if let Err(e) = self
            .store
            .set_json(&key, &updated, Some(WINDOW_STORE_TTL))
            .await
        {
            warn!(
                bucket = %bucket,
                identifier = %identifier.preview(),
                error = %e,
                "Rate window write failed"
            );
        }
    }

    /// Requests counted so far in the current window.
    pub async fn current_count(&self, bucket: RateBucket, identifier: &Identifier) -> u32 {
        let config = self.effective_config(bucket, None);
        let now = self.clock.now().timestamp();

        match self.load_window(bucket, identifier).await {
            Ok(window) => Self::live_count(window.as_ref(), now, &config),
            Err(_) => 0,
        }
    }

    /// Seconds until the current window resets. Zero when there is budget
    /// left or no window exists.
    pub async fn retry_after(&self, bucket: RateBucket, identifier: &Identifier) -> Duration {
        self.check(bucket, identifier).await.retry_after
    }

    /// Drops the window for one identifier, restoring its full budget.
    pub async fn clear(&self, bucket: RateBucket, identifier: &Identifier) -> bool {
        let key = self.window_key(bucket, identifier);

        match self.store.delete(&key).await {
            Ok(existed) => existed,
            Err(e) => {
                warn!(bucket = %bucket, error = %e, "Rate window clear failed");
                false
            }
        }
    }

    fn window_key(&self, bucket: RateBucket, identifier: &Identifier) -> String {
        let digest = key_digest(&identifier.storage_token());
        format!("rate:{}:{}", bucket.as_str(), &digest[..16])
    }

    async fn load_window(
        &self,
        bucket: RateBucket,
        identifier: &Identifier,
    ) -> Result<Option<RateWindow>, crate::domain::DomainError> {
        let key = self.window_key(bucket, identifier);
        self.store.get_json(&key).await
    }

    fn live_count(window: Option<&RateWindow>, now: i64, config: &BucketConfig) -> u32 {
        match window {
            Some(window) if now - window.window_start < config.window_secs as i64 => window.count,
            _ => 0,
        }
    }

    fn window_retry_after(
        window: Option<&RateWindow>,
        now: i64,
        config: &BucketConfig,
    ) -> Duration {
        match window {
            Some(window) => {
                // Clamped so a backward clock step cannot underflow the
                // remaining time.
                let elapsed = (now - window.window_start).max(0) as u64;
                if elapsed >= config.window_secs || window.count < config.limit {
                    Duration::ZERO
                } else {
                    Duration::from_secs(config.window_secs - elapsed)
                }
            }
            None => Duration::ZERO,
        }
    }

    fn log_denial_sampled(
        &self,
        bucket: RateBucket,
        identifier: &Identifier,
        count: u32,
        config: &BucketConfig,
    ) {
        let sampled = rand::thread_rng().gen_range(0..self.log_sample_rate) == 0;

        if sampled {
            debug!(
                bucket = %bucket,
                identifier = %identifier.preview(),
                count,
                limit = config.limit,
                "Rate limit exceeded"
            );
        }
    }
}
