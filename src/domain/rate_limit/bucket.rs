//! Rate limit buckets and their configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Named admission-control scope, one per class of endpoint.
///
/// Buckets are statically known at startup; only their limits are
/// configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateBucket {
    /// Availability lookups
    Availability,
    /// Price quote lookups
    Quote,
    /// Webhook/admin introspection endpoints
    Webhook,
}

impl RateBucket {
    pub const ALL: [RateBucket; 3] = [Self::Availability, Self::Quote, Self::Webhook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Availability => "availability",
            Self::Quote => "quote",
            Self::Webhook => "webhook",
        }
    }

    /// Compiled-in default limits, lowest precedence in the override chain.
    pub fn default_config(&self) -> BucketConfig {
        match self {
            Self::Availability => BucketConfig::new(60, 60),
            Self::Quote => BucketConfig::new(30, 60),
            Self::Webhook => BucketConfig::new(100, 60),
        }
    }
}

impl std::fmt::Display for RateBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Effective limit/window pair for a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Maximum requests admitted per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl BucketConfig {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Administrator-configured partial override for one bucket.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BucketOverride {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub window_secs: Option<u64>,
}

impl BucketOverride {
    /// Applies this override on top of a base configuration.
    pub fn apply(&self, base: BucketConfig) -> BucketConfig {
        BucketConfig {
            limit: self.limit.unwrap_or(base.limit),
            window_secs: self.window_secs.unwrap_or(base.window_secs),
        }
    }
}

/// What the governor does when the backing store is unreachable.
///
/// This is an explicit deployment decision; the shipped default is
/// fail-open so a degraded store never takes the read API down with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailPolicy {
    #[default]
    Open,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        assert_eq!(
            RateBucket::Availability.default_config(),
            BucketConfig::new(60, 60)
        );
        assert_eq!(RateBucket::Quote.default_config(), BucketConfig::new(30, 60));
        assert_eq!(
            RateBucket::Webhook.default_config(),
            BucketConfig::new(100, 60)
        );
    }

    #[test]
    fn test_bucket_names() {
        for bucket in RateBucket::ALL {
            assert!(!bucket.as_str().is_empty());
            assert_eq!(bucket.to_string(), bucket.as_str());
        }
    }

    #[test]
    fn test_override_apply_partial() {
        let base = BucketConfig::new(60, 60);
        let with_limit = BucketOverride {
            limit: Some(10),
            window_secs: None,
        };

        assert_eq!(with_limit.apply(base), BucketConfig::new(10, 60));

        let with_window = BucketOverride {
            limit: None,
            window_secs: Some(120),
        };

        assert_eq!(with_window.apply(base), BucketConfig::new(60, 120));
    }

    #[test]
    fn test_fail_policy_default_is_open() {
        assert_eq!(FailPolicy::default(), FailPolicy::Open);
    }
}
