use std::collections::BTreeMap;

use serde::Deserialize;

use crate::domain::rate_limit::{BucketOverride, FailPolicy};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub protection: ProtectionConfig,
}

/// Bind address for the embedding application's HTTP server. The
/// protection layer never opens a socket itself; the host application
/// reads these when mounting the middleware.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Tuning for the protection layer itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Governor behavior when the backing store fails
    pub fail_policy: FailPolicy,
    /// Rate limit denials are logged roughly 1 in N
    pub log_sample_rate: u32,
    /// Per-bucket limit/window overrides, keyed by bucket name
    pub rate_limits: BTreeMap<String, BucketOverride>,
    /// Cache TTL overrides in seconds, keyed by cache type name
    pub cache_ttl: BTreeMap<String, u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            fail_policy: FailPolicy::default(),
            log_sample_rate: 10,
            rate_limits: BTreeMap::new(),
            cache_ttl: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.protection.log_sample_rate, 10);
        assert_eq!(config.protection.fail_policy, FailPolicy::Open);
        assert!(config.protection.rate_limits.is_empty());
    }

    #[test]
    fn test_protection_deserializes_overrides() {
        let raw = r#"
            {
                "fail_policy": "closed",
                "rate_limits": { "quote": { "limit": 10 } },
                "cache_ttl": { "availability": 300 }
            }
        "#;

        let config: ProtectionConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(config.fail_policy, FailPolicy::Closed);
        assert_eq!(config.rate_limits["quote"].limit, Some(10));
        assert_eq!(config.rate_limits["quote"].window_secs, None);
        assert_eq!(config.cache_ttl["availability"], 300);
    }
}
