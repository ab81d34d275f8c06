//! API key record and permissions

use std::collections::BTreeSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::rate_limit::BucketConfig;

/// Closed vocabulary of grantable permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Permission {
    ReadAvailability,
    ReadQuote,
    ReadWebhooks,
    WriteWebhooks,
    /// Wildcard implying every other permission
    All,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadAvailability => "read:availability",
            Self::ReadQuote => "read:quote",
            Self::ReadWebhooks => "read:webhooks",
            Self::WriteWebhooks => "write:webhooks",
            Self::All => "*",
        }
    }
}

impl TryFrom<String> for Permission {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "read:availability" => Ok(Self::ReadAvailability),
            "read:quote" => Ok(Self::ReadQuote),
            "read:webhooks" => Ok(Self::ReadWebhooks),
            "write:webhooks" => Ok(Self::WriteWebhooks),
            "*" => Ok(Self::All),
            other => Err(format!("unknown permission '{}'", other)),
        }
    }
}

impl From<Permission> for String {
    fn from(permission: Permission) -> Self {
        permission.as_str().to_string()
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filters a raw permission list down to the known vocabulary.
///
/// Unknown entries are dropped, not rejected, so a newer admin surface can
/// send permissions this build does not know about yet.
pub fn sanitize_permissions(raw: &[String]) -> BTreeSet<Permission> {
    raw.iter()
        .filter_map(|value| match Permission::try_from(value.clone()) {
            Ok(permission) => Some(permission),
            Err(_) => {
                debug!(permission = %value, "Dropping unknown permission");
                None
            }
        })
        .collect()
}

/// Stored API key record.
///
/// The secret is kept verbatim inside the record; it never leaves the
/// registry except through [`RedactedApiKey`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    secret: String,
    name: String,
    permissions: BTreeSet<Permission>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_by: Option<String>,
    /// None = never expires
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    usage_count: u64,
    is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    revoked_by: Option<String>,
    /// Per-key rate limit replacing the bucket default when present
    #[serde(skip_serializing_if = "Option::is_none")]
    rate_limit_override: Option<BucketConfig>,
    /// Empty list means no address restriction
    #[serde(default)]
    ip_allowlist: Vec<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent_pattern: Option<String>,
    updated_at: DateTime<Utc>,
}

impl ApiKeyRecord {
    pub fn new(
        secret: impl Into<String>,
        name: impl Into<String>,
        permissions: BTreeSet<Permission>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            secret: secret.into(),
            name: name.into(),
            permissions,
            created_at: now,
            created_by: None,
            expires_at: None,
            last_used_at: None,
            usage_count: 0,
            is_active: true,
            revoked_at: None,
            revoked_by: None,
            rate_limit_override: None,
            ip_allowlist: Vec::new(),
            user_agent_pattern: None,
            updated_at: now,
        }
    }

    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn with_rate_limit_override(mut self, config: BucketConfig) -> Self {
        self.rate_limit_override = Some(config);
        self
    }

    pub fn with_ip_allowlist(mut self, allowlist: Vec<IpAddr>) -> Self {
        self.ip_allowlist = allowlist;
        self
    }

    pub fn with_user_agent_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.user_agent_pattern = Some(pattern.into());
        self
    }

    // Getters

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn revoked_at(&self) -> Option<DateTime<Utc>> {
        self.revoked_at
    }

    pub fn revoked_by(&self) -> Option<&str> {
        self.revoked_by.as_deref()
    }

    pub fn rate_limit_override(&self) -> Option<BucketConfig> {
        self.rate_limit_override
    }

    pub fn ip_allowlist(&self) -> &[IpAddr] {
        &self.ip_allowlist
    }

    pub fn user_agent_pattern(&self) -> Option<&str> {
        self.user_agent_pattern.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Status checks

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&Permission::All) || self.permissions.contains(&permission)
    }

    // Mutators

    pub fn record_usage(&mut self, now: DateTime<Utc>) {
        self.last_used_at = Some(now);
        self.usage_count += 1;
    }

    pub fn revoke(&mut self, now: DateTime<Utc>, revoked_by: Option<String>) {
        self.is_active = false;
        self.revoked_at = Some(now);
        self.revoked_by = revoked_by;
        self.touch(now);
    }

    pub fn set_name(&mut self, name: impl Into<String>, now: DateTime<Utc>) {
        self.name = name.into();
        self.touch(now);
    }

    pub fn set_permissions(&mut self, permissions: BTreeSet<Permission>, now: DateTime<Utc>) {
        self.permissions = permissions;
        self.touch(now);
    }

    pub fn set_expiration(&mut self, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.expires_at = expires_at;
        self.touch(now);
    }

    pub fn set_rate_limit_override(
        &mut self,
        config: Option<BucketConfig>,
        now: DateTime<Utc>,
    ) {
        self.rate_limit_override = config;
        self.touch(now);
    }

    pub fn set_ip_allowlist(&mut self, allowlist: Vec<IpAddr>, now: DateTime<Utc>) {
        self.ip_allowlist = allowlist;
        self.touch(now);
    }

    pub fn set_user_agent_pattern(&mut self, pattern: Option<String>, now: DateTime<Utc>) {
        self.user_agent_pattern = pattern;
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Listing view that never exposes the full secret.
    pub fn redacted(&self) -> RedactedApiKey {
        let preview = if self.secret.len() > 12 {
            format!(
                "{}...{}",
                &self.secret[..8],
                &self.secret[self.secret.len() - 4..]
            )
        } else {
            "...".to_string()
        };

        RedactedApiKey {
            preview,
            name: self.name.clone(),
            permissions: self.permissions.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_used_at: self.last_used_at,
            usage_count: self.usage_count,
            is_active: self.is_active,
        }
    }
}

/// What listings and admin responses see instead of the raw record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactedApiKey {
    pub preview: String,
    pub name: String,
    pub permissions: BTreeSet<Permission>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: u64,
    pub is_active: bool,
}
