//! Caller identity for rate accounting

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Who a request is counted against.
///
/// A presented API key takes precedence over the caller's address, so all
/// consumers sharing one key also share one budget.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    ApiKey(String),
    Ip(IpAddr),
}

impl Identifier {
    /// Token used to derive the storage key for this identity's windows.
    pub fn storage_token(&self) -> String {
        match self {
            Self::ApiKey(key) => format!("apikey:{}", key),
            Self::Ip(addr) => format!("ip:{}", addr),
        }
    }

    /// Truncated form safe to emit in logs. Never logs a full secret.
    pub fn preview(&self) -> String {
        let token = self.storage_token();
        if token.len() <= 20 {
            token
        } else {
            format!("{}...", &token[..20])
        }
    }
}

/// Picks the first publicly routable address out of a comma-separated
/// forwarded-for chain. Private and reserved ranges are skipped because
/// any proxy can prepend them.
pub fn first_public_forwarded(chain: &str) -> Option<IpAddr> {
    chain
        .split(',')
        .filter_map(|part| part.trim().parse::<IpAddr>().ok())
        .find(|addr| is_public(addr))
}

fn is_public(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

fn is_public_v4(addr: &Ipv4Addr) -> bool {
    !(addr.is_private()
        || addr.is_loopback()
        || addr.is_link_local()
        || addr.is_broadcast()
        || addr.is_documentation()
        || addr.is_unspecified()
        // carrier-grade NAT, 100.64.0.0/10
        || (addr.octets()[0] == 100 && (addr.octets()[1] & 0xc0) == 64))
}

fn is_public_v6(addr: &Ipv6Addr) -> bool {
    // unique-local fc00::/7 and link-local fe80::/10
    let segments = addr.segments();
    !(addr.is_loopback()
        || addr.is_unspecified()
        || (segments[0] & 0xfe00) == 0xfc00
        || (segments[0] & 0xffc0) == 0xfe80)
}
