//! Deterministic raw cache key builders
//!
//! Raw keys are human-readable composites. Two calls with the same logical
//! inputs must build the same raw key regardless of map iteration order, so
//! all variable parts go through sorted maps.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use regex::Regex;

use crate::domain::cache::CacheType;
use crate::domain::store::key_digest;

/// Builds the raw key for an availability lookup.
///
/// Extra query parameters beyond the date range are folded into a short
/// digest so they vary the key without making it unbounded.
pub fn availability_key(
    property_id: u64,
    start: NaiveDate,
    end: NaiveDate,
    extra: &BTreeMap<String, String>,
) -> String {
    let base = format!(
        "availability:property:{}:range:{}:{}",
        property_id, start, end
    );
    append_params(base, extra)
}

/// Builds the raw key for a price quote lookup.
///
/// Guest counts are a sorted map (for example `adults`/`children`/`infants`)
/// joined into one stable component.
pub fn quote_key(
    property_id: u64,
    checkin: NaiveDate,
    checkout: NaiveDate,
    guests: &BTreeMap<String, u32>,
    extra: &BTreeMap<String, String>,
) -> String {
    let guest_part = guests
        .values()
        .map(|count| count.to_string())
        .collect::<Vec<_>>()
        .join("-");
    let base = format!(
        "quote:property:{}:dates:{}:{}:guests:{}",
        property_id, checkin, checkout, guest_part
    );
    append_params(base, extra)
}

/// Builds the raw key for a webhook endpoint response.
pub fn webhook_key(endpoint: &str, params: &BTreeMap<String, String>) -> String {
    append_params(format!("webhook:endpoint:{}", endpoint), params)
}

fn append_params(base: String, params: &BTreeMap<String, String>) -> String {
    if params.is_empty() {
        return base;
    }

    let canonical = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}:params:{}", base, &key_digest(&canonical)[..16])
}

/// Compiles a glob pattern (`*` wildcard only) into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{}$", escaped))
}

/// Extracts the cache type and property id from a raw key, when it follows
/// the `<type>:property:<id>:...` shape.
pub fn property_component(raw_key: &str) -> Option<(CacheType, u64)> {
    let mut parts = raw_key.split(':');
    let kind = CacheType::from_raw_key(raw_key)?;

    parts.next()?;
    if parts.next()? != "property" {
        return None;
    }
    let id = parts.next()?.parse().ok()?;

    Some((kind, id))
}

/// Extracts the cached date span from a raw key, when present.
///
/// Availability keys carry `range:<start>:<end>`, quote keys carry
/// `dates:<checkin>:<checkout>`.
pub fn parse_range(raw_key: &str) -> Option<(NaiveDate, NaiveDate)> {
    let parts: Vec<&str> = raw_key.split(':').collect();

    for (i, part) in parts.iter().enumerate() {
        if (*part == "range" || *part == "dates") && i + 2 < parts.len() {
            let start = parts[i + 1].parse().ok()?;
            let end = parts[i + 2].parse().ok()?;
            return Some((start, end));
        }
    }

    None
}
