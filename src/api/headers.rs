//! Rate-limit and cache header names and helpers

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::domain::rate_limit::RateBucket;
use crate::infrastructure::rate_limit::RateDecision;

pub const RATE_LIMIT_BUCKET: HeaderName = HeaderName::from_static("x-ratelimit-bucket");
pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const CACHE_STATUS: HeaderName = HeaderName::from_static("x-cache");

/// Writes the standard rate-limit headers for a decision.
pub fn apply_rate_headers(headers: &mut HeaderMap, bucket: RateBucket, decision: &RateDecision) {
    headers.insert(RATE_LIMIT_BUCKET, HeaderValue::from_static(bucket.as_str()));
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining()));
    headers.insert(
        RATE_LIMIT_RESET,
        HeaderValue::from(decision.retry_after.as_secs()),
    );
}

/// `X-Cache: HIT` / `X-Cache: MISS` for handlers serving from the cache.
pub fn cache_status(hit: bool) -> (HeaderName, HeaderValue) {
    let value = if hit {
        HeaderValue::from_static("HIT")
    } else {
        HeaderValue::from_static("MISS")
    };

    (CACHE_STATUS, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_apply_rate_headers() {
        let mut headers = HeaderMap::new();
        let decision = RateDecision {
            allowed: true,
            limit: 60,
            count: 12,
            retry_after: Duration::ZERO,
        };

        apply_rate_headers(&mut headers, RateBucket::Availability, &decision);

        assert_eq!(headers[&RATE_LIMIT_BUCKET], "availability");
        assert_eq!(headers[&RATE_LIMIT_LIMIT], "60");
        assert_eq!(headers[&RATE_LIMIT_REMAINING], "48");
        assert_eq!(headers[&RATE_LIMIT_RESET], "0");
    }

    #[test]
    fn test_cache_status() {
        assert_eq!(cache_status(true).1, "HIT");
        assert_eq!(cache_status(false).1, "MISS");
    }
}
