//! Admission control middleware
//!
//! Resolves the caller identity, consults the rate governor, and answers
//! 429 with `Retry-After` when the budget is spent. Valid API keys are
//! attached to the request as a [`ValidatedKey`] extension for handlers.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::debug;

use crate::api::headers::apply_rate_headers;
use crate::api::state::ProtectionState;
use crate::domain::api_key::ApiKeyRecord;
use crate::domain::rate_limit::{first_public_forwarded, Identifier, RateBucket};

/// Header carrying our own API keys; generic fallbacks are also accepted.
pub const API_KEY_HEADER: &str = "x-stayguard-api-key";

const FORWARDED_HEADERS: [&str; 5] = [
    "cf-connecting-ip",
    "x-forwarded-for",
    "x-forwarded",
    "x-cluster-client-ip",
    "forwarded-for",
];

/// Request extension holding the validated key record.
#[derive(Debug, Clone)]
pub struct ValidatedKey(pub ApiKeyRecord);

/// Maps a request path to its admission bucket. Paths outside the
/// protected surface are not governed.
pub fn bucket_for_path(path: &str) -> Option<RateBucket> {
    if path.starts_with("/availability") {
        Some(RateBucket::Availability)
    } else if path.starts_with("/quote") {
        Some(RateBucket::Quote)
    } else if path.starts_with("/webhook") {
        Some(RateBucket::Webhook)
    } else {
        None
    }
}

pub async fn govern(
    State(state): State<ProtectionState>,
    mut req: Request,
    next: Next,
) -> Response {
    let bucket = match bucket_for_path(req.uri().path()) {
        Some(bucket) => bucket,
        None => return next.run(req).await,
    };

    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]));

    let presented_key = extract_api_key(req.headers());
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut rate_override = None;

    // A presented key is the identity even when it fails validation, so
    // probing with a bad key spends that key's budget, not the address's.
    let identifier = match presented_key {
        Some(secret) => {
            match state
                .api_keys
                .validate(&secret, Some(remote), user_agent.as_deref())
                .await
            {
                Ok(Some(record)) => {
                    rate_override = record.rate_limit_override();
                    req.extensions_mut().insert(ValidatedKey(record));
                }
                Ok(None) => {
                    debug!(bucket = %bucket, "Request carried an invalid API key");
                }
                Err(e) => {
                    debug!(bucket = %bucket, error = %e, "API key validation failed");
                }
            }

            Identifier::ApiKey(secret)
        }
        None => Identifier::Ip(client_ip(req.headers(), remote)),
    };

    let mut decision = state
        .governor
        .check_with(bucket, &identifier, rate_override)
        .await;

    if !decision.allowed {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "rate_limited",
                "message": "Too many requests, slow down",
                "retry_after": decision.retry_after.as_secs(),
            })),
        )
            .into_response();

        apply_rate_headers(response.headers_mut(), bucket, &decision);
        if let Ok(value) = decision.retry_after.as_secs().to_string().parse() {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }

        return response;
    }

    state
        .governor
        .record_with(bucket, &identifier, rate_override)
        .await;

    // Fold this request into the emitted headers so Remaining reflects
    // the budget after admission, not before.
    decision.count += 1;

    let mut response = next.run(req).await;
    apply_rate_headers(response.headers_mut(), bucket, &decision);
    response
}

fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    for name in [API_KEY_HEADER, "x-api-key"] {
        if let Some(value) = headers.get(name) {
            if let Ok(key) = value.to_str() {
                return Some(key.trim().to_string());
            }
        }
    }

    if let Some(auth) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth) = auth.to_str() {
            if let Some(token) = auth.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    None
}

/// Best public address claimed by the proxy chain, falling back to the
/// raw connection address.
fn client_ip(headers: &HeaderMap, remote: IpAddr) -> IpAddr {
    for name in FORWARDED_HEADERS {
        if let Some(value) = headers.get(name) {
            if let Ok(chain) = value.to_str() {
                if let Some(addr) = first_public_forwarded(chain) {
                    return addr;
                }
            }
        }
    }

    remote
}
