//! Shared state for the protection layer

use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::store::KeyValueStore;
use crate::infrastructure::api_key::ApiKeyRegistry;
use crate::infrastructure::cache::{CacheInvalidator, ResponseCache};
use crate::infrastructure::rate_limit::RateGovernor;
use crate::infrastructure::store::InMemoryStore;

/// Everything the admission middleware and handlers need, cheaply
/// cloneable per request.
#[derive(Clone)]
pub struct ProtectionState {
    pub governor: Arc<RateGovernor>,
    pub cache: Arc<ResponseCache>,
    pub invalidator: Arc<CacheInvalidator>,
    pub api_keys: Arc<ApiKeyRegistry>,
}

impl ProtectionState {
    /// Wires all components over one shared store and the system clock.
    pub fn from_config(config: &AppConfig) -> Self {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        Self::with_store(config, store, Arc::new(SystemClock))
    }

    /// Same wiring with an explicit store and clock, used by tests.
    pub fn with_store(
        config: &AppConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let governor = Arc::new(
            RateGovernor::new(store.clone(), clock.clone())
                .with_overrides(config.protection.rate_limits.clone())
                .with_fail_policy(config.protection.fail_policy)
                .with_log_sample_rate(config.protection.log_sample_rate),
        );

        let cache = Arc::new(
            ResponseCache::new(store.clone(), clock.clone())
                .with_ttl_overrides(config.protection.cache_ttl.clone()),
        );

        let invalidator = Arc::new(CacheInvalidator::new(cache.clone()));
        let api_keys = Arc::new(ApiKeyRegistry::new(store, clock));

        Self {
            governor,
            cache,
            invalidator,
            api_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use axum::http::{header, Request, StatusCode};
    use axum::{body::Body, middleware, routing::get, Router};
    use chrono::{Duration, NaiveDate, Utc};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::api::headers::{RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING};
    use crate::api::middleware::{govern, API_KEY_HEADER};
    use crate::domain::clock::ManualClock;
    use crate::domain::rate_limit::BucketOverride;
    use crate::domain::cache::availability_key;

    fn config_with_availability_limit(limit: u32) -> AppConfig {
        let mut config = AppConfig::default();
        config.protection.rate_limits.insert(
            "availability".to_string(),
            BucketOverride {
                limit: Some(limit),
                window_secs: None,
            },
        );
        config
    }

    fn test_state(config: &AppConfig) -> (ProtectionState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store: Arc<dyn KeyValueStore> =
            Arc::new(InMemoryStore::with_clock(clock.clone()));
        (
            ProtectionState::with_store(config, store, clock.clone()),
            clock,
        )
    }

    fn protected_app(state: ProtectionState) -> Router {
        Router::new()
            .route("/availability/{id}", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, govern))
    }

    fn availability_request() -> Request<Body> {
        Request::builder()
            .uri("/availability/1")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_middleware_denies_over_limit() {
        let config = config_with_availability_limit(2);
        let (state, _clock) = test_state(&config);
        let app = protected_app(state);

        // Remaining counts the request that was just admitted
        for remaining in ["1", "0"] {
            let response = app.clone().oneshot(availability_request()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[&RATE_LIMIT_LIMIT], "2");
            assert_eq!(response.headers()[&RATE_LIMIT_REMAINING], remaining);
        }

        let response = app.clone().oneshot(availability_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[&RATE_LIMIT_REMAINING], "0");
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_middleware_window_reset_restores_budget() {
        let config = config_with_availability_limit(1);
        let (state, clock) = test_state(&config);
        let app = protected_app(state);

        let ok = app.clone().oneshot(availability_request()).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let denied = app.clone().oneshot(availability_request()).await.unwrap();
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);

        clock.advance(Duration::seconds(61));

        let again = app.clone().oneshot(availability_request()).await.unwrap();
        assert_eq!(again.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_callers_sharing_a_key_share_its_budget() {
        let config = config_with_availability_limit(2);
        let (state, _clock) = test_state(&config);

        let record = state
            .api_keys
            .generate("shared", &["read:availability".to_string()], None, None)
            .await
            .unwrap();
        let secret = record.secret().to_string();

        let app = protected_app(state);

        let request = |forwarded: &str| {
            Request::builder()
                .uri("/availability/1")
                .header(API_KEY_HEADER, &secret)
                .header("x-forwarded-for", forwarded)
                .body(Body::empty())
                .unwrap()
        };

        // Two distinct addresses presenting the same key spend one budget
        let first = app.clone().oneshot(request("198.51.100.1")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.clone().oneshot(request("203.0.113.9")).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);

        let third = app.clone().oneshot(request("198.51.100.1")).await.unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_concurrent_callers_exhaust_shared_limit_of_fifty() {
        let config = config_with_availability_limit(50);
        let (state, _clock) = test_state(&config);

        let record = state
            .api_keys
            .generate("busy", &["read:availability".to_string()], None, None)
            .await
            .unwrap();
        let secret = record.secret().to_string();

        let app = protected_app(state);

        let caller = |app: Router, secret: String, forwarded: &'static str| async move {
            for _ in 0..25 {
                let request = Request::builder()
                    .uri("/availability/1")
                    .header(API_KEY_HEADER, &secret)
                    .header("x-forwarded-for", forwarded)
                    .body(Body::empty())
                    .unwrap();

                let response = app.clone().oneshot(request).await.unwrap();
                assert_eq!(response.status(), StatusCode::OK);
            }
        };

        let first = tokio::spawn(caller(app.clone(), secret.clone(), "93.184.216.34"));
        let second = tokio::spawn(caller(app.clone(), secret.clone(), "93.184.216.35"));
        first.await.unwrap();
        second.await.unwrap();

        let over = Request::builder()
            .uri("/availability/1")
            .header(API_KEY_HEADER, &secret)
            .body(Body::empty())
            .unwrap();

        let response = app.clone().oneshot(over).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[&RATE_LIMIT_REMAINING], "0");
    }

    #[tokio::test]
    async fn test_cache_expires_with_simulated_time() {
        let (state, clock) = test_state(&AppConfig::default());

        let key = availability_key(
            7,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 8).unwrap(),
            &BTreeMap::new(),
        );

        state
            .cache
            .put(&key, json!({"available": true}), None, BTreeMap::new())
            .await
            .unwrap();

        assert!(state.cache.get(&key).await.unwrap().is_some());

        clock.advance(Duration::seconds(91));
        assert!(state.cache.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_key_lifecycle_through_state() {
        let (state, _clock) = test_state(&AppConfig::default());

        let record = state
            .api_keys
            .generate("lifecycle", &["read:quote".to_string()], None, None)
            .await
            .unwrap();
        let secret = record.secret().to_string();

        assert!(state
            .api_keys
            .validate(&secret, None, None)
            .await
            .unwrap()
            .is_some());

        assert!(state.api_keys.revoke(&secret, Some("ops")).await.unwrap());
        assert!(state
            .api_keys
            .validate(&secret, None, None)
            .await
            .unwrap()
            .is_none());

        let listed = state.api_keys.list(true).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].is_active);
    }
}
