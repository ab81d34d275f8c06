//! Stayguard
//!
//! Protection layer for a property booking read API:
//! - Fixed-window rate limiting per bucket and caller identity
//! - TTL response cache with glob invalidation and stats
//! - Domain-event driven cache invalidation
//! - API key lifecycle (generate, validate, revoke, update, cleanup)

pub mod api;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use api::ProtectionState;
pub use config::AppConfig;
