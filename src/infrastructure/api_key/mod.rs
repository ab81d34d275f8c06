//! API key infrastructure

mod generator;
mod registry;

pub use generator::{constant_time_eq, ApiKeyGenerator};
pub use registry::{ApiKeyRegistry, ApiKeyUpdate, UsageStats};
