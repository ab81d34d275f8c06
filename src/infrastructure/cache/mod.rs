//! Response caching infrastructure

mod invalidator;
mod response_cache;

pub use invalidator::{CacheInvalidator, ManualInvalidation};
pub use response_cache::ResponseCache;
