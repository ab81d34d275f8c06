//! Response cache domain types and key builders

mod entry;
pub mod key;

pub use entry::{CacheEntry, CacheStats, CacheType, CacheTypeStats};
pub use key::{availability_key, glob_to_regex, quote_key, webhook_key};
