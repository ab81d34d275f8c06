//! Domain layer - Core protection types and contracts

pub mod api_key;
pub mod cache;
pub mod clock;
pub mod error;
pub mod event;
pub mod rate_limit;
pub mod store;

pub use api_key::{
    sanitize_permissions, validate_secret_format, ApiKeyFormatError, ApiKeyRecord, Permission,
    RedactedApiKey,
};
pub use cache::{CacheEntry, CacheStats, CacheType, CacheTypeStats};
pub use clock::{Clock, SystemClock};
pub use error::DomainError;
pub use event::{BookingState, DomainEvent, PropertySyncOutcome};
pub use rate_limit::{BucketConfig, BucketOverride, FailPolicy, Identifier, RateBucket};
pub use store::{key_digest, KeyValueStore, StoreExt};
