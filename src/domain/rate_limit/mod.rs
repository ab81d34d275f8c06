//! Rate limiting domain types

pub mod bucket;
pub mod identity;

pub use bucket::{BucketConfig, BucketOverride, FailPolicy, RateBucket};
pub use identity::{first_public_forwarded, Identifier};
