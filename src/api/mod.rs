//! HTTP surface of the protection layer
//!
//! The admission middleware is mounted in front of the protected read
//! API; handlers use [`ProtectionState`] for cache lookups and key
//! management.

pub mod headers;
pub mod middleware;
pub mod state;

pub use middleware::{govern, ValidatedKey};
pub use state::ProtectionState;
