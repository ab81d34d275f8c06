//! API key domain
//!
//! Records, the permission vocabulary, and secret format rules. Lifecycle
//! operations live in the infrastructure registry.

mod entity;
mod validation;

pub use entity::{sanitize_permissions, ApiKeyRecord, Permission, RedactedApiKey};
pub use validation::{
    validate_secret_format, ApiKeyFormatError, KEY_BODY_LENGTH, KEY_PREFIX,
};
