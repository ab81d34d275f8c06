//! API key secret format validation

use thiserror::Error;

/// All issued secrets start with this prefix.
pub const KEY_PREFIX: &str = "sg_";

/// Length of the random body after the prefix.
pub const KEY_BODY_LENGTH: usize = 32;

/// Errors for a secret that cannot possibly be a key we issued.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiKeyFormatError {
    #[error("API key must start with '{}'", KEY_PREFIX)]
    MissingPrefix,

    #[error("API key body must be exactly {KEY_BODY_LENGTH} characters")]
    WrongLength,

    #[error("API key contains invalid character: '{0}'")]
    InvalidCharacter(char),
}

/// Checks the shape of a presented secret without touching storage.
///
/// Runs before any lookup so malformed tokens are rejected for free.
pub fn validate_secret_format(secret: &str) -> Result<(), ApiKeyFormatError> {
    let body = secret
        .strip_prefix(KEY_PREFIX)
        .ok_or(ApiKeyFormatError::MissingPrefix)?;

    if body.len() != KEY_BODY_LENGTH {
        return Err(ApiKeyFormatError::WrongLength);
    }

    for c in body.chars() {
        if !c.is_ascii_alphanumeric() {
            return Err(ApiKeyFormatError::InvalidCharacter(c));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_secret() {
        assert!(validate_secret_format("sg_abcdefghjkmnpqrstuvwxyz23456789A").is_ok());
    }

    #[test]
    fn test_missing_prefix() {
        assert_eq!(
            validate_secret_format("pk_abcdefghjkmnpqrstuvwxyz23456789AB"),
            Err(ApiKeyFormatError::MissingPrefix)
        );
        assert_eq!(
            validate_secret_format(""),
            Err(ApiKeyFormatError::MissingPrefix)
        );
    }

    #[test]
    fn test_wrong_length() {
        assert_eq!(
            validate_secret_format("sg_short"),
            Err(ApiKeyFormatError::WrongLength)
        );
        let long = format!("sg_{}", "a".repeat(33));
        assert_eq!(
            validate_secret_format(&long),
            Err(ApiKeyFormatError::WrongLength)
        );
    }

    #[test]
    fn test_invalid_character() {
        let bad = format!("sg_{}!", "a".repeat(31));
        assert_eq!(
            validate_secret_format(&bad),
            Err(ApiKeyFormatError::InvalidCharacter('!'))
        );
    }
}
