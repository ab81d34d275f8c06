//! API key secret generation
//!
//! Secrets are `sg_` plus 32 random characters from an alphabet with the
//! lookalike characters (0/O, 1/l/I) removed, so keys survive being read
//! aloud or retyped from a screenshot.

use rand::Rng;

use crate::domain::api_key::{KEY_BODY_LENGTH, KEY_PREFIX};

const ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyzABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generator for API key secrets.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyGenerator;

impl ApiKeyGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generates a fresh secret.
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let body: String = (0..KEY_BODY_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();

        format!("{}{}", KEY_PREFIX, body)
    }
}

/// Constant-time string comparison to prevent timing attacks
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    let mut result = 0u8;

    for i in 0..a.len() {
        result |= a_bytes[i] ^ b_bytes[i];
    }

    result == 0
}
