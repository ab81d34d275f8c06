//! Request middleware

pub mod admission;

pub use admission::{bucket_for_path, govern, ValidatedKey, API_KEY_HEADER};
