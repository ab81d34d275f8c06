//! Infrastructure layer - Concrete protection components

pub mod api_key;
pub mod cache;
pub mod logging;
pub mod rate_limit;
pub mod store;
