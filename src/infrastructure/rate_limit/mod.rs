//! Rate limiting infrastructure

mod governor;

pub use governor::{RateDecision, RateGovernor};
