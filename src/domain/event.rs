//! Domain write events consumed by cache invalidation
//!
//! Events are transient signals emitted by the booking application after a
//! successful write. They are handed to the invalidator synchronously and
//! never persisted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Property fields whose change invalidates cached price quotes.
const PRICE_FIELDS: [&str; 6] = [
    "base_price",
    "cleaning_fee",
    "extra_adult_fee",
    "extra_child_fee",
    "tax_rate",
    "seasonal_rates",
];

/// Property fields whose change invalidates cached availability.
const AVAILABILITY_FIELDS: [&str; 5] = [
    "min_stay",
    "max_stay",
    "advance_booking_days",
    "instant_booking",
    "availability_rules",
];

pub fn affects_pricing(field: &str) -> bool {
    PRICE_FIELDS.contains(&field)
}

pub fn affects_availability(field: &str) -> bool {
    AVAILABILITY_FIELDS.contains(&field)
}

/// Lifecycle state of a booking, as reported by the owning application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingState {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

/// Per-property result of one external calendar sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySyncOutcome {
    pub property_id: u64,
    pub added: u32,
    pub updated: u32,
    pub removed: u32,
}

impl PropertySyncOutcome {
    /// Whether the sync actually touched this property's calendar.
    pub fn changed(&self) -> bool {
        self.added > 0 || self.updated > 0 || self.removed > 0
    }
}

/// A write that happened in the booking application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    PropertySaved {
        property_id: u64,
    },
    PropertyDeleted {
        property_id: u64,
    },
    BookingStateChanged {
        property_id: u64,
        booking_id: u64,
        old_state: BookingState,
        new_state: BookingState,
        checkin: NaiveDate,
        checkout: NaiveDate,
    },
    CalendarSyncCompleted {
        outcomes: Vec<PropertySyncOutcome>,
    },
    PropertyFieldChanged {
        property_id: u64,
        field: String,
    },
}
