//! Event-driven cache invalidation
//!
//! Maps domain write events to forget patterns. The invalidator is handed
//! to callers explicitly; nothing registers itself into a global hook
//! table, so the full set of eviction triggers is visible at the call site.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::domain::cache::CacheType;
use crate::domain::event::{affects_availability, affects_pricing, DomainEvent};
use crate::domain::DomainError;

use super::ResponseCache;

/// Criteria for an operator-initiated eviction.
#[derive(Debug, Clone, Default)]
pub struct ManualInvalidation {
    pub property_ids: Vec<u64>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub types: Vec<CacheType>,
}

impl ManualInvalidation {
    fn is_empty(&self) -> bool {
        self.property_ids.is_empty() && self.date_range.is_none() && self.types.is_empty()
    }
}

/// Consumes domain events and evicts the cache entries they stale.
#[derive(Debug)]
pub struct CacheInvalidator {
    cache: Arc<ResponseCache>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }

    /// Applies one event, returning how many entries were evicted.
    pub async fn handle(&self, event: &DomainEvent) -> Result<usize, DomainError> {
        let evicted = match event {
            DomainEvent::PropertySaved { property_id }
            | DomainEvent::PropertyDeleted { property_id } => {
                self.invalidate_property(*property_id).await?
            }
            DomainEvent::BookingStateChanged {
                property_id,
                checkin,
                checkout,
                ..
            } => {
                // Every transition moves inventory or price, so both caches
                // go; availability only where the span overlaps.
                let mut evicted = self
                    .cache
                    .forget_availability_overlapping(*property_id, *checkin, *checkout)
                    .await?;
                evicted += self.invalidate_quote(*property_id).await?;
                evicted
            }
            DomainEvent::CalendarSyncCompleted { outcomes } => {
                let mut evicted = 0;
                for outcome in outcomes.iter().filter(|o| o.changed()) {
                    evicted += self.invalidate_availability(outcome.property_id).await?;
                }
                evicted
            }
            DomainEvent::PropertyFieldChanged { property_id, field } => {
                let mut evicted = 0;
                if affects_pricing(field) {
                    evicted += self.invalidate_quote(*property_id).await?;
                }
                if affects_availability(field) {
                    evicted += self.invalidate_availability(*property_id).await?;
                }
                evicted
            }
        };

        if evicted > 0 {
            info!(?event, evicted, "Cache invalidated by domain event");
        }

        Ok(evicted)
    }

    /// Evicts everything cached for one property across all types.
    pub async fn invalidate_property(&self, property_id: u64) -> Result<usize, DomainError> {
        let mut evicted = self.invalidate_availability(property_id).await?;
        evicted += self.invalidate_quote(property_id).await?;
        Ok(evicted)
    }

    pub async fn invalidate_availability(&self, property_id: u64) -> Result<usize, DomainError> {
        self.cache
            .forget(&format!("availability:property:{}:*", property_id))
            .await
    }

    pub async fn invalidate_quote(&self, property_id: u64) -> Result<usize, DomainError> {
        self.cache
            .forget(&format!("quote:property:{}:*", property_id))
            .await
    }

    /// Evicts entries whose cached span starts or ends on the given dates,
    /// regardless of property.
    pub async fn invalidate_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<usize, DomainError> {
        let patterns = [
            format!("*:range:{}:*", start),
            format!("*:range:*:{}", end),
            format!("*:dates:{}:*", start),
            format!("*:dates:*:{}", end),
        ];

        let mut evicted = 0;
        for pattern in &patterns {
            evicted += self.cache.forget(pattern).await?;
        }

        Ok(evicted)
    }

    /// Operator-initiated eviction. Empty criteria clear the whole cache.
    pub async fn manual(&self, criteria: &ManualInvalidation) -> Result<usize, DomainError> {
        if criteria.is_empty() {
            return self.cache.clear(None).await;
        }

        let mut evicted = 0;

        for property_id in &criteria.property_ids {
            evicted += self.invalidate_property(*property_id).await?;
        }

        if let Some((start, end)) = criteria.date_range {
            evicted += self.invalidate_date_range(start, end).await?;
        }

        for kind in &criteria.types {
            evicted += self.cache.clear(Some(*kind)).await?;
        }

        Ok(evicted)
    }
}
