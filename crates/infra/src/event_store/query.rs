//! Read-only event inspection: tenant-scoped, filtered and paginated.

use chrono::{DateTime, Utc};
use ledgerdesk_core::{AggregateId, TenantId};
use serde::{Deserialize, Serialize};

use crate::event_store::{EventStoreError, StoredEvent};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Limit defaults to 50 and is capped at 1000.
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    pub aggregate_id: Option<AggregateId>,
    /// e.g. "invoicing.invoice"
    pub aggregate_type: Option<String>,
    /// e.g. "invoicing.invoice.issued"
    pub event_type: Option<String>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &StoredEvent) -> bool {
        self.aggregate_id.is_none_or(|id| id == event.aggregate_id)
            && self
                .aggregate_type
                .as_deref()
                .is_none_or(|t| t == event.aggregate_type)
            && self.event_type.as_deref().is_none_or(|t| t == event.event_type)
            && self.occurred_after.is_none_or(|t| event.occurred_at >= t)
            && self.occurred_before.is_none_or(|t| event.occurred_at <= t)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventQueryResult {
    pub events: Vec<StoredEvent>,
    /// Number of matching events across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl EventQueryResult {
    /// Cut one page out of an already filtered and ordered result set.
    pub fn page(matching: Vec<StoredEvent>, pagination: Pagination) -> Self {
        let total = matching.len() as u64;
        let events: Vec<StoredEvent> = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        let has_more = total > u64::from(pagination.offset) + u64::from(pagination.limit);
        Self {
            events,
            total,
            pagination,
            has_more,
        }
    }
}

/// Async query interface for event inspection.
#[async_trait::async_trait]
pub trait EventQuery: Send + Sync {
    /// Events ordered by `occurred_at` descending, then sequence number ascending.
    async fn query_events(
        &self,
        tenant_id: TenantId,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError>;

    /// One aggregate's stream in sequence order.
    async fn get_aggregate_events(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        pagination: Option<Pagination>,
    ) -> Result<EventQueryResult, EventStoreError>;

    async fn get_event_by_id(
        &self,
        tenant_id: TenantId,
        event_id: uuid::Uuid,
    ) -> Result<Option<StoredEvent>, EventStoreError>;
}
