use std::collections::HashMap;
use std::sync::RwLock;

use ledgerdesk_core::{AggregateId, ExpectedVersion, TenantId};

use super::query::{EventFilter, EventQuery, EventQueryResult, Pagination};
use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// In-memory append-only event store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    /// Every event of a tenant, newest first (ties keep stream order).
    fn tenant_events(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let mut events: Vec<StoredEvent> = streams
            .iter()
            .filter(|(k, _)| k.tenant_id == tenant_id)
            .flat_map(|(_, s)| s.iter().cloned())
            .collect();
        events.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then(a.sequence_number.cmp(&b.sequence_number))
        });
        Ok(events)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };

        let tenant_id = first.tenant_id;
        let aggregate_id = first.aggregate_id;
        let aggregate_type = first.aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.tenant_id != tenant_id {
                return Err(EventStoreError::TenantIsolation(format!(
                    "batch contains multiple tenant_ids (index {idx})"
                )));
            }
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let stream = streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                tenant_id: e.tenant_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                actor: e.actor,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&key).cloned().unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl EventQuery for InMemoryEventStore {
    async fn query_events(
        &self,
        tenant_id: TenantId,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        let matching: Vec<StoredEvent> = self
            .tenant_events(tenant_id)?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        Ok(EventQueryResult::page(matching, pagination))
    }

    async fn get_aggregate_events(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        pagination: Option<Pagination>,
    ) -> Result<EventQueryResult, EventStoreError> {
        let stream = self.load_stream(tenant_id, aggregate_id)?;
        Ok(EventQueryResult::page(stream, pagination.unwrap_or_default()))
    }

    async fn get_event_by_id(
        &self,
        tenant_id: TenantId,
        event_id: uuid::Uuid,
    ) -> Result<Option<StoredEvent>, EventStoreError> {
        Ok(self
            .tenant_events(tenant_id)?
            .into_iter()
            .find(|e| e.event_id == event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, event_type: &str, minute: u32) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: "invoicing.invoice".to_string(),
            event_type: event_type.to_string(),
            event_version: 1,
            occurred_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0).unwrap(),
            actor: None,
            payload: json!({ "n": minute }),
        }
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(f)
    }

    #[test]
    fn append_assigns_contiguous_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let agg = AggregateId::new();

        let first = store
            .append(vec![event(tenant, agg, "a", 1), event(tenant, agg, "b", 2)], ExpectedVersion::Exact(0))
            .unwrap();
        assert_eq!(first.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![1, 2]);

        let second = store
            .append(vec![event(tenant, agg, "c", 3)], ExpectedVersion::Exact(2))
            .unwrap();
        assert_eq!(second[0].sequence_number, 3);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let agg = AggregateId::new();
        store.append(vec![event(tenant, agg, "a", 1)], ExpectedVersion::Exact(0)).unwrap();

        let err = store
            .append(vec![event(tenant, agg, "b", 2)], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn mixed_tenant_batch_is_rejected() {
        let store = InMemoryEventStore::new();
        let agg = AggregateId::new();
        let err = store
            .append(
                vec![event(TenantId::new(), agg, "a", 1), event(TenantId::new(), agg, "b", 2)],
                ExpectedVersion::Any,
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::TenantIsolation(_)));
    }

    #[test]
    fn streams_are_isolated_per_tenant() {
        let store = InMemoryEventStore::new();
        let agg = AggregateId::new();
        let a = TenantId::new();
        let b = TenantId::new();
        store.append(vec![event(a, agg, "a", 1)], ExpectedVersion::Any).unwrap();

        assert_eq!(store.load_stream(a, agg).unwrap().len(), 1);
        assert!(store.load_stream(b, agg).unwrap().is_empty());
    }

    #[test]
    fn query_filters_by_event_type_and_paginates_newest_first() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let agg = AggregateId::new();
        store
            .append(
                vec![
                    event(tenant, agg, "invoicing.invoice.created", 1),
                    event(tenant, agg, "invoicing.invoice.updated", 2),
                    event(tenant, agg, "invoicing.invoice.updated", 3),
                ],
                ExpectedVersion::Any,
            )
            .unwrap();

        let filter = EventFilter {
            event_type: Some("invoicing.invoice.updated".to_string()),
            ..Default::default()
        };
        let page = block_on(store.query_events(tenant, filter, Pagination::new(Some(1), None))).unwrap();
        assert_eq!(page.total, 2);
        assert!(page.has_more);
        assert_eq!(page.events[0].sequence_number, 3);

        let other = block_on(store.query_events(TenantId::new(), EventFilter::default(), Pagination::default())).unwrap();
        assert_eq!(other.total, 0);
    }
}
