//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! command
//!   → load stream (tenant-scoped) and validate it
//!   → rehydrate the aggregate
//!   → handle (pure decision)
//!   → append with ExpectedVersion::Exact(current)
//!   → publish committed envelopes
//! ```
//!
//! Domain rejections, store failures and bus failures all surface as
//! `DispatchError`. Publication happens only after a successful append, so a
//! `Publish` error means the events are durable but subscribers may have
//! missed them.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use ledgerdesk_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId, UserId};
use ledgerdesk_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale aggregate version on append.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// Duplicate or state conflict decided by the aggregate.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    /// A historical payload no longer matches the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Publication failed after a successful append.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound(what) => DispatchError::NotFound(what),
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine over any `EventStore` and `EventBus`.
///
/// Each dispatch touches exactly one aggregate stream. Aggregates must be
/// deterministic: replaying the same events always yields the same state.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command with no recorded actor.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: ledgerdesk_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatch_as(None, tenant_id, aggregate_id, aggregate_type, command, make_aggregate)
    }

    /// Dispatch a command on behalf of `actor`, who is stamped on every committed event.
    ///
    /// Returns the committed events; an empty vector means the command was a no-op.
    pub fn dispatch_as<A>(
        &self,
        actor: Option<UserId>,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: ledgerdesk_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(tenant_id, aggregate_id, aggregate_type.clone(), Uuid::now_v7(), ev)
                    .map(|e| e.with_actor(actor))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;
        debug!(
            aggregate_type = %aggregate_type,
            aggregate_id = %aggregate_id,
            events = committed.len(),
            "events committed"
        );

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Rehydrate an aggregate from its stream without handling a command.
    ///
    /// A missing stream yields the empty aggregate (version 0).
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event =
            serde_json::from_value(stored.payload.clone()).map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledgerdesk_core::AggregateRoot;
    use ledgerdesk_events::InMemoryEventBus;
    use ledgerdesk_products::{
        CreateProduct, Product, ProductCommand, ProductEvent, ProductId, ProductPricing,
    };
    use std::sync::Arc;

    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn create(tenant_id: TenantId, product_id: ProductId, sku: &str) -> ProductCommand {
        ProductCommand::CreateProduct(CreateProduct {
            tenant_id,
            product_id,
            sku: sku.to_string(),
            name: "Widget".to_string(),
            pricing: ProductPricing {
                sale_price: 1_000,
                standard_cost: 600,
                tax_rate_bp: 1_000,
            },
            track_inventory: true,
            occurred_at: Utc::now(),
        })
    }

    fn make(_t: TenantId, id: AggregateId) -> Product {
        Product::empty(ProductId::new(id))
    }

    #[test]
    fn dispatch_appends_publishes_and_stamps_actor() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let tenant_id = TenantId::new();
        let product_id = ProductId::new(AggregateId::new());
        let actor = UserId::new();

        let committed = d
            .dispatch_as(Some(actor), tenant_id, product_id.0, "products.product", create(tenant_id, product_id, "W-1"), make)
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);
        assert_eq!(committed[0].actor, Some(actor));

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.event_type(), "products.product.created");
        assert_eq!(envelope.actor(), Some(actor));
        let _: ProductEvent = serde_json::from_value(envelope.into_payload()).unwrap();
    }

    #[test]
    fn load_rehydrates_and_domain_errors_map() {
        let d = dispatcher();
        let tenant_id = TenantId::new();
        let product_id = ProductId::new(AggregateId::new());
        d.dispatch(tenant_id, product_id.0, "products.product", create(tenant_id, product_id, "W-1"), make)
            .unwrap();

        let loaded: Product = d.load(tenant_id, product_id.0, make).unwrap();
        assert_eq!(loaded.version(), 1);
        assert_eq!(loaded.sku(), "W-1");

        let err = d
            .dispatch(tenant_id, product_id.0, "products.product", create(tenant_id, product_id, "W-1"), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)), "{err:?}");
    }

    #[test]
    fn other_tenant_sees_an_empty_stream() {
        let d = dispatcher();
        let tenant_id = TenantId::new();
        let product_id = ProductId::new(AggregateId::new());
        d.dispatch(tenant_id, product_id.0, "products.product", create(tenant_id, product_id, "W-1"), make)
            .unwrap();

        let other: Product = d.load(TenantId::new(), product_id.0, make).unwrap();
        assert_eq!(other.version(), 0);
        assert!(!other.is_created());
    }
}
