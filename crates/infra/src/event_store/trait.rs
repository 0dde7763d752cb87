use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use ledgerdesk_core::{AggregateId, ExpectedVersion, TenantId, UserId};
use std::sync::Arc;

/// An event decided by an aggregate, serialized and waiting for a sequence number.
///
/// ## Where it sits
///
/// 1. An aggregate's `handle` returns typed domain events.
/// 2. The dispatcher wraps each one as an `UncommittedEvent`: JSON payload,
///    stream metadata and the acting user.
/// 3. `EventStore::append` persists the batch and hands back `StoredEvent`s
///    with sequence numbers.
/// 4. Each stored event becomes an `EventEnvelope` for the bus.
///
/// Build one with [`UncommittedEvent::from_typed`]. It copies `event_type`,
/// `event_version` and `occurred_at` off the typed event so the payload can
/// be decoded again later without knowing the Rust type up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub actor: Option<UserId>,

    pub payload: JsonValue,
}

/// A persisted event in an append-only stream.
///
/// ## Sequence numbers
///
/// Numbers are per `(tenant_id, aggregate_id)` stream. They start at 1, grow
/// by one per event and never change once assigned. Three things lean on
/// them:
///
/// - replay order when an aggregate is rehydrated;
/// - optimistic concurrency, since the last number is the aggregate version
///   that `ExpectedVersion` is checked against;
/// - redelivery detection downstream. A republished envelope keeps its
///   sequence number, so read models and the audit log drop anything at or
///   behind the last number they applied for that stream.
///
/// [`StoredEvent::to_envelope`] produces the copy that goes on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub actor: Option<UserId>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into a tenant-scoped envelope for publication.
    pub fn to_envelope(&self) -> ledgerdesk_events::EventEnvelope<JsonValue> {
        ledgerdesk_events::EventEnvelope::new(
            self.event_id,
            self.tenant_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.event_type.clone(),
            self.occurred_at,
            self.payload.clone(),
        )
        .with_actor(self.actor)
    }
}

/// Event store failure.
///
/// These are infrastructure errors. A domain rejection never reaches the
/// store; it stops at the aggregate's `handle`. The dispatcher maps each
/// variant onto a `DispatchError`, and only `Concurrency` is worth retrying
/// (reload, re-handle, append again).
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The stream moved past the expected version.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A batch mixed tenants, or a read crossed a tenant boundary.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// The stream already belongs to a different aggregate type.
    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    /// Malformed batch or a storage failure.
    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event publication failed: {0}")]
    Publish(String),
}

/// Append-only, tenant-scoped event store.
///
/// The store is the system of record: aggregates are rebuilt from it and read
/// models can always be replayed from it. Events are never updated or
/// deleted. An edit or a void is itself a new event, and a ledger
/// correction is a reversing journal.
///
/// ## Streams
///
/// One stream per aggregate instance, keyed by `(tenant_id, aggregate_id)`.
/// A stream is bound to one aggregate type by its first event. Ledger,
/// posting-record and stock streams use deterministic ids derived from the
/// tenant and the source, so every writer finds the same stream.
///
/// ## Append
///
/// Implementations must:
/// - reject batches that mix tenants, aggregates or aggregate types;
/// - reject an append to a stream of another aggregate type;
/// - check `expected_version` against the current stream version and fail
///   with `Concurrency` on mismatch;
/// - assign sequence numbers starting at `current_version + 1`;
/// - persist the whole batch or none of it.
///
/// An empty batch is a no-op that returns no events.
///
/// ## Load
///
/// `load_stream` returns the stream in sequence order, or an empty vector
/// when it does not exist yet (an aggregate at version 0). It never returns
/// another tenant's events, even for the same aggregate id.
///
/// The in-memory store serves tests and single-process runs. The Postgres
/// store enforces the same rules with a unique `(tenant_id, aggregate_id,
/// sequence_number)` key inside one transaction.
pub trait EventStore: Send + Sync {
    /// Append a batch to one stream.
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load a whole stream, oldest first.
    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(tenant_id, aggregate_id)
    }
}

impl UncommittedEvent {
    /// Build an uncommitted event from a typed domain event.
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: ledgerdesk_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            actor: None,
            payload,
        })
    }

    pub fn with_actor(mut self, actor: Option<UserId>) -> Self {
        self.actor = actor;
        self
    }
}
