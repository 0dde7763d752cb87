//! Postgres-backed event store.
//!
//! Schema: `migrations/0001_events.sql`. The unique key
//! `(tenant_id, aggregate_id, sequence_number)` backs optimistic concurrency: a
//! concurrent append that slips past the version check fails on insert with
//! `23505` and is reported as `EventStoreError::Concurrency`.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::instrument;

use ledgerdesk_core::{AggregateId, ExpectedVersion, TenantId, UserId};

use super::query::{EventFilter, EventQuery, EventQueryResult, Pagination};
use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

const SCHEMA: &str = include_str!("../../migrations/0001_events.sql");

const EVENT_COLUMNS: &str = "event_id, tenant_id, aggregate_id, aggregate_type, sequence_number, \
     event_type, event_version, occurred_at, actor_id, payload";

#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the `events` table exists.
    pub async fn connect(database_url: &str) -> Result<Self, EventStoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id), err)]
    pub async fn load_stream_async(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE tenant_id = $1 AND aggregate_id = $2 \
             ORDER BY sequence_number ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows.iter().map(decode_row).collect()
    }

    #[instrument(
        skip(self, events),
        fields(event_count = events.len(), expected_version = ?expected_version),
        err
    )]
    pub async fn append_async(
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (current_version, existing_type) = check_stream_version(&mut tx, tenant_id, aggregate_id).await?;

        if let Some(existing) = existing_type {
            if existing != aggregate_type {
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        if !expected_version.matches(current_version) {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current_version}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        let mut next = current_version + 1;
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                    event_type, event_version, occurred_at, actor_id, payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(event.event_id)
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .bind(&aggregate_type)
            .bind(next as i64)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(event.occurred_at)
            .bind(event.actor.map(|a| *a.as_uuid()))
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    EventStoreError::Concurrency(format!(
                        "concurrent append detected: sequence_number {next} already exists"
                    ))
                } else {
                    map_sqlx_error("insert_event", e)
                }
            })?;

            committed.push(StoredEvent {
                event_id: event.event_id,
                tenant_id: event.tenant_id,
                aggregate_id: event.aggregate_id,
                aggregate_type: event.aggregate_type,
                sequence_number: next,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                actor: event.actor,
                payload: event.payload,
            });
            next += 1;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(committed)
    }
}

/// `(current_version, aggregate_type)`; `(0, None)` for a missing stream.
async fn check_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(MAX(sequence_number), 0) AS current_version,
            MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE tenant_id = $1 AND aggregate_id = $2
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current: i64 = row
        .try_get("current_version")
        .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read current_version: {e}")))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read aggregate_type: {e}")))?;

    Ok((current as u64, aggregate_type))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                _ => EventStoreError::InvalidAppend(msg),
            }
        }
        sqlx::Error::PoolClosed => EventStoreError::InvalidAppend(format!("connection pool closed in {operation}")),
        other => EventStoreError::InvalidAppend(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[derive(Debug)]
struct StoredEventRow {
    event_id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    aggregate_id: uuid::Uuid,
    aggregate_type: String,
    sequence_number: i64,
    event_type: String,
    event_version: i32,
    occurred_at: DateTime<Utc>,
    actor_id: Option<uuid::Uuid>,
    payload: serde_json::Value,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for StoredEventRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEventRow {
            event_id: row.try_get("event_id")?,
            tenant_id: row.try_get("tenant_id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            sequence_number: row.try_get("sequence_number")?,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get("event_version")?,
            occurred_at: row.try_get("occurred_at")?,
            actor_id: row.try_get("actor_id")?,
            payload: row.try_get("payload")?,
        })
    }
}

impl From<StoredEventRow> for StoredEvent {
    fn from(row: StoredEventRow) -> Self {
        StoredEvent {
            event_id: row.event_id,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            aggregate_type: row.aggregate_type,
            sequence_number: row.sequence_number as u64,
            event_type: row.event_type,
            event_version: row.event_version as u32,
            occurred_at: row.occurred_at,
            actor: row.actor_id.map(UserId::from_uuid),
            payload: row.payload,
        }
    }
}

fn decode_row(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    StoredEventRow::from_row(row)
        .map(StoredEvent::from)
        .map_err(|e| EventStoreError::InvalidAppend(format!("failed to decode event row: {e}")))
}

/// Run a store future from the synchronous `EventStore` seam.
///
/// Must be called on a multi-threaded tokio runtime.
fn run_blocking<F, T>(fut: F) -> Result<T, EventStoreError>
where
    F: std::future::Future<Output = Result<T, EventStoreError>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        EventStoreError::InvalidAppend("PostgresEventStore requires a tokio runtime".to_string())
    })?;
    tokio::task::block_in_place(|| handle.block_on(fut))
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        run_blocking(self.append_async(events, expected_version))
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        run_blocking(self.load_stream_async(tenant_id, aggregate_id))
    }
}

#[async_trait::async_trait]
impl EventQuery for PostgresEventStore {
    async fn query_events(
        &self,
        tenant_id: TenantId,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        let agg_id: Option<uuid::Uuid> = filter.aggregate_id.map(|id| *id.as_uuid());
        let agg_type: Option<&str> = filter.aggregate_type.as_deref();
        let evt_type: Option<&str> = filter.event_type.as_deref();

        const WHERE: &str = "WHERE tenant_id = $1 \
            AND ($2::uuid IS NULL OR aggregate_id = $2) \
            AND ($3::text IS NULL OR aggregate_type = $3) \
            AND ($4::text IS NULL OR event_type = $4) \
            AND ($5::timestamptz IS NULL OR occurred_at >= $5) \
            AND ($6::timestamptz IS NULL OR occurred_at <= $6)";

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM events {WHERE}"))
            .bind(tenant_id.as_uuid())
            .bind(agg_id)
            .bind(agg_type)
            .bind(evt_type)
            .bind(filter.occurred_after)
            .bind(filter.occurred_before)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_events", e))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read count: {e}")))?;

        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events {WHERE} \
             ORDER BY occurred_at DESC, sequence_number ASC LIMIT $7 OFFSET $8"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(agg_id)
            .bind(agg_type)
            .bind(evt_type)
            .bind(filter.occurred_after)
            .bind(filter.occurred_before)
            .bind(i64::from(pagination.limit))
            .bind(i64::from(pagination.offset))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_events", e))?;

        let events = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
        Ok(EventQueryResult {
            events,
            total: total as u64,
            pagination,
            has_more: total > i64::from(pagination.offset) + i64::from(pagination.limit),
        })
    }

    async fn get_aggregate_events(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        pagination: Option<Pagination>,
    ) -> Result<EventQueryResult, EventStoreError> {
        let stream = self.load_stream_async(tenant_id, aggregate_id).await?;
        Ok(EventQueryResult::page(stream, pagination.unwrap_or_default()))
    }

    async fn get_event_by_id(
        &self,
        tenant_id: TenantId,
        event_id: uuid::Uuid,
    ) -> Result<Option<StoredEvent>, EventStoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE tenant_id = $1 AND event_id = $2 LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(event_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_event_by_id", e))?;

        row.as_ref().map(decode_row).transpose()
    }
}
