//! Service wiring: event store, bus, lifecycle coordinator and the read
//! models fed by the projection worker.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;
use thiserror::Error;

use ledgerdesk_core::TenantId;
use ledgerdesk_events::{EventEnvelope, InMemoryEventBus};
use ledgerdesk_infra::event_store::{EventFilter, EventQuery, Pagination};
use ledgerdesk_infra::{
    EventStore, EventStoreError, InMemoryEventStore, Lifecycle, LifecycleResult, ProjectionWorker,
    ReadModels, WorkerHandle,
};

use crate::app::errors::ApiError;
use crate::config::StoreConfig;

pub type AppBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type AppLifecycle = Lifecycle<Arc<dyn EventStore>, AppBus>;

const REPLAY_PAGE: u32 = 1000;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to start projection worker: {0}")]
    Worker(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("persistent stores need the `postgres` feature")]
    PersistenceUnavailable,
}

pub struct AppServices {
    lifecycle: Arc<AppLifecycle>,
    events: Arc<dyn EventQuery>,
    pub read: ReadModels,
    /// Persistent stores outlive the process; their tenants are replayed
    /// into the read models on first use.
    replay_on_first_use: bool,
    warmed: Mutex<HashSet<TenantId>>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl AppServices {
    pub async fn build(store: &StoreConfig) -> Result<Self, StartupError> {
        match store {
            StoreConfig::InMemory => Self::in_memory(),
            #[cfg(feature = "postgres")]
            StoreConfig::Postgres { database_url } => {
                let store =
                    Arc::new(ledgerdesk_infra::event_store::PostgresEventStore::connect(database_url).await?);
                tracing::info!("using postgres event store");
                Self::assemble(store.clone(), store, true)
            }
            #[cfg(not(feature = "postgres"))]
            StoreConfig::Postgres { .. } => Err(StartupError::PersistenceUnavailable),
        }
    }

    pub fn in_memory() -> Result<Self, StartupError> {
        let store = Arc::new(InMemoryEventStore::new());
        Self::assemble(store.clone(), store, false)
    }

    fn assemble(
        store: Arc<dyn EventStore>,
        events: Arc<dyn EventQuery>,
        replay_on_first_use: bool,
    ) -> Result<Self, StartupError> {
        let bus: AppBus = Arc::new(InMemoryEventBus::new());
        let read = ReadModels::in_memory();

        let sink = read.clone();
        let worker = ProjectionWorker::spawn("read-models", bus.clone(), None, move |env| {
            sink.apply_envelope(&env)
        })?;

        Ok(Self {
            lifecycle: Arc::new(Lifecycle::new(store, bus)),
            events,
            read,
            replay_on_first_use,
            warmed: Mutex::new(HashSet::new()),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Run a coordinator call on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&AppLifecycle) -> LifecycleResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let lifecycle = self.lifecycle.clone();
        let joined = tokio::task::spawn_blocking(move || f(&lifecycle))
            .await
            .map_err(|e| ApiError::Internal(format!("worker task failed: {e}")))?;
        joined.map_err(ApiError::from)
    }

    /// Make sure the tenant's read models reflect the stored history.
    pub async fn warm_tenant(&self, tenant_id: TenantId) -> Result<(), ApiError> {
        if !self.replay_on_first_use {
            return Ok(());
        }
        {
            let warmed = self
                .warmed
                .lock()
                .map_err(|_| ApiError::Internal("warm-up registry poisoned".into()))?;
            if warmed.contains(&tenant_id) {
                return Ok(());
            }
        }

        let mut history = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .events
                .query_events(
                    tenant_id,
                    EventFilter::default(),
                    Pagination::new(Some(REPLAY_PAGE), Some(offset)),
                )
                .await
                .map_err(|e| ApiError::Dispatch(e.into()))?;
            let has_more = page.has_more;
            history.extend(page.events.iter().map(|e| e.to_envelope()));
            if !has_more {
                break;
            }
            offset += REPLAY_PAGE;
        }

        let replayed = history.len();
        let skipped = self.read.rebuild_tenant(tenant_id, history);
        tracing::info!(tenant_id = %tenant_id, replayed, skipped, "read models warmed");

        if let Ok(mut warmed) = self.warmed.lock() {
            warmed.insert(tenant_id);
        }
        Ok(())
    }

    /// Stop the projection worker. Later calls are no-ops.
    pub fn shutdown(&self) {
        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = handle {
            handle.shutdown();
        }
    }
}
