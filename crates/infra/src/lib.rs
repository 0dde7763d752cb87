//! Infrastructure layer: event storage, command dispatch, document lifecycle
//! coordination, projections and their background worker.

pub mod command_dispatcher;
pub mod event_store;
pub mod lifecycle;
pub mod projections;
pub mod read_model;
pub mod workers;


pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};
pub use lifecycle::{CommandContext, Lifecycle, LifecycleError, LifecycleResult, Outcome};
pub use projections::ReadModels;
pub use workers::{ProjectionWorker, WorkerHandle};
