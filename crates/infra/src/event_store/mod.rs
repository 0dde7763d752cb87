//! Append-only event store boundary.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use query::{EventFilter, EventQuery, EventQueryResult, Pagination};
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
