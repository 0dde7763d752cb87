//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimized read
//! models. All projections are:
//! - **Rebuildable**: cleared per tenant and replayed from the event store
//! - **Tenant-isolated**: data is partitioned by tenant
//! - **Idempotent**: a per-stream cursor skips envelopes already applied

pub mod account_balances;
pub mod audit_log;
pub mod cursor;
pub mod documents;
pub mod read_models;
pub mod stock_levels;

use thiserror::Error;

pub use account_balances::{AccountBalance, AccountBalancesProjection};
pub use audit_log::{AuditEntry, AuditFilter, AuditLog, AuditPage, FieldChange};
pub use cursor::StreamCursors;
pub use documents::{DocumentChange, DocumentView, DocumentsProjection};
pub use read_models::ReadModels;
pub use stock_levels::{StockLevel, StockLevelsProjection};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}
