//! Document lifecycle coordinators.
//!
//! Each operation drives several aggregates in order: the primary document
//! first, then its siblings (sales order, purchase order, credit note), then
//! the ledger and stock through the posting record. Aggregates only decide
//! about themselves; cross-document rules (stock availability, quantities
//! billed against an order, refund splitting) are checked here before the
//! primary command is dispatched.
//!
//! ```text
//! validate refs → preview on a clone → stock check → dispatch primary
//!   → sync siblings (best effort, reported as warnings)
//!   → reverse active posting → post new plan → record posting
//! ```
//!
//! Failures after the primary document is committed surface as
//! `LifecycleError::Incomplete`; every later step is idempotent, so the same
//! operation can be retried.

mod bills;
mod catalog;
mod context;
mod credits;
mod error;
mod inputs;
mod invoices;
mod master_data;
mod orders;
mod posting;
mod purchase_returns;
mod sales_returns;
pub mod streams;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use ledgerdesk_core::{AggregateId, AggregateRoot, DomainError, TenantId};
use ledgerdesk_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

pub use context::CommandContext;
pub use credits::{ApplyCreditInput, CreditTarget};
pub use error::{LifecycleError, LifecycleResult};
pub use inputs::{
    BillChanges, BillLineInput, ConvertOrderInput, InvoiceChanges, LineInput, NewBill, NewInvoice,
    NewProduct, NewPurchaseOrder, NewPurchaseReturn, NewSalesOrder, NewSalesReturn, PaymentInput,
    ReturnLineInput, StockAdjustment,
};
pub use streams::Stream;

/// Result of a coordinated operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub id: AggregateId,
    /// Status of the primary document afterwards.
    pub status: String,
    /// Events committed across every stream touched.
    pub committed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_note_id: Option<AggregateId>,
    /// Sibling updates that failed without failing the operation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Outcome {
    pub(crate) fn new(id: AggregateId) -> Self {
        Self {
            id,
            status: String::new(),
            committed: 0,
            credit_note_id: None,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn with_status(mut self, status: impl Serialize) -> Self {
        self.status = status_str(&status);
        self
    }

    /// Count a sibling step, or downgrade its failure to a warning.
    pub(crate) fn best_effort(&mut self, step: &str, result: LifecycleResult<usize>) {
        match result {
            Ok(n) => self.committed += n,
            Err(err) => {
                warn!(document = %self.id, step, error = %err, "sibling update failed");
                self.warnings.push(format!("{step}: {err}"));
            }
        }
    }
}

/// Serialized name of a unit enum variant, e.g. `partially_paid`.
pub(crate) fn status_str(status: &impl Serialize) -> String {
    match serde_json::to_value(status) {
        Ok(JsonValue::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => String::new(),
    }
}

/// Coordinates document operations over one store and bus.
#[derive(Debug)]
pub struct Lifecycle<S, B> {
    dispatcher: CommandDispatcher<S, B>,
}

impl<S, B> Lifecycle<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }
}

impl<S, B> Lifecycle<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate; a missing stream yields the empty instance.
    pub fn load<A: Stream>(&self, tenant_id: TenantId, id: AggregateId) -> LifecycleResult<A> {
        Ok(self
            .dispatcher
            .load(tenant_id, id, |_, id| A::empty_for(id))?)
    }

    /// Rehydrate an aggregate that must already exist.
    pub fn load_existing<A: Stream>(
        &self,
        tenant_id: TenantId,
        id: AggregateId,
        what: &str,
    ) -> LifecycleResult<A> {
        let aggregate = self.load::<A>(tenant_id, id)?;
        if aggregate.version() == 0 {
            return Err(DomainError::not_found(format!("{what} {id}")).into());
        }
        Ok(aggregate)
    }

    /// Dispatch one command as the context's actor. Returns the number of
    /// events committed (0 for a no-op).
    pub fn dispatch<A: Stream>(
        &self,
        ctx: &CommandContext,
        id: AggregateId,
        command: A::Command,
    ) -> LifecycleResult<usize> {
        let committed = self.dispatcher.dispatch_as::<A>(
            ctx.user_id,
            ctx.tenant_id,
            id,
            A::AGGREGATE_TYPE,
            command,
            |_, id| A::empty_for(id),
        )?;
        Ok(committed.len())
    }

    /// Dispatch, then return the aggregate as committed.
    pub(crate) fn dispatch_loaded<A: Stream>(
        &self,
        ctx: &CommandContext,
        id: AggregateId,
        command: A::Command,
    ) -> LifecycleResult<(A, usize)> {
        let committed = self.dispatch::<A>(ctx, id, command)?;
        Ok((self.load::<A>(ctx.tenant_id, id)?, committed))
    }
}

pub(crate) fn unauthorized() -> LifecycleError {
    LifecycleError::Dispatch(DispatchError::Unauthorized)
}

/// A field every created document carries.
pub(crate) fn required<T>(value: Option<T>, what: &str) -> LifecycleResult<T> {
    value.ok_or_else(|| DomainError::invariant(format!("document has no {what}")).into())
}
