use thiserror::Error;

use ledgerdesk_core::{AggregateId, DomainError};

use crate::command_dispatcher::DispatchError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The document change is committed; a follow-up step (ledger, stock,
    /// credit note) failed and can be retried.
    #[error("{document} was saved but {step} failed: {source}")]
    Incomplete {
        document: AggregateId,
        step: &'static str,
        #[source]
        source: DispatchError,
    },
}

impl From<DomainError> for LifecycleError {
    fn from(value: DomainError) -> Self {
        LifecycleError::Dispatch(value.into())
    }
}

impl LifecycleError {
    /// The underlying dispatch failure, used for status mapping.
    pub fn dispatch_error(&self) -> &DispatchError {
        match self {
            LifecycleError::Dispatch(e) => e,
            LifecycleError::Incomplete { source, .. } => source,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, LifecycleError::Incomplete { .. })
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Tag errors raised after the primary document was committed.
pub(crate) trait AfterCommit<T> {
    fn after_commit(self, document: AggregateId, step: &'static str) -> LifecycleResult<T>;
}

impl<T> AfterCommit<T> for LifecycleResult<T> {
    fn after_commit(self, document: AggregateId, step: &'static str) -> LifecycleResult<T> {
        self.map_err(|err| match err {
            LifecycleError::Dispatch(source) => LifecycleError::Incomplete {
                document,
                step,
                source,
            },
            incomplete => incomplete,
        })
    }
}
