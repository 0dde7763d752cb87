//! Per-stream checkpoints.
//!
//! Tracks the last applied `sequence_number` per (tenant, aggregate) stream so
//! redelivered envelopes are ignored and gaps are reported.

use std::collections::HashMap;
use std::sync::RwLock;

use ledgerdesk_core::{AggregateId, TenantId};

use super::ProjectionError;

#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<(TenantId, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.inner.read() {
            Ok(map) => map.get(&(tenant_id, aggregate_id)).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Whether `seq` is the next envelope to apply.
    ///
    /// `Ok(false)` means it was already applied. A first envelope seen for a
    /// stream may start past 1 (the subscriber joined late).
    pub fn should_apply(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> Result<bool, ProjectionError> {
        let last = self.get(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(false);
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(true)
    }

    pub fn advance(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((tenant_id, aggregate_id), seq);
        }
    }

    /// Number of streams with a checkpoint.
    pub fn len(&self) -> usize {
        self.inner.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(t, _), _| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_are_skipped_and_gaps_reported() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        assert_eq!(cursors.should_apply(t, a, 1), Ok(true));
        cursors.advance(t, a, 1);
        assert_eq!(cursors.should_apply(t, a, 1), Ok(false));
        assert_eq!(cursors.should_apply(t, a, 2), Ok(true));
        assert_eq!(
            cursors.should_apply(t, a, 4),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 4 })
        );
    }
}
