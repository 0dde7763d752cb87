use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::warn;

use ledgerdesk_core::TenantId;
use ledgerdesk_events::EventEnvelope;

use super::ProjectionError;
use super::account_balances::AccountBalancesProjection;
use super::audit_log::AuditLog;
use super::documents::DocumentsProjection;
use super::stock_levels::StockLevelsProjection;

/// Every read model the API serves, fed from one subscription.
#[derive(Clone)]
pub struct ReadModels {
    pub documents: Arc<DocumentsProjection>,
    pub balances: Arc<AccountBalancesProjection>,
    pub stock: Arc<StockLevelsProjection>,
    pub audit: Arc<AuditLog>,
}

impl Default for ReadModels {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ReadModels {
    pub fn in_memory() -> Self {
        Self {
            documents: Arc::new(DocumentsProjection::in_memory()),
            balances: Arc::new(AccountBalancesProjection::in_memory()),
            stock: Arc::new(StockLevelsProjection::in_memory()),
            audit: Arc::new(AuditLog::new()),
        }
    }

    /// Route one envelope to every projection. The audit entry is recorded
    /// even when a projection rejects the envelope.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let change = self.documents.apply_envelope(envelope);
        self.audit
            .record(envelope, change.as_ref().ok().and_then(|c| c.as_ref()));
        change?;
        self.balances.apply_envelope(envelope)?;
        self.stock.apply_envelope(envelope)?;
        Ok(())
    }

    /// Clear a tenant and replay its history in order. Returns how many
    /// envelopes were skipped.
    pub fn rebuild_tenant(
        &self,
        tenant_id: TenantId,
        history: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> usize {
        self.documents.clear_tenant(tenant_id);
        self.balances.clear_tenant(tenant_id);
        self.stock.clear_tenant(tenant_id);
        self.audit.clear_tenant(tenant_id);

        let mut envelopes: Vec<_> = history
            .into_iter()
            .filter(|e| e.tenant_id() == tenant_id)
            .collect();
        envelopes.sort_by_key(|e| (e.occurred_at(), e.sequence_number()));
        let mut skipped = 0;
        for env in &envelopes {
            if let Err(err) = self.apply_envelope(env) {
                skipped += 1;
                warn!(
                    tenant_id = %tenant_id,
                    event_id = %env.event_id(),
                    error = %err,
                    "skipping envelope during rebuild"
                );
            }
        }
        skipped
    }
}
