use serde::Serialize;
use serde_json::Value as JsonValue;

use ledgerdesk_accounting::{AccountKind, LedgerEvent};
use ledgerdesk_core::TenantId;
use ledgerdesk_events::EventEnvelope;

use super::ProjectionError;
use super::cursor::StreamCursors;
use crate::lifecycle::streams::LEDGER;
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// Read model: per-account balance for a tenant.
///
/// `balance` is signed, debit-positive. `normal_balance` flips the sign for
/// credit-normal accounts so revenue and liabilities read positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub account_code: String,
    pub account_name: String,
    pub kind: AccountKind,
    pub debits: i64,
    pub credits: i64,
    pub balance: i64,
}

impl AccountBalance {
    pub fn normal_balance(&self) -> i64 {
        if self.kind.is_debit_normal() {
            self.balance
        } else {
            -self.balance
        }
    }
}

/// Projection: ledger lines → account balances.
///
/// Reversals carry their swapped lines, so an edited document nets out to
/// its latest posting without special handling here.
#[derive(Debug)]
pub struct AccountBalancesProjection<S = InMemoryTenantStore<String, AccountBalance>>
where
    S: TenantStore<String, AccountBalance>,
{
    store: S,
    cursors: StreamCursors,
}

impl AccountBalancesProjection {
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> AccountBalancesProjection<S>
where
    S: TenantStore<String, AccountBalance>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, code: &str) -> Option<AccountBalance> {
        self.store.get(tenant_id, &code.to_string())
    }

    /// Balances sorted by account code.
    pub fn list(&self, tenant_id: TenantId) -> Vec<AccountBalance> {
        let mut all = self.store.list(tenant_id);
        all.sort_by(|a, b| a.account_code.cmp(&b.account_code));
        all
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != LEDGER {
            return Ok(());
        }
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if !self.cursors.should_apply(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: LedgerEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
        if ev.tenant_id() != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        for line in ev.lines() {
            let code = line.account.code.clone();
            let mut row = self.store.get(tenant_id, &code).unwrap_or(AccountBalance {
                account_code: code.clone(),
                account_name: line.account.name.clone(),
                kind: line.account.kind,
                debits: 0,
                credits: 0,
                balance: 0,
            });
            if line.is_debit {
                row.debits += line.amount;
                row.balance += line.amount;
            } else {
                row.credits += line.amount;
                row.balance -= line.amount;
            }
            self.store.upsert(tenant_id, code, row);
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledgerdesk_accounting::{
        Account, AccountSubType, JournalEntryLine, JournalEntryPosted, LedgerId,
    };
    use ledgerdesk_core::UserId;
    use uuid::Uuid;

    fn envelope(tenant_id: TenantId, seq: u64, ev: &LedgerEvent) -> EventEnvelope<JsonValue> {
        let ledger = LedgerId::for_tenant(tenant_id);
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            ledger.0,
            LEDGER.to_string(),
            seq,
            "accounting.ledger.journal_entry_posted".to_string(),
            Utc::now(),
            serde_json::to_value(ev).unwrap(),
        )
        .with_actor(Some(UserId::new()))
    }

    fn posted(tenant_id: TenantId, amount: i64) -> LedgerEvent {
        let cash = Account::new("1000", "Cash", AccountKind::Asset, Some(AccountSubType::Cash));
        let sales = Account::new(
            "4000",
            "Sales Revenue",
            AccountKind::Revenue,
            Some(AccountSubType::SalesRevenue),
        );
        LedgerEvent::JournalEntryPosted(JournalEntryPosted {
            tenant_id,
            ledger_id: LedgerId::for_tenant(tenant_id),
            entry_id: Uuid::now_v7(),
            lines: vec![
                JournalEntryLine::debit(cash, amount),
                JournalEntryLine::credit(sales, amount),
            ],
            source: None,
            description: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn balances_accumulate_and_redelivery_is_ignored() {
        let projection = AccountBalancesProjection::in_memory();
        let tenant = TenantId::new();

        let first = envelope(tenant, 1, &posted(tenant, 500));
        projection.apply_envelope(&first).unwrap();
        projection.apply_envelope(&first).unwrap();
        projection
            .apply_envelope(&envelope(tenant, 2, &posted(tenant, 250)))
            .unwrap();

        let cash = projection.get(tenant, "1000").unwrap();
        assert_eq!(cash.balance, 750);
        let sales = projection.get(tenant, "4000").unwrap();
        assert_eq!(sales.normal_balance(), 750);
        assert_eq!(sales.credits, 750);

        assert!(projection.list(TenantId::new()).is_empty());
    }

    #[test]
    fn tenant_mismatch_is_rejected() {
        let projection = AccountBalancesProjection::in_memory();
        let tenant = TenantId::new();
        let foreign = posted(TenantId::new(), 100);
        let err = projection
            .apply_envelope(&envelope(tenant, 1, &foreign))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::TenantIsolation(_)));
    }
}
