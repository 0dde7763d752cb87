use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ledgerdesk_events::Event;

use crate::chart::Account;

/// One side of a journal entry (immutable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub account: Account,
    /// Positive amount in minor units.
    pub amount: i64,
    /// true = debit, false = credit.
    pub is_debit: bool,
    #[serde(default)]
    pub memo: Option<String>,
}

impl JournalEntryLine {
    pub fn debit(account: Account, amount: i64) -> Self {
        Self {
            account,
            amount,
            is_debit: true,
            memo: None,
        }
    }

    pub fn credit(account: Account, amount: i64) -> Self {
        Self {
            account,
            amount,
            is_debit: false,
            memo: None,
        }
    }

    /// Same account and amount on the opposite side.
    pub fn swapped(&self) -> Self {
        Self {
            account: self.account.clone(),
            amount: self.amount,
            is_debit: !self.is_debit,
            memo: self.memo.as_ref().map(|m| format!("reversal: {m}")),
        }
    }
}

/// Kind of business document a journal entry or stock movement came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Bill,
    SalesReturn,
    PurchaseReturn,
    InvoicePayment,
    BillPayment,
    CreditNote,
    Manual,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Bill => "bill",
            DocumentKind::SalesReturn => "sales_return",
            DocumentKind::PurchaseReturn => "purchase_return",
            DocumentKind::InvoicePayment => "invoice_payment",
            DocumentKind::BillPayment => "bill_payment",
            DocumentKind::CreditNote => "credit_note",
            DocumentKind::Manual => "manual",
        }
    }
}

/// Reference from a posting back to the document that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceDocument {
    pub kind: DocumentKind,
    pub id: AggregateId,
}

impl SourceDocument {
    pub fn new(kind: DocumentKind, id: AggregateId) -> Self {
        Self { kind, id }
    }
}

/// Ledger identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub AggregateId);

impl LedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// The tenant's general ledger.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self(AggregateId::derived(tenant_id, "accounting.ledger", "general"))
    }
}

impl core::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What the ledger remembers about a posted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedEntry {
    pub lines: Vec<JournalEntryLine>,
    pub source: Option<SourceDocument>,
    /// Set when this entry is itself a reversal.
    pub reverses: Option<Uuid>,
    pub reversed_by: Option<Uuid>,
}

/// Aggregate root: Ledger (double-entry journal).
///
/// Holds entry lines so reversals can be derived; balances come from the
/// account-balances projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    tenant_id: Option<TenantId>,
    entries: HashMap<Uuid, PostedEntry>,
    version: u64,
    created: bool,
}

impl Ledger {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            tenant_id: None,
            entries: HashMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn entry(&self, entry_id: Uuid) -> Option<&PostedEntry> {
        self.entries.get(&entry_id)
    }

    pub fn is_reversed(&self, entry_id: Uuid) -> bool {
        self.entries
            .get(&entry_id)
            .is_some_and(|e| e.reversed_by.is_some())
    }
}

impl AggregateRoot for Ledger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PostJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournalEntry {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry_id: Uuid,
    pub lines: Vec<JournalEntryLine>,
    pub source: Option<SourceDocument>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReverseJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseJournalEntry {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry_id: Uuid,
    pub reversal_entry_id: Uuid,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    PostJournalEntry(PostJournalEntry),
    ReverseJournalEntry(ReverseJournalEntry),
}

/// Event: JournalEntryPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryPosted {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry_id: Uuid,
    pub lines: Vec<JournalEntryLine>,
    #[serde(default)]
    pub source: Option<SourceDocument>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: JournalEntryReversed. `lines` are the original lines with sides swapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryReversed {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub original_entry_id: Uuid,
    pub reversal_entry_id: Uuid,
    pub lines: Vec<JournalEntryLine>,
    pub source: Option<SourceDocument>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    JournalEntryPosted(JournalEntryPosted),
    JournalEntryReversed(JournalEntryReversed),
}

impl LedgerEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            LedgerEvent::JournalEntryPosted(e) => e.tenant_id,
            LedgerEvent::JournalEntryReversed(e) => e.tenant_id,
        }
    }

    /// Lines whose effect lands on account balances.
    pub fn lines(&self) -> &[JournalEntryLine] {
        match self {
            LedgerEvent::JournalEntryPosted(e) => &e.lines,
            LedgerEvent::JournalEntryReversed(e) => &e.lines,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::JournalEntryPosted(_) => "accounting.ledger.journal_entry_posted",
            LedgerEvent::JournalEntryReversed(_) => "accounting.ledger.journal_entry_reversed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::JournalEntryPosted(e) => e.occurred_at,
            LedgerEvent::JournalEntryReversed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ledger {
    type Command = JournalCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        if !self.created {
            self.tenant_id = Some(event.tenant_id());
            self.created = true;
        }

        match event {
            LedgerEvent::JournalEntryPosted(e) => {
                self.id = e.ledger_id;
                self.entries.insert(
                    e.entry_id,
                    PostedEntry {
                        lines: e.lines.clone(),
                        source: e.source,
                        reverses: None,
                        reversed_by: None,
                    },
                );
            }
            LedgerEvent::JournalEntryReversed(e) => {
                if let Some(original) = self.entries.get_mut(&e.original_entry_id) {
                    original.reversed_by = Some(e.reversal_entry_id);
                }
                self.entries.insert(
                    e.reversal_entry_id,
                    PostedEntry {
                        lines: e.lines.clone(),
                        source: e.source,
                        reverses: Some(e.original_entry_id),
                        reversed_by: None,
                    },
                );
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::PostJournalEntry(cmd) => self.handle_post(cmd),
            JournalCommand::ReverseJournalEntry(cmd) => self.handle_reverse(cmd),
        }
    }
}

/// Check a set of lines forms a valid double entry.
pub fn validate_balanced(lines: &[JournalEntryLine]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation("journal entry must have lines"));
    }

    let mut debit_total: i128 = 0;
    let mut credit_total: i128 = 0;

    for line in lines {
        if line.amount <= 0 {
            return Err(DomainError::validation("amount must be positive"));
        }
        if line.is_debit {
            debit_total += line.amount as i128;
        } else {
            credit_total += line.amount as i128;
        }
    }

    if debit_total != credit_total {
        return Err(DomainError::invariant(format!(
            "debits must equal credits (debits {debit_total}, credits {credit_total})"
        )));
    }
    Ok(())
}

impl Ledger {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_post(&self, cmd: &PostJournalEntry) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;

        if self.entries.contains_key(&cmd.entry_id) {
            return Err(DomainError::conflict(format!(
                "journal entry {} already posted",
                cmd.entry_id
            )));
        }
        validate_balanced(&cmd.lines)?;

        Ok(vec![LedgerEvent::JournalEntryPosted(JournalEntryPosted {
            tenant_id: cmd.tenant_id,
            ledger_id: cmd.ledger_id,
            entry_id: cmd.entry_id,
            lines: cmd.lines.clone(),
            source: cmd.source,
            description: cmd.description.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(&self, cmd: &ReverseJournalEntry) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;

        let original = self
            .entries
            .get(&cmd.entry_id)
            .ok_or_else(|| DomainError::not_found(format!("journal entry {}", cmd.entry_id)))?;

        if original.reverses.is_some() {
            return Err(DomainError::invariant("cannot reverse a reversal entry"));
        }
        if original.reversed_by.is_some() {
            return Err(DomainError::conflict(format!(
                "journal entry {} already reversed",
                cmd.entry_id
            )));
        }
        if self.entries.contains_key(&cmd.reversal_entry_id) {
            return Err(DomainError::conflict("reversal entry id already used"));
        }

        Ok(vec![LedgerEvent::JournalEntryReversed(JournalEntryReversed {
            tenant_id: cmd.tenant_id,
            ledger_id: cmd.ledger_id,
            original_entry_id: cmd.entry_id,
            reversal_entry_id: cmd.reversal_entry_id,
            lines: original.lines.iter().map(JournalEntryLine::swapped).collect(),
            source: original.source,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::AccountKind;
    use proptest::prelude::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_ledger_id() -> LedgerId {
        LedgerId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_account(code: &str, kind: AccountKind) -> Account {
        Account::new(code, code, kind, None)
    }

    fn balanced(amount: i64) -> Vec<JournalEntryLine> {
        vec![
            JournalEntryLine::debit(test_account("1100", AccountKind::Asset), amount),
            JournalEntryLine::credit(test_account("4000", AccountKind::Revenue), amount),
        ]
    }

    fn post(ledger: &mut Ledger, tenant_id: TenantId, lines: Vec<JournalEntryLine>) -> Uuid {
        let entry_id = Uuid::now_v7();
        let events = ledger
            .handle(&JournalCommand::PostJournalEntry(PostJournalEntry {
                tenant_id,
                ledger_id: ledger.id_typed(),
                entry_id,
                lines,
                source: Some(SourceDocument::new(DocumentKind::Invoice, AggregateId::new())),
                description: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        for e in &events {
            ledger.apply(e);
        }
        entry_id
    }

    fn reverse_cmd(ledger: &Ledger, tenant_id: TenantId, entry_id: Uuid) -> JournalCommand {
        JournalCommand::ReverseJournalEntry(ReverseJournalEntry {
            tenant_id,
            ledger_id: ledger.id_typed(),
            entry_id,
            reversal_entry_id: Uuid::now_v7(),
            reason: Some("document edited".to_string()),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn unbalanced_entry_is_rejected() {
        let ledger = Ledger::empty(test_ledger_id());
        let lines = vec![
            JournalEntryLine::debit(test_account("1000", AccountKind::Asset), 100),
            JournalEntryLine::credit(test_account("2000", AccountKind::Liability), 90),
        ];

        let err = ledger
            .handle(&JournalCommand::PostJournalEntry(PostJournalEntry {
                tenant_id: test_tenant_id(),
                ledger_id: test_ledger_id(),
                entry_id: Uuid::now_v7(),
                lines,
                source: None,
                description: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("debits must equal credits") => {}
            _ => panic!("Expected invariant violation for unbalanced entry"),
        }
    }

    #[test]
    fn reversal_swaps_sides_and_links_original() {
        let tenant_id = test_tenant_id();
        let mut ledger = Ledger::empty(test_ledger_id());
        let entry_id = post(&mut ledger, tenant_id, balanced(250));

        let events = ledger.handle(&reverse_cmd(&ledger, tenant_id, entry_id)).unwrap();
        let LedgerEvent::JournalEntryReversed(rev) = &events[0] else {
            panic!("Expected JournalEntryReversed");
        };
        assert_eq!(rev.original_entry_id, entry_id);
        assert!(!rev.lines[0].is_debit);
        assert!(rev.lines[1].is_debit);
        assert_eq!(rev.lines[0].amount, 250);

        ledger.apply(&events[0]);
        assert!(ledger.is_reversed(entry_id));
        assert_eq!(ledger.entry(rev.reversal_entry_id).unwrap().reverses, Some(entry_id));
    }

    #[test]
    fn entry_cannot_be_reversed_twice() {
        let tenant_id = test_tenant_id();
        let mut ledger = Ledger::empty(test_ledger_id());
        let entry_id = post(&mut ledger, tenant_id, balanced(10));

        let events = ledger.handle(&reverse_cmd(&ledger, tenant_id, entry_id)).unwrap();
        ledger.apply(&events[0]);
        let LedgerEvent::JournalEntryReversed(rev) = &events[0] else {
            panic!("Expected JournalEntryReversed");
        };

        let err = ledger.handle(&reverse_cmd(&ledger, tenant_id, entry_id)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let err = ledger
            .handle(&reverse_cmd(&ledger, tenant_id, rev.reversal_entry_id))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn reversing_unknown_entry_is_not_found() {
        let tenant_id = test_tenant_id();
        let mut ledger = Ledger::empty(test_ledger_id());
        post(&mut ledger, tenant_id, balanced(10));
        let err = ledger
            .handle(&reverse_cmd(&ledger, tenant_id, Uuid::now_v7()))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn other_tenant_cannot_post_to_ledger() {
        let mut ledger = Ledger::empty(test_ledger_id());
        post(&mut ledger, test_tenant_id(), balanced(10));
        let err = ledger
            .handle(&JournalCommand::PostJournalEntry(PostJournalEntry {
                tenant_id: test_tenant_id(),
                ledger_id: ledger.id_typed(),
                entry_id: Uuid::now_v7(),
                lines: balanced(5),
                source: None,
                description: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Posting then reversing any set of balanced entries nets every account to zero.
        #[test]
        fn post_then_reverse_nets_to_zero(
            amounts in prop::collection::vec(1i64..1_000_000i64, 1..10)
        ) {
            let tenant_id = test_tenant_id();
            let mut ledger = Ledger::empty(test_ledger_id());
            let mut all_events: Vec<LedgerEvent> = Vec::new();

            for amount in amounts {
                let entry_id = post(&mut ledger, tenant_id, balanced(amount));
                let events = ledger.handle(&reverse_cmd(&ledger, tenant_id, entry_id)).unwrap();
                for e in &events {
                    ledger.apply(e);
                }
                all_events.extend(events);
                all_events.push(LedgerEvent::JournalEntryPosted(JournalEntryPosted {
                    tenant_id,
                    ledger_id: ledger.id_typed(),
                    entry_id,
                    lines: balanced(amount),
                    source: None,
                    description: None,
                    occurred_at: test_time(),
                }));
            }

            let mut receivable: i128 = 0;
            for ev in &all_events {
                for line in ev.lines() {
                    if line.account.code == "1100" {
                        receivable += if line.is_debit { line.amount as i128 } else { -(line.amount as i128) };
                    }
                }
            }
            prop_assert_eq!(receivable, 0);
        }
    }
}
