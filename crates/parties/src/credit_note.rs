//! Credit notes: a party balance created from an excess return.
//!
//! A customer credit note is owed by the company to a customer; a supplier
//! credit note is owed by a supplier to the company. Either can be applied to
//! later documents of the same party until its remaining balance reaches zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerdesk_accounting::SourceDocument;
use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, Amount, DomainError, TenantId};
use ledgerdesk_events::Event;

use crate::party::PartyId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreditNoteId(pub AggregateId);

impl CreditNoteId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// The credit note created by a given source document (one per return).
    pub fn for_source(tenant_id: TenantId, source: SourceDocument) -> Self {
        let key = format!("{}/{}", source.kind.as_str(), source.id);
        Self(AggregateId::derived(tenant_id, "parties.credit_note", &key))
    }
}

impl core::fmt::Display for CreditNoteId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditNoteKind {
    /// Issued to a customer.
    Customer,
    /// Received from a supplier.
    Supplier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditNoteStatus {
    Open,
    Applied,
    Void,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditApplication {
    pub application_id: Uuid,
    pub target: SourceDocument,
    pub amount: Amount,
}

/// Aggregate root: CreditNote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditNote {
    id: CreditNoteId,
    tenant_id: Option<TenantId>,
    kind: CreditNoteKind,
    party_id: Option<PartyId>,
    source: Option<SourceDocument>,
    amount: Amount,
    applications: Vec<CreditApplication>,
    status: CreditNoteStatus,
    version: u64,
    created: bool,
}

impl CreditNote {
    pub fn empty(id: CreditNoteId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: CreditNoteKind::Customer,
            party_id: None,
            source: None,
            amount: 0,
            applications: Vec::new(),
            status: CreditNoteStatus::Open,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CreditNoteId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn kind(&self) -> CreditNoteKind {
        self.kind
    }

    pub fn party_id(&self) -> Option<PartyId> {
        self.party_id
    }

    pub fn source(&self) -> Option<SourceDocument> {
        self.source
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn applied(&self) -> Amount {
        self.applications.iter().map(|a| a.amount).sum()
    }

    pub fn remaining(&self) -> Amount {
        if self.status == CreditNoteStatus::Void {
            return 0;
        }
        self.amount - self.applied()
    }

    pub fn applications(&self) -> &[CreditApplication] {
        &self.applications
    }

    pub fn status(&self) -> CreditNoteStatus {
        self.status
    }
}

impl AggregateRoot for CreditNote {
    type Id = CreditNoteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCreditNote {
    pub tenant_id: TenantId,
    pub credit_note_id: CreditNoteId,
    pub kind: CreditNoteKind,
    pub party_id: PartyId,
    pub source: Option<SourceDocument>,
    pub amount: Amount,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyCreditNote {
    pub tenant_id: TenantId,
    pub credit_note_id: CreditNoteId,
    pub application_id: Uuid,
    pub target: SourceDocument,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidCreditNote {
    pub tenant_id: TenantId,
    pub credit_note_id: CreditNoteId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditNoteCommand {
    IssueCreditNote(IssueCreditNote),
    ApplyCreditNote(ApplyCreditNote),
    VoidCreditNote(VoidCreditNote),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteIssued {
    pub tenant_id: TenantId,
    pub credit_note_id: CreditNoteId,
    pub kind: CreditNoteKind,
    pub party_id: PartyId,
    pub source: Option<SourceDocument>,
    pub amount: Amount,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteApplied {
    pub tenant_id: TenantId,
    pub credit_note_id: CreditNoteId,
    pub application: CreditApplication,
    pub remaining_after: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteVoided {
    pub tenant_id: TenantId,
    pub credit_note_id: CreditNoteId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditNoteEvent {
    CreditNoteIssued(CreditNoteIssued),
    CreditNoteApplied(CreditNoteApplied),
    CreditNoteVoided(CreditNoteVoided),
}

impl Event for CreditNoteEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CreditNoteEvent::CreditNoteIssued(_) => "parties.credit_note.issued",
            CreditNoteEvent::CreditNoteApplied(_) => "parties.credit_note.applied",
            CreditNoteEvent::CreditNoteVoided(_) => "parties.credit_note.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CreditNoteEvent::CreditNoteIssued(e) => e.occurred_at,
            CreditNoteEvent::CreditNoteApplied(e) => e.occurred_at,
            CreditNoteEvent::CreditNoteVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CreditNote {
    type Command = CreditNoteCommand;
    type Event = CreditNoteEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CreditNoteEvent::CreditNoteIssued(e) => {
                self.id = e.credit_note_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.party_id = Some(e.party_id);
                self.source = e.source;
                self.amount = e.amount;
                self.status = CreditNoteStatus::Open;
                self.created = true;
            }
            CreditNoteEvent::CreditNoteApplied(e) => {
                self.applications.push(e.application.clone());
                if e.remaining_after == 0 {
                    self.status = CreditNoteStatus::Applied;
                }
            }
            CreditNoteEvent::CreditNoteVoided(_) => {
                self.status = CreditNoteStatus::Void;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CreditNoteCommand::IssueCreditNote(cmd) => self.handle_issue(cmd),
            CreditNoteCommand::ApplyCreditNote(cmd) => self.handle_apply(cmd),
            CreditNoteCommand::VoidCreditNote(cmd) => self.handle_void(cmd),
        }
    }
}

impl CreditNote {
    fn ensure_existing(&self, tenant_id: TenantId, id: CreditNoteId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("credit note"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != id {
            return Err(DomainError::invariant("credit_note_id mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueCreditNote) -> Result<Vec<CreditNoteEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("credit note already issued"));
        }
        if cmd.amount <= 0 {
            return Err(DomainError::validation("credit note amount must be positive"));
        }

        Ok(vec![CreditNoteEvent::CreditNoteIssued(CreditNoteIssued {
            tenant_id: cmd.tenant_id,
            credit_note_id: cmd.credit_note_id,
            kind: cmd.kind,
            party_id: cmd.party_id,
            source: cmd.source,
            amount: cmd.amount,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply(&self, cmd: &ApplyCreditNote) -> Result<Vec<CreditNoteEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.credit_note_id)?;
        if self.status != CreditNoteStatus::Open {
            return Err(DomainError::invariant("credit note has no remaining balance"));
        }
        if self
            .applications
            .iter()
            .any(|a| a.application_id == cmd.application_id)
        {
            return Err(DomainError::conflict("credit application already recorded"));
        }
        if cmd.amount <= 0 {
            return Err(DomainError::validation("applied amount must be positive"));
        }
        let remaining = self.remaining();
        if cmd.amount > remaining {
            return Err(DomainError::invariant(format!(
                "applied amount {} exceeds remaining credit {}",
                cmd.amount, remaining
            )));
        }

        Ok(vec![CreditNoteEvent::CreditNoteApplied(CreditNoteApplied {
            tenant_id: cmd.tenant_id,
            credit_note_id: cmd.credit_note_id,
            application: CreditApplication {
                application_id: cmd.application_id,
                target: cmd.target,
                amount: cmd.amount,
            },
            remaining_after: remaining - cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidCreditNote) -> Result<Vec<CreditNoteEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.credit_note_id)?;
        if self.status == CreditNoteStatus::Void {
            return Err(DomainError::conflict("credit note already void"));
        }
        if !self.applications.is_empty() {
            return Err(DomainError::invariant(
                "credit note has been applied and cannot be voided",
            ));
        }

        Ok(vec![CreditNoteEvent::CreditNoteVoided(CreditNoteVoided {
            tenant_id: cmd.tenant_id,
            credit_note_id: cmd.credit_note_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdesk_accounting::DocumentKind;
    use ledgerdesk_events::execute;

    fn issued(amount: Amount) -> (TenantId, CreditNote) {
        let tenant_id = TenantId::new();
        let source = SourceDocument::new(DocumentKind::SalesReturn, AggregateId::new());
        let id = CreditNoteId::for_source(tenant_id, source);
        let mut note = CreditNote::empty(id);
        execute(
            &mut note,
            &CreditNoteCommand::IssueCreditNote(IssueCreditNote {
                tenant_id,
                credit_note_id: id,
                kind: CreditNoteKind::Customer,
                party_id: PartyId::new(AggregateId::new()),
                source: Some(source),
                amount,
                reason: Some("excess return".into()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (tenant_id, note)
    }

    fn apply_cmd(tenant_id: TenantId, note: &CreditNote, amount: Amount) -> CreditNoteCommand {
        CreditNoteCommand::ApplyCreditNote(ApplyCreditNote {
            tenant_id,
            credit_note_id: note.id_typed(),
            application_id: Uuid::now_v7(),
            target: SourceDocument::new(DocumentKind::Invoice, AggregateId::new()),
            amount,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn applications_reduce_remaining_until_exhausted() {
        let (tenant_id, mut note) = issued(1_000);
        let cmd = apply_cmd(tenant_id, &note, 400);
        execute(&mut note, &cmd).unwrap();
        assert_eq!(note.remaining(), 600);
        assert_eq!(note.status(), CreditNoteStatus::Open);

        let cmd = apply_cmd(tenant_id, &note, 600);

        execute(&mut note, &cmd).unwrap();
        assert_eq!(note.remaining(), 0);
        assert_eq!(note.status(), CreditNoteStatus::Applied);

        let err = note.handle(&apply_cmd(tenant_id, &note, 1)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cannot_apply_more_than_remaining() {
        let (tenant_id, note) = issued(500);
        let err = note.handle(&apply_cmd(tenant_id, &note, 501)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(ref m) if m.contains("exceeds")));
    }

    #[test]
    fn source_derived_id_prevents_second_issue() {
        let (tenant_id, note) = issued(500);
        let err = note
            .handle(&CreditNoteCommand::IssueCreditNote(IssueCreditNote {
                tenant_id,
                credit_note_id: note.id_typed(),
                kind: CreditNoteKind::Customer,
                party_id: PartyId::new(AggregateId::new()),
                source: note.source(),
                amount: 10,
                reason: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn void_only_before_any_application() {
        let (tenant_id, mut note) = issued(500);
        let void = CreditNoteCommand::VoidCreditNote(VoidCreditNote {
            tenant_id,
            credit_note_id: note.id_typed(),
            reason: None,
            occurred_at: Utc::now(),
        });
        let mut untouched = note.clone();
        execute(&mut untouched, &void).unwrap();
        assert_eq!(untouched.remaining(), 0);
        assert_eq!(untouched.status(), CreditNoteStatus::Void);

        let cmd = apply_cmd(tenant_id, &note, 100);

        execute(&mut note, &cmd).unwrap();
        assert!(note.handle(&void).is_err());
    }

    #[test]
    fn issue_requires_positive_amount() {
        let tenant_id = TenantId::new();
        let note = CreditNote::empty(CreditNoteId::new(AggregateId::new()));
        let err = note
            .handle(&CreditNoteCommand::IssueCreditNote(IssueCreditNote {
                tenant_id,
                credit_note_id: note.id_typed(),
                kind: CreditNoteKind::Supplier,
                party_id: PartyId::new(AggregateId::new()),
                source: None,
                amount: 0,
                reason: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
