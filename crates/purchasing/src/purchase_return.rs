//! Goods sent back to a supplier against a bill.
//!
//! A return shipped from a warehouse other than the one the bill received
//! into waits in `PendingApproval` until someone holding
//! `purchase_returns.approve` approves or rejects it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, Amount, DomainError, TenantId, UserId};
use ledgerdesk_events::Event;
use ledgerdesk_inventory::WarehouseId;
use ledgerdesk_parties::{CreditNoteId, PartyId};
use ledgerdesk_posting::ReturnLineShare;

use crate::bill::BillId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseReturnId(pub AggregateId);

impl PurchaseReturnId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseReturnId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseReturnStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

/// Who decided a cross-warehouse return, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub decided_by: UserId,
    pub note: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Aggregate root: PurchaseReturn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReturn {
    id: PurchaseReturnId,
    tenant_id: Option<TenantId>,
    number: String,
    bill_id: Option<BillId>,
    supplier_id: Option<PartyId>,
    warehouse_id: Option<WarehouseId>,
    bill_warehouse_id: Option<WarehouseId>,
    return_date: Option<NaiveDate>,
    reason: Option<String>,
    status: PurchaseReturnStatus,
    lines: Vec<ReturnLineShare>,
    decision: Option<ApprovalDecision>,
    applied: Amount,
    excess: Amount,
    credit_note_id: Option<CreditNoteId>,
    version: u64,
    created: bool,
}

impl PurchaseReturn {
    pub fn empty(id: PurchaseReturnId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            bill_id: None,
            supplier_id: None,
            warehouse_id: None,
            bill_warehouse_id: None,
            return_date: None,
            reason: None,
            status: PurchaseReturnStatus::Draft,
            lines: Vec::new(),
            decision: None,
            applied: 0,
            excess: 0,
            credit_note_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseReturnId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn bill_id(&self) -> Option<BillId> {
        self.bill_id
    }

    pub fn supplier_id(&self) -> Option<PartyId> {
        self.supplier_id
    }

    /// Warehouse the goods leave from.
    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn return_date(&self) -> Option<NaiveDate> {
        self.return_date
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn status(&self) -> PurchaseReturnStatus {
        self.status
    }

    pub fn lines(&self) -> &[ReturnLineShare] {
        &self.lines
    }

    pub fn requires_approval(&self) -> bool {
        self.warehouse_id != self.bill_warehouse_id
    }

    pub fn decision(&self) -> Option<&ApprovalDecision> {
        self.decision.as_ref()
    }

    pub fn refund_total(&self) -> Amount {
        self.lines.iter().map(ReturnLineShare::refund).sum()
    }

    pub fn applied(&self) -> Amount {
        self.applied
    }

    pub fn excess(&self) -> Amount {
        self.excess
    }

    pub fn credit_note_id(&self) -> Option<CreditNoteId> {
        self.credit_note_id
    }

    pub fn can_complete(&self) -> bool {
        matches!(
            self.status,
            PurchaseReturnStatus::Draft | PurchaseReturnStatus::Approved
        )
    }
}

impl AggregateRoot for PurchaseReturn {
    type Id = PurchaseReturnId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseReturn {
    pub tenant_id: TenantId,
    pub return_id: PurchaseReturnId,
    pub number: String,
    pub bill_id: BillId,
    pub supplier_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub bill_warehouse_id: WarehouseId,
    pub return_date: NaiveDate,
    pub reason: Option<String>,
    pub lines: Vec<ReturnLineShare>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovePurchaseReturn {
    pub tenant_id: TenantId,
    pub return_id: PurchaseReturnId,
    pub approved_by: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectPurchaseReturn {
    pub tenant_id: TenantId,
    pub return_id: PurchaseReturnId,
    pub rejected_by: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletePurchaseReturn {
    pub tenant_id: TenantId,
    pub return_id: PurchaseReturnId,
    /// The draft's lines priced against the document as it stands now.
    pub lines: Vec<ReturnLineShare>,
    pub applied: Amount,
    pub excess: Amount,
    pub credit_note_id: Option<CreditNoteId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPurchaseReturn {
    pub tenant_id: TenantId,
    pub return_id: PurchaseReturnId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseReturnCommand {
    CreatePurchaseReturn(CreatePurchaseReturn),
    ApprovePurchaseReturn(ApprovePurchaseReturn),
    RejectPurchaseReturn(RejectPurchaseReturn),
    CompletePurchaseReturn(CompletePurchaseReturn),
    CancelPurchaseReturn(CancelPurchaseReturn),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReturnCreated {
    pub tenant_id: TenantId,
    pub return_id: PurchaseReturnId,
    pub number: String,
    pub bill_id: BillId,
    pub supplier_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub bill_warehouse_id: WarehouseId,
    pub return_date: NaiveDate,
    pub reason: Option<String>,
    pub lines: Vec<ReturnLineShare>,
    pub requires_approval: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReturnApproved {
    pub tenant_id: TenantId,
    pub return_id: PurchaseReturnId,
    pub approved_by: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReturnRejected {
    pub tenant_id: TenantId,
    pub return_id: PurchaseReturnId,
    pub rejected_by: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReturnCompleted {
    pub tenant_id: TenantId,
    pub return_id: PurchaseReturnId,
    #[serde(default)]
    pub lines: Vec<ReturnLineShare>,
    pub refund_total: Amount,
    pub applied: Amount,
    pub excess: Amount,
    pub credit_note_id: Option<CreditNoteId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReturnCancelled {
    pub tenant_id: TenantId,
    pub return_id: PurchaseReturnId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseReturnEvent {
    PurchaseReturnCreated(PurchaseReturnCreated),
    PurchaseReturnApproved(PurchaseReturnApproved),
    PurchaseReturnRejected(PurchaseReturnRejected),
    PurchaseReturnCompleted(PurchaseReturnCompleted),
    PurchaseReturnCancelled(PurchaseReturnCancelled),
}

impl Event for PurchaseReturnEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseReturnEvent::PurchaseReturnCreated(_) => "purchasing.purchase_return.created",
            PurchaseReturnEvent::PurchaseReturnApproved(_) => "purchasing.purchase_return.approved",
            PurchaseReturnEvent::PurchaseReturnRejected(_) => "purchasing.purchase_return.rejected",
            PurchaseReturnEvent::PurchaseReturnCompleted(_) => {
                "purchasing.purchase_return.completed"
            }
            PurchaseReturnEvent::PurchaseReturnCancelled(_) => {
                "purchasing.purchase_return.cancelled"
            }
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseReturnEvent::PurchaseReturnCreated(e) => e.occurred_at,
            PurchaseReturnEvent::PurchaseReturnApproved(e) => e.occurred_at,
            PurchaseReturnEvent::PurchaseReturnRejected(e) => e.occurred_at,
            PurchaseReturnEvent::PurchaseReturnCompleted(e) => e.occurred_at,
            PurchaseReturnEvent::PurchaseReturnCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseReturn {
    type Command = PurchaseReturnCommand;
    type Event = PurchaseReturnEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseReturnEvent::PurchaseReturnCreated(e) => {
                self.id = e.return_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.bill_id = Some(e.bill_id);
                self.supplier_id = Some(e.supplier_id);
                self.warehouse_id = Some(e.warehouse_id);
                self.bill_warehouse_id = Some(e.bill_warehouse_id);
                self.return_date = Some(e.return_date);
                self.reason = e.reason.clone();
                self.lines = e.lines.clone();
                self.status = if e.requires_approval {
                    PurchaseReturnStatus::PendingApproval
                } else {
                    PurchaseReturnStatus::Draft
                };
                self.created = true;
            }
            PurchaseReturnEvent::PurchaseReturnApproved(e) => {
                self.status = PurchaseReturnStatus::Approved;
                self.decision = Some(ApprovalDecision {
                    approved: true,
                    decided_by: e.approved_by,
                    note: e.note.clone(),
                    decided_at: e.occurred_at,
                });
            }
            PurchaseReturnEvent::PurchaseReturnRejected(e) => {
                self.status = PurchaseReturnStatus::Rejected;
                self.decision = Some(ApprovalDecision {
                    approved: false,
                    decided_by: e.rejected_by,
                    note: e.note.clone(),
                    decided_at: e.occurred_at,
                });
            }
            PurchaseReturnEvent::PurchaseReturnCompleted(e) => {
                if !e.lines.is_empty() {
                    self.lines = e.lines.clone();
                }
                self.status = PurchaseReturnStatus::Completed;
                self.applied = e.applied;
                self.excess = e.excess;
                self.credit_note_id = e.credit_note_id;
            }
            PurchaseReturnEvent::PurchaseReturnCancelled(_) => {
                self.status = PurchaseReturnStatus::Cancelled;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseReturnCommand::CreatePurchaseReturn(cmd) => self.handle_create(cmd),
            PurchaseReturnCommand::ApprovePurchaseReturn(cmd) => self.handle_approve(cmd),
            PurchaseReturnCommand::RejectPurchaseReturn(cmd) => self.handle_reject(cmd),
            PurchaseReturnCommand::CompletePurchaseReturn(cmd) => self.handle_complete(cmd),
            PurchaseReturnCommand::CancelPurchaseReturn(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl PurchaseReturn {
    fn ensure_exists(
        &self,
        tenant_id: TenantId,
        return_id: PurchaseReturnId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("purchase return"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != return_id {
            return Err(DomainError::invariant("return_id mismatch"));
        }
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), DomainError> {
        if self.status != PurchaseReturnStatus::PendingApproval {
            return Err(DomainError::invariant(
                "purchase return is not awaiting approval",
            ));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseReturn,
    ) -> Result<Vec<PurchaseReturnEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase return already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("return number cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("return must have at least one line"));
        }
        if let Some(l) = cmd.lines.iter().find(|l| l.quantity <= 0) {
            return Err(DomainError::validation(format!(
                "line {} has a non-positive quantity",
                l.line_id
            )));
        }

        Ok(vec![PurchaseReturnEvent::PurchaseReturnCreated(
            PurchaseReturnCreated {
                tenant_id: cmd.tenant_id,
                return_id: cmd.return_id,
                number: cmd.number.trim().to_string(),
                bill_id: cmd.bill_id,
                supplier_id: cmd.supplier_id,
                warehouse_id: cmd.warehouse_id,
                bill_warehouse_id: cmd.bill_warehouse_id,
                return_date: cmd.return_date,
                reason: cmd.reason.clone(),
                lines: cmd.lines.clone(),
                requires_approval: cmd.warehouse_id != cmd.bill_warehouse_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_approve(
        &self,
        cmd: &ApprovePurchaseReturn,
    ) -> Result<Vec<PurchaseReturnEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.return_id)?;
        self.ensure_pending()?;

        Ok(vec![PurchaseReturnEvent::PurchaseReturnApproved(
            PurchaseReturnApproved {
                tenant_id: cmd.tenant_id,
                return_id: cmd.return_id,
                approved_by: cmd.approved_by,
                note: cmd.note.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_reject(
        &self,
        cmd: &RejectPurchaseReturn,
    ) -> Result<Vec<PurchaseReturnEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.return_id)?;
        self.ensure_pending()?;

        Ok(vec![PurchaseReturnEvent::PurchaseReturnRejected(
            PurchaseReturnRejected {
                tenant_id: cmd.tenant_id,
                return_id: cmd.return_id,
                rejected_by: cmd.rejected_by,
                note: cmd.note.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_complete(
        &self,
        cmd: &CompletePurchaseReturn,
    ) -> Result<Vec<PurchaseReturnEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.return_id)?;
        match self.status {
            PurchaseReturnStatus::Draft | PurchaseReturnStatus::Approved => {}
            PurchaseReturnStatus::PendingApproval => {
                return Err(DomainError::invariant(
                    "cross-warehouse return needs approval before completion",
                ));
            }
            other => {
                return Err(DomainError::invariant(format!(
                    "purchase return is {other:?} and cannot be completed"
                )));
            }
        }

        ensure_same_lines(&self.lines, &cmd.lines)?;
        let refund_total: Amount = cmd.lines.iter().map(ReturnLineShare::refund).sum();
        if cmd.applied < 0 || cmd.excess < 0 || cmd.applied + cmd.excess != refund_total {
            return Err(DomainError::invariant(format!(
                "applied {} + excess {} must equal the refund {}",
                cmd.applied, cmd.excess, refund_total
            )));
        }
        if cmd.excess > 0 && cmd.credit_note_id.is_none() {
            return Err(DomainError::validation(
                "an excess refund needs a credit note",
            ));
        }

        Ok(vec![PurchaseReturnEvent::PurchaseReturnCompleted(
            PurchaseReturnCompleted {
                tenant_id: cmd.tenant_id,
                return_id: cmd.return_id,
                lines: cmd.lines.clone(),
                refund_total,
                applied: cmd.applied,
                excess: cmd.excess,
                credit_note_id: cmd.credit_note_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_cancel(
        &self,
        cmd: &CancelPurchaseReturn,
    ) -> Result<Vec<PurchaseReturnEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.return_id)?;
        match self.status {
            PurchaseReturnStatus::Cancelled => return Ok(vec![]),
            PurchaseReturnStatus::Completed => {
                return Err(DomainError::invariant(
                    "a completed purchase return cannot be cancelled",
                ));
            }
            _ => {}
        }

        Ok(vec![PurchaseReturnEvent::PurchaseReturnCancelled(
            PurchaseReturnCancelled {
                tenant_id: cmd.tenant_id,
                return_id: cmd.return_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

/// Repricing may change amounts but never which units come back.
fn ensure_same_lines(draft: &[ReturnLineShare], repriced: &[ReturnLineShare]) -> Result<(), DomainError> {
    let same = draft.len() == repriced.len()
        && draft.iter().zip(repriced).all(|(a, b)| {
            a.line_id == b.line_id && a.product_id == b.product_id && a.quantity == b.quantity
        });
    if !same {
        return Err(DomainError::invariant(
            "completion must return the same lines and quantities as the draft",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdesk_events::execute;
    use ledgerdesk_products::ProductId;
    use uuid::Uuid;

    fn share(quantity: i64, net: Amount, tax: Amount) -> ReturnLineShare {
        ReturnLineShare {
            line_id: Uuid::now_v7(),
            product_id: ProductId::new(AggregateId::new()),
            quantity,
            net,
            tax,
            discount: 0,
        }
    }

    fn created(tenant_id: TenantId, from: WarehouseId, received_in: WarehouseId) -> PurchaseReturn {
        let return_id = PurchaseReturnId::new(AggregateId::new());
        let mut ret = PurchaseReturn::empty(return_id);
        execute(
            &mut ret,
            &PurchaseReturnCommand::CreatePurchaseReturn(CreatePurchaseReturn {
                tenant_id,
                return_id,
                number: "PR-3".into(),
                bill_id: BillId::new(AggregateId::new()),
                supplier_id: PartyId::new(AggregateId::new()),
                warehouse_id: from,
                bill_warehouse_id: received_in,
                return_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
                reason: None,
                lines: vec![share(2, 2_000, 300)],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        ret
    }

    fn complete(ret: &PurchaseReturn, tenant_id: TenantId) -> PurchaseReturnCommand {
        PurchaseReturnCommand::CompletePurchaseReturn(CompletePurchaseReturn {
            tenant_id,
            return_id: ret.id_typed(),
            lines: ret.lines().to_vec(),
            applied: 2_300,
            excess: 0,
            credit_note_id: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn same_warehouse_return_completes_directly() {
        let tenant_id = TenantId::new();
        let main = WarehouseId::main(tenant_id);
        let mut ret = created(tenant_id, main, main);
        assert_eq!(ret.status(), PurchaseReturnStatus::Draft);
        assert!(!ret.requires_approval());
        let cmd = complete(&ret, tenant_id);
        execute(&mut ret, &cmd).unwrap();
        assert_eq!(ret.status(), PurchaseReturnStatus::Completed);
    }

    #[test]
    fn cross_warehouse_return_needs_approval() {
        let tenant_id = TenantId::new();
        let main = WarehouseId::main(tenant_id);
        let other = WarehouseId::new(AggregateId::new());
        let mut ret = created(tenant_id, other, main);
        assert_eq!(ret.status(), PurchaseReturnStatus::PendingApproval);

        let cmd = complete(&ret, tenant_id);
        assert!(matches!(
            ret.handle(&cmd),
            Err(DomainError::InvariantViolation(ref m)) if m.contains("approval")
        ));

        let approver = UserId::new();
        let return_id = ret.id_typed();
        execute(
            &mut ret,
            &PurchaseReturnCommand::ApprovePurchaseReturn(ApprovePurchaseReturn {
                tenant_id,
                return_id,
                approved_by: approver,
                note: Some("stock moved to overflow site".into()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(ret.decision().map(|d| d.decided_by), Some(approver));

        execute(&mut ret, &cmd).unwrap();
        assert_eq!(ret.status(), PurchaseReturnStatus::Completed);
    }

    #[test]
    fn rejected_return_cannot_complete() {
        let tenant_id = TenantId::new();
        let mut ret = created(
            tenant_id,
            WarehouseId::new(AggregateId::new()),
            WarehouseId::main(tenant_id),
        );
        let return_id = ret.id_typed();
        execute(
            &mut ret,
            &PurchaseReturnCommand::RejectPurchaseReturn(RejectPurchaseReturn {
                tenant_id,
                return_id,
                rejected_by: UserId::new(),
                note: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(ret.status(), PurchaseReturnStatus::Rejected);
        assert!(ret.handle(&complete(&ret, tenant_id)).is_err());
    }

    #[test]
    fn approval_only_applies_to_pending_returns() {
        let tenant_id = TenantId::new();
        let main = WarehouseId::main(tenant_id);
        let ret = created(tenant_id, main, main);
        let err = ret
            .handle(&PurchaseReturnCommand::ApprovePurchaseReturn(ApprovePurchaseReturn {
                tenant_id,
                return_id: ret.id_typed(),
                approved_by: UserId::new(),
                note: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn completion_refunds_the_repriced_lines() {
        let tenant_id = TenantId::new();
        let main = WarehouseId::main(tenant_id);
        let mut ret = created(tenant_id, main, main);
        let mut lines = ret.lines().to_vec();
        lines[0].net = 1_000;
        lines[0].tax = 150;
        let return_id = ret.id_typed();

        execute(
            &mut ret,
            &PurchaseReturnCommand::CompletePurchaseReturn(CompletePurchaseReturn {
                tenant_id,
                return_id,
                lines,
                applied: 1_150,
                excess: 0,
                credit_note_id: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(ret.refund_total(), 1_150);
        assert_eq!(ret.lines()[0].net, 1_000);
    }

    #[test]
    fn completion_cannot_swap_the_returned_product() {
        let tenant_id = TenantId::new();
        let main = WarehouseId::main(tenant_id);
        let ret = created(tenant_id, main, main);
        let mut lines = ret.lines().to_vec();
        lines[0].product_id = ProductId::new(AggregateId::new());

        let err = ret
            .handle(&PurchaseReturnCommand::CompletePurchaseReturn(CompletePurchaseReturn {
                tenant_id,
                return_id: ret.id_typed(),
                lines,
                applied: 2_300,
                excess: 0,
                credit_note_id: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
