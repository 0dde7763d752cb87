use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, Amount, DomainError, TenantId};
use ledgerdesk_events::Event;
use ledgerdesk_inventory::WarehouseId;
use ledgerdesk_parties::{CreditNoteId, PartyId};
use ledgerdesk_posting::ReturnLineShare;

use crate::invoice::InvoiceId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesReturnId(pub AggregateId);

impl SalesReturnId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SalesReturnId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalesReturnStatus {
    Draft,
    Completed,
    Cancelled,
}

/// Aggregate root: SalesReturn (goods coming back against an invoice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesReturn {
    id: SalesReturnId,
    tenant_id: Option<TenantId>,
    number: String,
    invoice_id: Option<InvoiceId>,
    customer_id: Option<PartyId>,
    warehouse_id: Option<WarehouseId>,
    return_date: Option<NaiveDate>,
    reason: Option<String>,
    status: SalesReturnStatus,
    lines: Vec<ReturnLineShare>,
    applied: Amount,
    excess: Amount,
    credit_note_id: Option<CreditNoteId>,
    version: u64,
    created: bool,
}

impl SalesReturn {
    pub fn empty(id: SalesReturnId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            invoice_id: None,
            customer_id: None,
            warehouse_id: None,
            return_date: None,
            reason: None,
            status: SalesReturnStatus::Draft,
            lines: Vec::new(),
            applied: 0,
            excess: 0,
            credit_note_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SalesReturnId {
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

    pub fn invoice_id(&self) -> Option<InvoiceId> {
        self.invoice_id
    }

    pub fn customer_id(&self) -> Option<PartyId> {
        self.customer_id
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn return_date(&self) -> Option<NaiveDate> {
        self.return_date
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn status(&self) -> SalesReturnStatus {
        self.status
    }

    pub fn lines(&self) -> &[ReturnLineShare] {
        &self.lines
    }

    /// Net + tax of the returned lines, less their share of an after-tax discount.
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
}

impl AggregateRoot for SalesReturn {
    type Id = SalesReturnId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSalesReturn {
    pub tenant_id: TenantId,
    pub return_id: SalesReturnId,
    pub number: String,
    pub invoice_id: InvoiceId,
    pub customer_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub return_date: NaiveDate,
    pub reason: Option<String>,
    pub lines: Vec<ReturnLineShare>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteSalesReturn {
    pub tenant_id: TenantId,
    pub return_id: SalesReturnId,
    /// The draft's lines priced against the document as it stands now.
    pub lines: Vec<ReturnLineShare>,
    pub applied: Amount,
    pub excess: Amount,
    pub credit_note_id: Option<CreditNoteId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelSalesReturn {
    pub tenant_id: TenantId,
    pub return_id: SalesReturnId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesReturnCommand {
    CreateSalesReturn(CreateSalesReturn),
    CompleteSalesReturn(CompleteSalesReturn),
    CancelSalesReturn(CancelSalesReturn),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReturnCreated {
    pub tenant_id: TenantId,
    pub return_id: SalesReturnId,
    pub number: String,
    pub invoice_id: InvoiceId,
    pub customer_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub return_date: NaiveDate,
    pub reason: Option<String>,
    pub lines: Vec<ReturnLineShare>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReturnCompleted {
    pub tenant_id: TenantId,
    pub return_id: SalesReturnId,
    #[serde(default)]
    pub lines: Vec<ReturnLineShare>,
    pub refund_total: Amount,
    pub applied: Amount,
    pub excess: Amount,
    pub credit_note_id: Option<CreditNoteId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReturnCancelled {
    pub tenant_id: TenantId,
    pub return_id: SalesReturnId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesReturnEvent {
    SalesReturnCreated(SalesReturnCreated),
    SalesReturnCompleted(SalesReturnCompleted),
    SalesReturnCancelled(SalesReturnCancelled),
}

impl Event for SalesReturnEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalesReturnEvent::SalesReturnCreated(_) => "invoicing.sales_return.created",
            SalesReturnEvent::SalesReturnCompleted(_) => "invoicing.sales_return.completed",
            SalesReturnEvent::SalesReturnCancelled(_) => "invoicing.sales_return.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalesReturnEvent::SalesReturnCreated(e) => e.occurred_at,
            SalesReturnEvent::SalesReturnCompleted(e) => e.occurred_at,
            SalesReturnEvent::SalesReturnCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SalesReturn {
    type Command = SalesReturnCommand;
    type Event = SalesReturnEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalesReturnEvent::SalesReturnCreated(e) => {
                self.id = e.return_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.invoice_id = Some(e.invoice_id);
                self.customer_id = Some(e.customer_id);
                self.warehouse_id = Some(e.warehouse_id);
                self.return_date = Some(e.return_date);
                self.reason = e.reason.clone();
                self.lines = e.lines.clone();
                self.status = SalesReturnStatus::Draft;
                self.created = true;
            }
            SalesReturnEvent::SalesReturnCompleted(e) => {
                if !e.lines.is_empty() {
                    self.lines = e.lines.clone();
                }
                self.status = SalesReturnStatus::Completed;
                self.applied = e.applied;
                self.excess = e.excess;
                self.credit_note_id = e.credit_note_id;
            }
            SalesReturnEvent::SalesReturnCancelled(_) => {
                self.status = SalesReturnStatus::Cancelled;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalesReturnCommand::CreateSalesReturn(cmd) => self.handle_create(cmd),
            SalesReturnCommand::CompleteSalesReturn(cmd) => self.handle_complete(cmd),
            SalesReturnCommand::CancelSalesReturn(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl SalesReturn {
    fn ensure_exists(&self, tenant_id: TenantId, return_id: SalesReturnId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("sales return"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != return_id {
            return Err(DomainError::invariant("return_id mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self) -> Result<(), DomainError> {
        if self.status != SalesReturnStatus::Draft {
            return Err(DomainError::invariant(format!(
                "sales return is {:?}, expected draft",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateSalesReturn) -> Result<Vec<SalesReturnEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sales return already exists"));
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

        Ok(vec![SalesReturnEvent::SalesReturnCreated(SalesReturnCreated {
            tenant_id: cmd.tenant_id,
            return_id: cmd.return_id,
            number: cmd.number.trim().to_string(),
            invoice_id: cmd.invoice_id,
            customer_id: cmd.customer_id,
            warehouse_id: cmd.warehouse_id,
            return_date: cmd.return_date,
            reason: cmd.reason.clone(),
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(
        &self,
        cmd: &CompleteSalesReturn,
    ) -> Result<Vec<SalesReturnEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.return_id)?;
        self.ensure_draft()?;

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

        Ok(vec![SalesReturnEvent::SalesReturnCompleted(
            SalesReturnCompleted {
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

    fn handle_cancel(&self, cmd: &CancelSalesReturn) -> Result<Vec<SalesReturnEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.return_id)?;
        if self.status == SalesReturnStatus::Cancelled {
            return Ok(vec![]);
        }
        self.ensure_draft()?;

        Ok(vec![SalesReturnEvent::SalesReturnCancelled(
            SalesReturnCancelled {
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
    use ledgerdesk_accounting::{DocumentKind, SourceDocument};
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

    fn draft(tenant_id: TenantId) -> SalesReturn {
        let return_id = SalesReturnId::new(AggregateId::new());
        let mut ret = SalesReturn::empty(return_id);
        execute(
            &mut ret,
            &SalesReturnCommand::CreateSalesReturn(CreateSalesReturn {
                tenant_id,
                return_id,
                number: "SR-1".into(),
                invoice_id: InvoiceId::new(AggregateId::new()),
                customer_id: PartyId::new(AggregateId::new()),
                warehouse_id: WarehouseId::main(tenant_id),
                return_date: NaiveDate::from_ymd_opt(2026, 6, 2).unwrap(),
                reason: Some("damaged".into()),
                lines: vec![share(1, 1_000, 100), share(2, 500, 50)],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        ret
    }

    #[test]
    fn refund_total_sums_line_shares() {
        let ret = draft(TenantId::new());
        assert_eq!(ret.refund_total(), 1_650);
        assert_eq!(ret.status(), SalesReturnStatus::Draft);
    }

    #[test]
    fn completion_split_must_cover_the_refund() {
        let tenant_id = TenantId::new();
        let mut ret = draft(tenant_id);
        let return_id = ret.id_typed();
        let lines = ret.lines().to_vec();

        let short = SalesReturnCommand::CompleteSalesReturn(CompleteSalesReturn {
            tenant_id,
            return_id,
            lines: lines.clone(),
            applied: 1_000,
            excess: 0,
            credit_note_id: None,
            occurred_at: Utc::now(),
        });
        assert!(ret.handle(&short).is_err());

        let no_note = SalesReturnCommand::CompleteSalesReturn(CompleteSalesReturn {
            tenant_id,
            return_id,
            lines: lines.clone(),
            applied: 1_000,
            excess: 650,
            credit_note_id: None,
            occurred_at: Utc::now(),
        });
        assert!(matches!(ret.handle(&no_note), Err(DomainError::Validation(_))));

        let source = SourceDocument::new(DocumentKind::SalesReturn, return_id.0);
        let note = CreditNoteId::for_source(tenant_id, source);
        execute(
            &mut ret,
            &SalesReturnCommand::CompleteSalesReturn(CompleteSalesReturn {
                tenant_id,
                return_id,
                lines: lines.clone(),
                applied: 1_000,
                excess: 650,
                credit_note_id: Some(note),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(ret.status(), SalesReturnStatus::Completed);
        assert_eq!(ret.excess(), 650);
        assert_eq!(ret.credit_note_id(), Some(note));
    }

    #[test]
    fn completion_takes_the_repriced_shares() {
        let tenant_id = TenantId::new();
        let mut ret = draft(tenant_id);
        let return_id = ret.id_typed();
        let repriced: Vec<ReturnLineShare> = ret
            .lines()
            .iter()
            .map(|l| ReturnLineShare {
                net: l.net / 2,
                tax: l.tax / 2,
                ..l.clone()
            })
            .collect();

        execute(
            &mut ret,
            &SalesReturnCommand::CompleteSalesReturn(CompleteSalesReturn {
                tenant_id,
                return_id,
                lines: repriced,
                applied: 825,
                excess: 0,
                credit_note_id: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(ret.refund_total(), 825);
        assert_eq!(ret.applied(), 825);
    }

    #[test]
    fn completion_cannot_change_returned_quantities() {
        let tenant_id = TenantId::new();
        let ret = draft(tenant_id);
        let mut lines = ret.lines().to_vec();
        lines[1].quantity = 1;

        let err = ret
            .handle(&SalesReturnCommand::CompleteSalesReturn(CompleteSalesReturn {
                tenant_id,
                return_id: ret.id_typed(),
                lines,
                applied: 1_650,
                excess: 0,
                credit_note_id: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn completed_return_cannot_be_cancelled() {
        let tenant_id = TenantId::new();
        let mut ret = draft(tenant_id);
        let return_id = ret.id_typed();
        let lines = ret.lines().to_vec();
        execute(
            &mut ret,
            &SalesReturnCommand::CompleteSalesReturn(CompleteSalesReturn {
                tenant_id,
                return_id,
                lines: lines.clone(),
                applied: 1_650,
                excess: 0,
                credit_note_id: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let err = ret
            .handle(&SalesReturnCommand::CancelSalesReturn(CancelSalesReturn {
                tenant_id,
                return_id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
