use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, Amount, DomainError, TenantId};
use ledgerdesk_events::Event;
use ledgerdesk_inventory::WarehouseId;
use ledgerdesk_parties::PartyId;
use ledgerdesk_posting::{
    Payment, PaymentStatus, ReturnStatus, ensure_within_balance, payment_status, return_status,
};
use ledgerdesk_pricing::{DocumentLine, DocumentTotals, PricingSettings, price_document};

use crate::order::PurchaseOrderId;

/// Bill identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillId(pub AggregateId);

impl BillId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BillId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Draft,
    Open,
    PartiallyPaid,
    Paid,
    Void,
}

impl BillStatus {
    pub fn is_postable(self) -> bool {
        matches!(
            self,
            BillStatus::Open | BillStatus::PartiallyPaid | BillStatus::Paid
        )
    }
}

/// A bill line, optionally billing a purchase order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillLine {
    #[serde(flatten)]
    pub line: DocumentLine,
    #[serde(default)]
    pub po_line_id: Option<Uuid>,
}

/// Quantity returned from one bill line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnedQuantity {
    pub line_id: Uuid,
    pub quantity: i64,
}

fn document_lines(lines: &[BillLine]) -> Vec<DocumentLine> {
    lines.iter().map(|l| l.line.clone()).collect()
}

/// Aggregate root: Bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bill {
    id: BillId,
    tenant_id: Option<TenantId>,
    number: String,
    supplier_id: Option<PartyId>,
    supplier_reference: Option<String>,
    purchase_order_id: Option<PurchaseOrderId>,
    warehouse_id: Option<WarehouseId>,
    bill_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    status: BillStatus,
    lines: Vec<BillLine>,
    settings: PricingSettings,
    totals: DocumentTotals,
    payments: Vec<Payment>,
    amount_paid: Amount,
    amount_credited: Amount,
    return_applied: Amount,
    returned: HashMap<Uuid, i64>,
    applied_returns: Vec<AggregateId>,
    credit_applications: Vec<Uuid>,
    version: u64,
    created: bool,
}

impl Bill {
    pub fn empty(id: BillId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            supplier_id: None,
            supplier_reference: None,
            purchase_order_id: None,
            warehouse_id: None,
            bill_date: None,
            due_date: None,
            status: BillStatus::Draft,
            lines: Vec::new(),
            settings: PricingSettings::default(),
            totals: DocumentTotals::default(),
            payments: Vec::new(),
            amount_paid: 0,
            amount_credited: 0,
            return_applied: 0,
            returned: HashMap::new(),
            applied_returns: Vec::new(),
            credit_applications: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BillId {
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

    pub fn supplier_id(&self) -> Option<PartyId> {
        self.supplier_id
    }

    pub fn supplier_reference(&self) -> Option<&str> {
        self.supplier_reference.as_deref()
    }

    pub fn purchase_order_id(&self) -> Option<PurchaseOrderId> {
        self.purchase_order_id
    }

    /// Receiving warehouse.
    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn bill_date(&self) -> Option<NaiveDate> {
        self.bill_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn status(&self) -> BillStatus {
        self.status
    }

    pub fn lines(&self) -> &[BillLine] {
        &self.lines
    }

    /// The lines as priced.
    pub fn document_lines(&self) -> Vec<DocumentLine> {
        document_lines(&self.lines)
    }

    pub fn settings(&self) -> &PricingSettings {
        &self.settings
    }

    pub fn totals(&self) -> &DocumentTotals {
        &self.totals
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn amount_paid(&self) -> Amount {
        self.amount_paid
    }

    pub fn amount_credited(&self) -> Amount {
        self.amount_credited
    }

    pub fn return_applied(&self) -> Amount {
        self.return_applied
    }

    pub fn settled(&self) -> Amount {
        self.amount_paid + self.amount_credited + self.return_applied
    }

    pub fn balance_due(&self) -> Amount {
        self.totals.total - self.settled()
    }

    pub fn returned_quantities(&self) -> &HashMap<Uuid, i64> {
        &self.returned
    }

    pub fn payment_status(&self) -> PaymentStatus {
        payment_status(self.totals.total, self.settled())
    }

    pub fn return_status(&self) -> ReturnStatus {
        return_status(self.lines.iter().map(|l| {
            (
                l.line.quantity,
                self.returned.get(&l.line.line_id).copied().unwrap_or(0),
            )
        }))
    }

    /// Quantity billed per purchase order line on this bill.
    pub fn po_quantities(&self) -> HashMap<Uuid, i64> {
        let mut out = HashMap::new();
        for l in &self.lines {
            if let Some(po_line_id) = l.po_line_id {
                *out.entry(po_line_id).or_insert(0) += l.line.quantity;
            }
        }
        out
    }

    pub fn is_editable(&self) -> bool {
        !matches!(self.status, BillStatus::Paid | BillStatus::Void)
    }

    fn can_accept_settlement(&self) -> bool {
        matches!(self.status, BillStatus::Open | BillStatus::PartiallyPaid)
    }

    fn refresh_status(&mut self) {
        if !self.status.is_postable() {
            return;
        }
        self.status = match self.payment_status() {
            PaymentStatus::Unpaid => BillStatus::Open,
            PaymentStatus::PartiallyPaid => BillStatus::PartiallyPaid,
            PaymentStatus::Paid => BillStatus::Paid,
        };
    }
}

impl AggregateRoot for Bill {
    type Id = BillId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBill {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub number: String,
    pub supplier_id: PartyId,
    pub supplier_reference: Option<String>,
    pub purchase_order_id: Option<PurchaseOrderId>,
    pub warehouse_id: WarehouseId,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<BillLine>,
    #[serde(default)]
    pub settings: PricingSettings,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBill {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub supplier_id: PartyId,
    pub supplier_reference: Option<String>,
    pub warehouse_id: WarehouseId,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<BillLine>,
    pub settings: PricingSettings,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBill {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBillPayment {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub payment: Payment,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPurchaseReturn {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub return_id: AggregateId,
    pub lines: Vec<ReturnedQuantity>,
    pub applied: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyBillCredit {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub application_id: Uuid,
    pub credit_note_id: AggregateId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidBill {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillCommand {
    CreateBill(CreateBill),
    UpdateBill(UpdateBill),
    OpenBill(OpenBill),
    RegisterBillPayment(RegisterBillPayment),
    ApplyPurchaseReturn(ApplyPurchaseReturn),
    ApplyBillCredit(ApplyBillCredit),
    VoidBill(VoidBill),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillCreated {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub number: String,
    pub supplier_id: PartyId,
    pub supplier_reference: Option<String>,
    pub purchase_order_id: Option<PurchaseOrderId>,
    pub warehouse_id: WarehouseId,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<BillLine>,
    pub settings: PricingSettings,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillUpdated {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub supplier_id: PartyId,
    pub supplier_reference: Option<String>,
    pub warehouse_id: WarehouseId,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<BillLine>,
    pub settings: PricingSettings,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillOpened {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub total: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillPaymentRegistered {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub payment: Payment,
    pub new_total_paid: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReturnApplied {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub return_id: AggregateId,
    pub lines: Vec<ReturnedQuantity>,
    pub applied: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillCreditApplied {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub application_id: Uuid,
    pub credit_note_id: AggregateId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillVoided {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillEvent {
    BillCreated(BillCreated),
    BillUpdated(BillUpdated),
    BillOpened(BillOpened),
    BillPaymentRegistered(BillPaymentRegistered),
    PurchaseReturnApplied(PurchaseReturnApplied),
    BillCreditApplied(BillCreditApplied),
    BillVoided(BillVoided),
}

impl Event for BillEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BillEvent::BillCreated(_) => "purchasing.bill.created",
            BillEvent::BillUpdated(_) => "purchasing.bill.updated",
            BillEvent::BillOpened(_) => "purchasing.bill.opened",
            BillEvent::BillPaymentRegistered(_) => "purchasing.bill.payment_registered",
            BillEvent::PurchaseReturnApplied(_) => "purchasing.bill.return_applied",
            BillEvent::BillCreditApplied(_) => "purchasing.bill.credit_applied",
            BillEvent::BillVoided(_) => "purchasing.bill.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BillEvent::BillCreated(e) => e.occurred_at,
            BillEvent::BillUpdated(e) => e.occurred_at,
            BillEvent::BillOpened(e) => e.occurred_at,
            BillEvent::BillPaymentRegistered(e) => e.occurred_at,
            BillEvent::PurchaseReturnApplied(e) => e.occurred_at,
            BillEvent::BillCreditApplied(e) => e.occurred_at,
            BillEvent::BillVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Bill {
    type Command = BillCommand;
    type Event = BillEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BillEvent::BillCreated(e) => {
                self.id = e.bill_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.supplier_id = Some(e.supplier_id);
                self.supplier_reference = e.supplier_reference.clone();
                self.purchase_order_id = e.purchase_order_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.bill_date = Some(e.bill_date);
                self.due_date = Some(e.due_date);
                self.status = BillStatus::Draft;
                self.lines = e.lines.clone();
                self.settings = e.settings.clone();
                self.totals = e.totals.clone();
                self.created = true;
            }
            BillEvent::BillUpdated(e) => {
                self.supplier_id = Some(e.supplier_id);
                self.supplier_reference = e.supplier_reference.clone();
                self.warehouse_id = Some(e.warehouse_id);
                self.bill_date = Some(e.bill_date);
                self.due_date = Some(e.due_date);
                self.lines = e.lines.clone();
                self.settings = e.settings.clone();
                self.totals = e.totals.clone();
                self.refresh_status();
            }
            BillEvent::BillOpened(_) => {
                self.status = BillStatus::Open;
                self.refresh_status();
            }
            BillEvent::BillPaymentRegistered(e) => {
                self.payments.push(e.payment.clone());
                self.amount_paid = e.new_total_paid;
                self.refresh_status();
            }
            BillEvent::PurchaseReturnApplied(e) => {
                for l in &e.lines {
                    *self.returned.entry(l.line_id).or_insert(0) += l.quantity;
                }
                self.applied_returns.push(e.return_id);
                self.return_applied += e.applied;
                self.refresh_status();
            }
            BillEvent::BillCreditApplied(e) => {
                self.credit_applications.push(e.application_id);
                self.amount_credited += e.amount;
                self.refresh_status();
            }
            BillEvent::BillVoided(_) => {
                self.status = BillStatus::Void;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BillCommand::CreateBill(cmd) => self.handle_create(cmd),
            BillCommand::UpdateBill(cmd) => self.handle_update(cmd),
            BillCommand::OpenBill(cmd) => self.handle_open(cmd),
            BillCommand::RegisterBillPayment(cmd) => self.handle_register_payment(cmd),
            BillCommand::ApplyPurchaseReturn(cmd) => self.handle_apply_return(cmd),
            BillCommand::ApplyBillCredit(cmd) => self.handle_apply_credit(cmd),
            BillCommand::VoidBill(cmd) => self.handle_void(cmd),
        }
    }
}

fn validate_bill(
    bill_date: NaiveDate,
    due_date: NaiveDate,
    purchase_order_id: Option<PurchaseOrderId>,
    lines: &[BillLine],
    settings: &PricingSettings,
) -> Result<DocumentTotals, DomainError> {
    if due_date < bill_date {
        return Err(DomainError::validation("due_date cannot be before bill_date"));
    }
    if purchase_order_id.is_none() && lines.iter().any(|l| l.po_line_id.is_some()) {
        return Err(DomainError::validation(
            "lines reference a purchase order but the bill has none",
        ));
    }
    price_document(&document_lines(lines), settings)
}

impl Bill {
    fn ensure_exists(&self, tenant_id: TenantId, bill_id: BillId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("bill"));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != bill_id {
            return Err(DomainError::invariant("bill_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateBill) -> Result<Vec<BillEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("bill already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("bill number cannot be empty"));
        }
        let totals = validate_bill(
            cmd.bill_date,
            cmd.due_date,
            cmd.purchase_order_id,
            &cmd.lines,
            &cmd.settings,
        )?;

        Ok(vec![BillEvent::BillCreated(BillCreated {
            tenant_id: cmd.tenant_id,
            bill_id: cmd.bill_id,
            number: cmd.number.trim().to_string(),
            supplier_id: cmd.supplier_id,
            supplier_reference: cmd.supplier_reference.clone(),
            purchase_order_id: cmd.purchase_order_id,
            warehouse_id: cmd.warehouse_id,
            bill_date: cmd.bill_date,
            due_date: cmd.due_date,
            lines: cmd.lines.clone(),
            settings: cmd.settings.clone(),
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateBill) -> Result<Vec<BillEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.bill_id)?;
        if !self.is_editable() {
            return Err(DomainError::invariant("cannot edit a paid or void bill"));
        }
        let totals = validate_bill(
            cmd.bill_date,
            cmd.due_date,
            self.purchase_order_id,
            &cmd.lines,
            &cmd.settings,
        )?;
        let settled = self.settled();
        if totals.total < settled {
            return Err(DomainError::invariant(format!(
                "new total {} is below the {} already settled",
                totals.total, settled
            )));
        }
        for (line_id, returned) in &self.returned {
            let kept = cmd.lines.iter().find(|l| l.line.line_id == *line_id);
            let original = self.lines.iter().find(|l| l.line.line_id == *line_id);
            match (kept, original) {
                (Some(kept), Some(original))
                    if kept.line.product_id == original.line.product_id
                        && kept.line.quantity >= *returned => {}
                _ => {
                    return Err(DomainError::invariant(format!(
                        "line {line_id} has {returned} returned and must keep its product and at least that quantity"
                    )));
                }
            }
        }

        if Some(cmd.supplier_id) == self.supplier_id
            && cmd.supplier_reference == self.supplier_reference
            && Some(cmd.warehouse_id) == self.warehouse_id
            && Some(cmd.bill_date) == self.bill_date
            && Some(cmd.due_date) == self.due_date
            && cmd.lines == self.lines
            && cmd.settings == self.settings
        {
            return Ok(vec![]);
        }

        Ok(vec![BillEvent::BillUpdated(BillUpdated {
            tenant_id: cmd.tenant_id,
            bill_id: cmd.bill_id,
            supplier_id: cmd.supplier_id,
            supplier_reference: cmd.supplier_reference.clone(),
            warehouse_id: cmd.warehouse_id,
            bill_date: cmd.bill_date,
            due_date: cmd.due_date,
            lines: cmd.lines.clone(),
            settings: cmd.settings.clone(),
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_open(&self, cmd: &OpenBill) -> Result<Vec<BillEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.bill_id)?;
        if self.status != BillStatus::Draft {
            return Err(DomainError::invariant("only draft bills can be opened"));
        }

        Ok(vec![BillEvent::BillOpened(BillOpened {
            tenant_id: cmd.tenant_id,
            bill_id: cmd.bill_id,
            total: self.totals.total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_register_payment(
        &self,
        cmd: &RegisterBillPayment,
    ) -> Result<Vec<BillEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.bill_id)?;
        if self
            .payments
            .iter()
            .any(|p| p.payment_id == cmd.payment.payment_id)
        {
            return Err(DomainError::conflict("payment already registered"));
        }
        if !self.can_accept_settlement() {
            return Err(DomainError::invariant(
                "cannot register payment on a draft, void or fully paid bill",
            ));
        }
        ensure_within_balance(self.totals.total, self.settled(), cmd.payment.amount, "payment")?;

        Ok(vec![BillEvent::BillPaymentRegistered(BillPaymentRegistered {
            tenant_id: cmd.tenant_id,
            bill_id: cmd.bill_id,
            payment: cmd.payment.clone(),
            new_total_paid: self.amount_paid + cmd.payment.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_return(&self, cmd: &ApplyPurchaseReturn) -> Result<Vec<BillEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.bill_id)?;
        if self.applied_returns.contains(&cmd.return_id) {
            return Ok(vec![]);
        }
        if !self.status.is_postable() {
            return Err(DomainError::invariant(
                "returns can only be applied to open bills",
            ));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("return must have at least one line"));
        }
        for l in &cmd.lines {
            let line = self
                .lines
                .iter()
                .find(|x| x.line.line_id == l.line_id)
                .ok_or_else(|| DomainError::not_found(format!("bill line {}", l.line_id)))?;
            if l.quantity <= 0 {
                return Err(DomainError::validation("returned quantity must be positive"));
            }
            let returned = self.returned.get(&l.line_id).copied().unwrap_or(0);
            if returned + l.quantity > line.line.quantity {
                return Err(DomainError::invariant(format!(
                    "cannot return {} of line {}: only {} remaining",
                    l.quantity,
                    l.line_id,
                    line.line.quantity - returned
                )));
            }
        }
        if cmd.applied < 0 || cmd.applied > self.balance_due() {
            return Err(DomainError::invariant(format!(
                "applied return {} must be between 0 and the balance due {}",
                cmd.applied,
                self.balance_due()
            )));
        }

        Ok(vec![BillEvent::PurchaseReturnApplied(PurchaseReturnApplied {
            tenant_id: cmd.tenant_id,
            bill_id: cmd.bill_id,
            return_id: cmd.return_id,
            lines: cmd.lines.clone(),
            applied: cmd.applied,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_credit(&self, cmd: &ApplyBillCredit) -> Result<Vec<BillEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.bill_id)?;
        if self.credit_applications.contains(&cmd.application_id) {
            return Ok(vec![]);
        }
        if !self.can_accept_settlement() {
            return Err(DomainError::invariant(
                "credit can only be applied to an open bill with a balance due",
            ));
        }
        ensure_within_balance(self.totals.total, self.settled(), cmd.amount, "credit")?;

        Ok(vec![BillEvent::BillCreditApplied(BillCreditApplied {
            tenant_id: cmd.tenant_id,
            bill_id: cmd.bill_id,
            application_id: cmd.application_id,
            credit_note_id: cmd.credit_note_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidBill) -> Result<Vec<BillEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.bill_id)?;
        if self.status == BillStatus::Void {
            return Err(DomainError::conflict("bill is already void"));
        }
        if self.settled() > 0 {
            return Err(DomainError::invariant(
                "cannot void a bill with payments or credits",
            ));
        }
        if self.returned.values().any(|q| *q > 0) {
            return Err(DomainError::invariant("cannot void a bill with returns"));
        }

        Ok(vec![BillEvent::BillVoided(BillVoided {
            tenant_id: cmd.tenant_id,
            bill_id: cmd.bill_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdesk_events::execute;
    use ledgerdesk_pricing::{Discount, DiscountPlacement};
    use ledgerdesk_products::ProductId;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, day).unwrap()
    }

    fn bill_line(quantity: i64, unit_price: Amount, po_line_id: Option<Uuid>) -> BillLine {
        BillLine {
            line: DocumentLine {
                line_id: Uuid::now_v7(),
                product_id: ProductId::new(AggregateId::new()),
                description: String::new(),
                quantity,
                unit_price,
                discount: Discount::None,
                tax_rate_bp: 1_500,
            },
            po_line_id,
        }
    }

    fn create(tenant_id: TenantId, lines: Vec<BillLine>, po: Option<PurchaseOrderId>) -> CreateBill {
        CreateBill {
            tenant_id,
            bill_id: BillId::new(AggregateId::new()),
            number: "BILL-7".into(),
            supplier_id: PartyId::new(AggregateId::new()),
            supplier_reference: Some("ACME-99".into()),
            purchase_order_id: po,
            warehouse_id: WarehouseId::main(tenant_id),
            bill_date: date(1),
            due_date: date(30),
            lines,
            settings: PricingSettings::default(),
            occurred_at: Utc::now(),
        }
    }

    fn opened(tenant_id: TenantId, lines: Vec<BillLine>) -> Bill {
        let cmd = create(tenant_id, lines, None);
        let bill_id = cmd.bill_id;
        let mut bill = Bill::empty(bill_id);
        execute(&mut bill, &BillCommand::CreateBill(cmd)).unwrap();
        execute(
            &mut bill,
            &BillCommand::OpenBill(OpenBill {
                tenant_id,
                bill_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        bill
    }

    fn pay(bill: &mut Bill, tenant_id: TenantId, amount: Amount) -> Result<Vec<BillEvent>, DomainError> {
        let bill_id = bill.id_typed();
        execute(
            bill,
            &BillCommand::RegisterBillPayment(RegisterBillPayment {
                tenant_id,
                bill_id,
                payment: Payment {
                    payment_id: Uuid::now_v7(),
                    amount,
                    paid_on: date(15),
                    method: None,
                    reference: None,
                },
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn po_line_links_need_a_purchase_order() {
        let tenant_id = TenantId::new();
        let cmd = create(tenant_id, vec![bill_line(1, 100, Some(Uuid::now_v7()))], None);
        let bill = Bill::empty(cmd.bill_id);
        assert!(matches!(
            bill.handle(&BillCommand::CreateBill(cmd)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn po_quantities_sum_per_po_line() {
        let tenant_id = TenantId::new();
        let po_line = Uuid::now_v7();
        let po = PurchaseOrderId::new(AggregateId::new());
        let cmd = create(
            tenant_id,
            vec![
                bill_line(2, 100, Some(po_line)),
                bill_line(3, 100, Some(po_line)),
                bill_line(1, 100, None),
            ],
            Some(po),
        );
        let mut bill = Bill::empty(cmd.bill_id);
        execute(&mut bill, &BillCommand::CreateBill(cmd)).unwrap();
        assert_eq!(bill.po_quantities().get(&po_line), Some(&5));
        assert_eq!(bill.purchase_order_id(), Some(po));
    }

    #[test]
    fn bill_status_follows_payments() {
        let tenant_id = TenantId::new();
        let mut bill = opened(tenant_id, vec![bill_line(4, 1_000, None)]);
        assert_eq!(bill.totals().total, 4_600);
        assert_eq!(bill.status(), BillStatus::Open);

        pay(&mut bill, tenant_id, 600).unwrap();
        assert_eq!(bill.status(), BillStatus::PartiallyPaid);
        assert!(pay(&mut bill, tenant_id, 4_001).is_err());
        pay(&mut bill, tenant_id, 4_000).unwrap();
        assert_eq!(bill.status(), BillStatus::Paid);

        let cmd = UpdateBill {
            tenant_id,
            bill_id: bill.id_typed(),
            supplier_id: bill.supplier_id().unwrap(),
            supplier_reference: None,
            warehouse_id: WarehouseId::main(tenant_id),
            bill_date: date(1),
            due_date: date(30),
            lines: vec![bill_line(1, 1, None)],
            settings: PricingSettings::default(),
            occurred_at: Utc::now(),
        };
        assert!(matches!(
            bill.handle(&BillCommand::UpdateBill(cmd)),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn tax_inclusive_bill_with_discount_after_tax() {
        let tenant_id = TenantId::new();
        let mut cmd = create(tenant_id, vec![bill_line(1, 11_500, None)], None);
        cmd.settings = PricingSettings {
            tax_inclusive: true,
            document_discount: Discount::Amount(500),
            discount_placement: DiscountPlacement::AfterTax,
            ..PricingSettings::default()
        };
        let mut bill = Bill::empty(cmd.bill_id);
        execute(&mut bill, &BillCommand::CreateBill(cmd)).unwrap();
        assert_eq!(bill.totals().subtotal, 10_000);
        assert_eq!(bill.totals().tax_total, 1_500);
        assert_eq!(bill.totals().total, 11_000);
    }

    #[test]
    fn void_blocked_once_paid() {
        let tenant_id = TenantId::new();
        let mut bill = opened(tenant_id, vec![bill_line(1, 1_000, None)]);
        pay(&mut bill, tenant_id, 1).unwrap();
        let err = bill
            .handle(&BillCommand::VoidBill(VoidBill {
                tenant_id,
                bill_id: bill.id_typed(),
                reason: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn return_reduces_balance_and_tracks_quantity() {
        let tenant_id = TenantId::new();
        let mut bill = opened(tenant_id, vec![bill_line(2, 1_000, None)]);
        let line_id = bill.lines()[0].line.line_id;
        let bill_id = bill.id_typed();
        execute(
            &mut bill,
            &BillCommand::ApplyPurchaseReturn(ApplyPurchaseReturn {
                tenant_id,
                bill_id,
                return_id: AggregateId::new(),
                lines: vec![ReturnedQuantity { line_id, quantity: 2 }],
                applied: 2_300,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(bill.return_status(), ReturnStatus::Full);
        assert_eq!(bill.status(), BillStatus::Paid);
        assert_eq!(bill.balance_due(), 0);
    }
}
