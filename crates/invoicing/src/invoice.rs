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
use ledgerdesk_sales::SalesOrderId;

/// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Invoice lifecycle.
///
/// `Issued`, `PartiallyPaid` and `Paid` are derived from the settled amount
/// once the invoice has been issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    PartiallyPaid,
    Paid,
    Void,
}

impl InvoiceStatus {
    /// Statuses whose effects are in the ledger and stock.
    pub fn is_postable(self) -> bool {
        matches!(
            self,
            InvoiceStatus::Issued | InvoiceStatus::PartiallyPaid | InvoiceStatus::Paid
        )
    }
}

/// Quantity returned from one invoice line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnedQuantity {
    pub line_id: Uuid,
    pub quantity: i64,
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    number: String,
    customer_id: Option<PartyId>,
    sales_order_id: Option<SalesOrderId>,
    warehouse_id: Option<WarehouseId>,
    issue_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    status: InvoiceStatus,
    lines: Vec<DocumentLine>,
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

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            customer_id: None,
            sales_order_id: None,
            warehouse_id: None,
            issue_date: None,
            due_date: None,
            status: InvoiceStatus::Draft,
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

    pub fn id_typed(&self) -> InvoiceId {
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

    pub fn customer_id(&self) -> Option<PartyId> {
        self.customer_id
    }

    pub fn sales_order_id(&self) -> Option<SalesOrderId> {
        self.sales_order_id
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.issue_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn lines(&self) -> &[DocumentLine] {
        &self.lines
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

    /// Payments, applied credit notes and returns taken off the balance.
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
        return_status(
            self.lines
                .iter()
                .map(|l| (l.quantity, self.returned.get(&l.line_id).copied().unwrap_or(0))),
        )
    }

    /// Paid and void invoices are closed for edits.
    pub fn is_editable(&self) -> bool {
        !matches!(self.status, InvoiceStatus::Paid | InvoiceStatus::Void)
    }

    fn can_accept_settlement(&self) -> bool {
        matches!(
            self.status,
            InvoiceStatus::Issued | InvoiceStatus::PartiallyPaid
        )
    }

    fn refresh_status(&mut self) {
        if !self.status.is_postable() {
            return;
        }
        self.status = match self.payment_status() {
            PaymentStatus::Unpaid => InvoiceStatus::Issued,
            PaymentStatus::PartiallyPaid => InvoiceStatus::PartiallyPaid,
            PaymentStatus::Paid => InvoiceStatus::Paid,
        };
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInvoice (a draft, optionally converted from a sales order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: String,
    pub customer_id: PartyId,
    pub sales_order_id: Option<SalesOrderId>,
    pub warehouse_id: WarehouseId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<DocumentLine>,
    #[serde(default)]
    pub settings: PricingSettings,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateInvoice (replaces header, lines and pricing settings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub customer_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<DocumentLine>,
    pub settings: PricingSettings,
    pub occurred_at: DateTime<Utc>,
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment: Payment,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplySalesReturn (record returned quantities and the part of the
/// refund that reduces the balance due).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySalesReturn {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub return_id: AggregateId,
    pub lines: Vec<ReturnedQuantity>,
    pub applied: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyCredit (use a credit note's balance against this invoice).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyCredit {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub application_id: Uuid,
    pub credit_note_id: AggregateId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Commands for the Invoice aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateInvoice(CreateInvoice),
    UpdateInvoice(UpdateInvoice),
    IssueInvoice(IssueInvoice),
    RegisterPayment(RegisterPayment),
    ApplySalesReturn(ApplySalesReturn),
    ApplyCredit(ApplyCredit),
    VoidInvoice(VoidInvoice),
}

/// Event: InvoiceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: String,
    pub customer_id: PartyId,
    pub sales_order_id: Option<SalesOrderId>,
    pub warehouse_id: WarehouseId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<DocumentLine>,
    pub settings: PricingSettings,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceUpdated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub customer_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<DocumentLine>,
    pub settings: PricingSettings,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub total: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRegistered {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment: Payment,
    pub new_total_paid: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesReturnApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReturnApplied {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub return_id: AggregateId,
    pub lines: Vec<ReturnedQuantity>,
    pub applied: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CreditApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditApplied {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub application_id: Uuid,
    pub credit_note_id: AggregateId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceVoided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceVoided {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Events for the Invoice aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
    InvoiceUpdated(InvoiceUpdated),
    InvoiceIssued(InvoiceIssued),
    PaymentRegistered(PaymentRegistered),
    SalesReturnApplied(SalesReturnApplied),
    CreditApplied(CreditApplied),
    InvoiceVoided(InvoiceVoided),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "invoicing.invoice.created",
            InvoiceEvent::InvoiceUpdated(_) => "invoicing.invoice.updated",
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::PaymentRegistered(_) => "invoicing.invoice.payment_registered",
            InvoiceEvent::SalesReturnApplied(_) => "invoicing.invoice.return_applied",
            InvoiceEvent::CreditApplied(_) => "invoicing.invoice.credit_applied",
            InvoiceEvent::InvoiceVoided(_) => "invoicing.invoice.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.occurred_at,
            InvoiceEvent::InvoiceUpdated(e) => e.occurred_at,
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::PaymentRegistered(e) => e.occurred_at,
            InvoiceEvent::SalesReturnApplied(e) => e.occurred_at,
            InvoiceEvent::CreditApplied(e) => e.occurred_at,
            InvoiceEvent::InvoiceVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.customer_id = Some(e.customer_id);
                self.sales_order_id = e.sales_order_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.issue_date = Some(e.issue_date);
                self.due_date = Some(e.due_date);
                self.status = InvoiceStatus::Draft;
                self.lines = e.lines.clone();
                self.settings = e.settings.clone();
                self.totals = e.totals.clone();
                self.created = true;
            }
            InvoiceEvent::InvoiceUpdated(e) => {
                self.customer_id = Some(e.customer_id);
                self.warehouse_id = Some(e.warehouse_id);
                self.issue_date = Some(e.issue_date);
                self.due_date = Some(e.due_date);
                self.lines = e.lines.clone();
                self.settings = e.settings.clone();
                self.totals = e.totals.clone();
                self.refresh_status();
            }
            InvoiceEvent::InvoiceIssued(_) => {
                self.status = InvoiceStatus::Issued;
                self.refresh_status();
            }
            InvoiceEvent::PaymentRegistered(e) => {
                self.payments.push(e.payment.clone());
                self.amount_paid = e.new_total_paid;
                self.refresh_status();
            }
            InvoiceEvent::SalesReturnApplied(e) => {
                for l in &e.lines {
                    *self.returned.entry(l.line_id).or_insert(0) += l.quantity;
                }
                self.applied_returns.push(e.return_id);
                self.return_applied += e.applied;
                self.refresh_status();
            }
            InvoiceEvent::CreditApplied(e) => {
                self.credit_applications.push(e.application_id);
                self.amount_credited += e.amount;
                self.refresh_status();
            }
            InvoiceEvent::InvoiceVoided(_) => {
                self.status = InvoiceStatus::Void;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateInvoice(cmd) => self.handle_create(cmd),
            InvoiceCommand::UpdateInvoice(cmd) => self.handle_update(cmd),
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::RegisterPayment(cmd) => self.handle_register_payment(cmd),
            InvoiceCommand::ApplySalesReturn(cmd) => self.handle_apply_return(cmd),
            InvoiceCommand::ApplyCredit(cmd) => self.handle_apply_credit(cmd),
            InvoiceCommand::VoidInvoice(cmd) => self.handle_void(cmd),
        }
    }
}

fn ensure_dates(issue_date: NaiveDate, due_date: NaiveDate) -> Result<(), DomainError> {
    if due_date < issue_date {
        return Err(DomainError::validation("due_date cannot be before issue_date"));
    }
    Ok(())
}

impl Invoice {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if let Some(existing) = self.tenant_id {
            if existing != tenant_id {
                return Err(DomainError::invariant("tenant mismatch"));
            }
        }
        Ok(())
    }

    fn ensure_invoice_id(&self, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("invoice"));
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_invoice_id(invoice_id)
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }
        ensure_dates(cmd.issue_date, cmd.due_date)?;
        let totals = price_document(&cmd.lines, &cmd.settings)?;

        Ok(vec![InvoiceEvent::InvoiceCreated(InvoiceCreated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            number: cmd.number.trim().to_string(),
            customer_id: cmd.customer_id,
            sales_order_id: cmd.sales_order_id,
            warehouse_id: cmd.warehouse_id,
            issue_date: cmd.issue_date,
            due_date: cmd.due_date,
            lines: cmd.lines.clone(),
            settings: cmd.settings.clone(),
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.invoice_id)?;
        if !self.is_editable() {
            return Err(DomainError::invariant("cannot edit a paid or void invoice"));
        }
        ensure_dates(cmd.issue_date, cmd.due_date)?;
        let totals = price_document(&cmd.lines, &cmd.settings)?;

        let settled = self.settled();
        if totals.total < settled {
            return Err(DomainError::invariant(format!(
                "new total {} is below the {} already settled",
                totals.total, settled
            )));
        }
        for (line_id, returned) in &self.returned {
            let kept = cmd.lines.iter().find(|l| l.line_id == *line_id);
            let original = self.lines.iter().find(|l| l.line_id == *line_id);
            match (kept, original) {
                (Some(kept), Some(original))
                    if kept.product_id == original.product_id && kept.quantity >= *returned => {}
                _ => {
                    return Err(DomainError::invariant(format!(
                        "line {line_id} has {returned} returned and must keep its product and at least that quantity"
                    )));
                }
            }
        }

        if Some(cmd.customer_id) == self.customer_id
            && Some(cmd.warehouse_id) == self.warehouse_id
            && Some(cmd.issue_date) == self.issue_date
            && Some(cmd.due_date) == self.due_date
            && cmd.lines == self.lines
            && cmd.settings == self.settings
        {
            return Ok(vec![]);
        }

        Ok(vec![InvoiceEvent::InvoiceUpdated(InvoiceUpdated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            customer_id: cmd.customer_id,
            warehouse_id: cmd.warehouse_id,
            issue_date: cmd.issue_date,
            due_date: cmd.due_date,
            lines: cmd.lines.clone(),
            settings: cmd.settings.clone(),
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.invoice_id)?;
        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::invariant("only draft invoices can be issued"));
        }

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            total: self.totals.total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_register_payment(
        &self,
        cmd: &RegisterPayment,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.invoice_id)?;
        if self
            .payments
            .iter()
            .any(|p| p.payment_id == cmd.payment.payment_id)
        {
            return Err(DomainError::conflict("payment already registered"));
        }
        if !self.can_accept_settlement() {
            return Err(DomainError::invariant(
                "cannot register payment on a draft, void or fully paid invoice",
            ));
        }
        ensure_within_balance(self.totals.total, self.settled(), cmd.payment.amount, "payment")?;

        Ok(vec![InvoiceEvent::PaymentRegistered(PaymentRegistered {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            payment: cmd.payment.clone(),
            new_total_paid: self.amount_paid + cmd.payment.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_return(&self, cmd: &ApplySalesReturn) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.invoice_id)?;
        if self.applied_returns.contains(&cmd.return_id) {
            return Ok(vec![]);
        }
        if !self.status.is_postable() {
            return Err(DomainError::invariant(
                "returns can only be applied to issued invoices",
            ));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("return must have at least one line"));
        }
        for l in &cmd.lines {
            let line = self
                .lines
                .iter()
                .find(|x| x.line_id == l.line_id)
                .ok_or_else(|| DomainError::not_found(format!("invoice line {}", l.line_id)))?;
            if l.quantity <= 0 {
                return Err(DomainError::validation("returned quantity must be positive"));
            }
            let returned = self.returned.get(&l.line_id).copied().unwrap_or(0);
            if returned + l.quantity > line.quantity {
                return Err(DomainError::invariant(format!(
                    "cannot return {} of line {}: only {} remaining",
                    l.quantity,
                    l.line_id,
                    line.quantity - returned
                )));
            }
        }
        if cmd.applied < 0 {
            return Err(DomainError::validation("applied amount cannot be negative"));
        }
        if cmd.applied > self.balance_due() {
            return Err(DomainError::invariant(format!(
                "applied return {} exceeds balance due {}",
                cmd.applied,
                self.balance_due()
            )));
        }

        Ok(vec![InvoiceEvent::SalesReturnApplied(SalesReturnApplied {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            return_id: cmd.return_id,
            lines: cmd.lines.clone(),
            applied: cmd.applied,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_credit(&self, cmd: &ApplyCredit) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.invoice_id)?;
        if self.credit_applications.contains(&cmd.application_id) {
            return Ok(vec![]);
        }
        if !self.can_accept_settlement() {
            return Err(DomainError::invariant(
                "credit can only be applied to an issued invoice with a balance due",
            ));
        }
        ensure_within_balance(self.totals.total, self.settled(), cmd.amount, "credit")?;

        Ok(vec![InvoiceEvent::CreditApplied(CreditApplied {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            application_id: cmd.application_id,
            credit_note_id: cmd.credit_note_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.invoice_id)?;
        if self.status == InvoiceStatus::Void {
            return Err(DomainError::conflict("invoice is already void"));
        }
        if self.settled() > 0 {
            return Err(DomainError::invariant(
                "cannot void an invoice with payments or credits",
            ));
        }
        if self.returned.values().any(|q| *q > 0) {
            return Err(DomainError::invariant("cannot void an invoice with returns"));
        }

        Ok(vec![InvoiceEvent::InvoiceVoided(InvoiceVoided {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdesk_events::execute;
    use ledgerdesk_pricing::Discount;
    use ledgerdesk_products::ProductId;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_invoice_id() -> InvoiceId {
        InvoiceId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, day).unwrap()
    }

    fn line(quantity: i64, unit_price: Amount) -> DocumentLine {
        DocumentLine {
            line_id: Uuid::now_v7(),
            product_id: ProductId::new(AggregateId::new()),
            description: String::new(),
            quantity,
            unit_price,
            discount: Discount::None,
            tax_rate_bp: 1_000,
        }
    }

    fn create_cmd(tenant_id: TenantId, invoice_id: InvoiceId, lines: Vec<DocumentLine>) -> CreateInvoice {
        CreateInvoice {
            tenant_id,
            invoice_id,
            number: "INV-0001".into(),
            customer_id: PartyId::new(AggregateId::new()),
            sales_order_id: None,
            warehouse_id: WarehouseId::main(tenant_id),
            issue_date: date(1),
            due_date: date(31),
            lines,
            settings: PricingSettings::default(),
            occurred_at: test_time(),
        }
    }

    fn update_cmd(invoice: &Invoice, tenant_id: TenantId, lines: Vec<DocumentLine>) -> UpdateInvoice {
        UpdateInvoice {
            tenant_id,
            invoice_id: invoice.id_typed(),
            customer_id: invoice.customer_id().unwrap(),
            warehouse_id: invoice.warehouse_id().unwrap(),
            issue_date: date(1),
            due_date: date(31),
            lines,
            settings: PricingSettings::default(),
            occurred_at: test_time(),
        }
    }

    /// Issued invoice for 2 x 1000 at 10% tax (total 2200).
    fn issued(tenant_id: TenantId) -> Invoice {
        let invoice_id = test_invoice_id();
        let mut invoice = Invoice::empty(invoice_id);
        execute(
            &mut invoice,
            &InvoiceCommand::CreateInvoice(create_cmd(tenant_id, invoice_id, vec![line(2, 1_000)])),
        )
        .unwrap();
        execute(
            &mut invoice,
            &InvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id,
                invoice_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        invoice
    }

    fn pay(invoice: &mut Invoice, tenant_id: TenantId, amount: Amount) -> Result<Vec<InvoiceEvent>, DomainError> {
        let invoice_id = invoice.id_typed();
        execute(
            invoice,
            &InvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id,
                invoice_id,
                payment: Payment {
                    payment_id: Uuid::now_v7(),
                    amount,
                    paid_on: date(10),
                    method: Some("bank".into()),
                    reference: None,
                },
                occurred_at: test_time(),
            }),
        )
    }

    #[test]
    fn create_prices_the_invoice_as_draft() {
        let tenant_id = test_tenant_id();
        let invoice_id = test_invoice_id();
        let mut invoice = Invoice::empty(invoice_id);
        execute(
            &mut invoice,
            &InvoiceCommand::CreateInvoice(create_cmd(tenant_id, invoice_id, vec![line(2, 1_000)])),
        )
        .unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Draft);
        assert_eq!(invoice.totals().total, 2_200);
        assert_eq!(invoice.balance_due(), 2_200);
        assert_eq!(invoice.payment_status(), PaymentStatus::Unpaid);
    }

    #[test]
    fn due_date_before_issue_date_is_rejected() {
        let tenant_id = test_tenant_id();
        let invoice_id = test_invoice_id();
        let invoice = Invoice::empty(invoice_id);
        let mut cmd = create_cmd(tenant_id, invoice_id, vec![line(1, 100)]);
        cmd.due_date = date(1);
        cmd.issue_date = date(2);
        let err = invoice.handle(&InvoiceCommand::CreateInvoice(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn payments_move_status_to_paid() {
        let tenant_id = test_tenant_id();
        let mut invoice = issued(tenant_id);

        pay(&mut invoice, tenant_id, 1_000).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice.balance_due(), 1_200);

        let err = pay(&mut invoice, tenant_id, 1_201).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        pay(&mut invoice, tenant_id, 1_200).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert_eq!(invoice.amount_paid(), 2_200);
        assert_eq!(invoice.payments().len(), 2);
    }

    #[test]
    fn draft_invoice_cannot_take_payment() {
        let tenant_id = test_tenant_id();
        let invoice_id = test_invoice_id();
        let mut invoice = Invoice::empty(invoice_id);
        execute(
            &mut invoice,
            &InvoiceCommand::CreateInvoice(create_cmd(tenant_id, invoice_id, vec![line(1, 100)])),
        )
        .unwrap();
        assert!(pay(&mut invoice, tenant_id, 10).is_err());
    }

    #[test]
    fn paid_invoice_cannot_be_edited() {
        let tenant_id = test_tenant_id();
        let mut invoice = issued(tenant_id);
        pay(&mut invoice, tenant_id, 2_200).unwrap();

        let cmd = update_cmd(&invoice, tenant_id, vec![line(1, 500)]);
        let err = invoice.handle(&InvoiceCommand::UpdateInvoice(cmd)).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("paid or void") => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn partially_paid_invoice_edit_cannot_drop_below_settled() {
        let tenant_id = test_tenant_id();
        let mut invoice = issued(tenant_id);
        pay(&mut invoice, tenant_id, 1_500).unwrap();

        let too_small = update_cmd(&invoice, tenant_id, vec![line(1, 1_000)]);
        assert!(matches!(
            invoice.handle(&InvoiceCommand::UpdateInvoice(too_small)),
            Err(DomainError::InvariantViolation(_))
        ));

        let larger = update_cmd(&invoice, tenant_id, vec![line(3, 1_000)]);
        execute(&mut invoice, &InvoiceCommand::UpdateInvoice(larger)).unwrap();
        assert_eq!(invoice.totals().total, 3_300);
        assert_eq!(invoice.status(), InvoiceStatus::PartiallyPaid);
    }

    #[test]
    fn returns_track_quantities_and_reduce_balance() {
        let tenant_id = test_tenant_id();
        let mut invoice = issued(tenant_id);
        let line_id = invoice.lines()[0].line_id;
        let invoice_id = invoice.id_typed();
        let return_id = AggregateId::new();

        let cmd = InvoiceCommand::ApplySalesReturn(ApplySalesReturn {
            tenant_id,
            invoice_id,
            return_id,
            lines: vec![ReturnedQuantity { line_id, quantity: 1 }],
            applied: 1_100,
            occurred_at: test_time(),
        });
        execute(&mut invoice, &cmd).unwrap();
        assert_eq!(invoice.return_status(), ReturnStatus::Partial);
        assert_eq!(invoice.balance_due(), 1_100);
        assert_eq!(invoice.status(), InvoiceStatus::PartiallyPaid);

        // Replaying the same return is a no-op.
        assert!(invoice.handle(&cmd).unwrap().is_empty());

        let too_many = InvoiceCommand::ApplySalesReturn(ApplySalesReturn {
            tenant_id,
            invoice_id,
            return_id: AggregateId::new(),
            lines: vec![ReturnedQuantity { line_id, quantity: 2 }],
            applied: 0,
            occurred_at: test_time(),
        });
        assert!(invoice.handle(&too_many).is_err());

        // An edit cannot cut the line below what was returned.
        let mut shrunk = invoice.lines().to_vec();
        shrunk[0].quantity = 0;
        let cmd = update_cmd(&invoice, tenant_id, shrunk);
        assert!(invoice.handle(&InvoiceCommand::UpdateInvoice(cmd)).is_err());
    }

    #[test]
    fn credit_settles_like_a_payment() {
        let tenant_id = test_tenant_id();
        let mut invoice = issued(tenant_id);
        let invoice_id = invoice.id_typed();
        let application_id = Uuid::now_v7();
        let cmd = InvoiceCommand::ApplyCredit(ApplyCredit {
            tenant_id,
            invoice_id,
            application_id,
            credit_note_id: AggregateId::new(),
            amount: 2_200,
            occurred_at: test_time(),
        });
        execute(&mut invoice, &cmd).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert_eq!(invoice.amount_credited(), 2_200);
        assert!(invoice.handle(&cmd).unwrap().is_empty());
    }

    #[test]
    fn void_requires_nothing_settled() {
        let tenant_id = test_tenant_id();
        let mut invoice = issued(tenant_id);
        pay(&mut invoice, tenant_id, 100).unwrap();

        let invoice_id = invoice.id_typed();
        let void = InvoiceCommand::VoidInvoice(VoidInvoice {
            tenant_id,
            invoice_id,
            reason: Some("entered twice".into()),
            occurred_at: test_time(),
        });
        assert!(matches!(
            invoice.handle(&void),
            Err(DomainError::InvariantViolation(_))
        ));

        let mut fresh = issued(tenant_id);
        let void = InvoiceCommand::VoidInvoice(VoidInvoice {
            tenant_id,
            invoice_id: fresh.id_typed(),
            reason: None,
            occurred_at: test_time(),
        });
        execute(&mut fresh, &void).unwrap();
        assert_eq!(fresh.status(), InvoiceStatus::Void);
        assert!(matches!(fresh.handle(&void), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn tenant_isolation() {
        let mut invoice = issued(test_tenant_id());
        let err = pay(&mut invoice, test_tenant_id(), 10).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(ref m) if m == "tenant mismatch"));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Accepted payments never take the settled amount past the total.
            #[test]
            fn payments_never_overpay(amounts in prop::collection::vec(1i64..3_000, 1..12)) {
                let tenant_id = test_tenant_id();
                let mut invoice = issued(tenant_id);
                for amount in amounts {
                    let _ = pay(&mut invoice, tenant_id, amount);
                    prop_assert!(invoice.settled() <= invoice.totals().total);
                    prop_assert_eq!(
                        invoice.status() == InvoiceStatus::Paid,
                        invoice.balance_due() == 0
                    );
                }
            }
        }
    }
}
