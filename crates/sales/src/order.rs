use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ledgerdesk_events::Event;
use ledgerdesk_parties::PartyId;
use ledgerdesk_pricing::{DocumentLine, DocumentTotals, PricingSettings, price_document};

/// Sales order identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesOrderId(pub AggregateId);

impl SalesOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SalesOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Sales order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalesOrderStatus {
    Draft,
    Confirmed,
    Invoiced,
    Closed,
    Cancelled,
}

/// Aggregate root: SalesOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesOrder {
    id: SalesOrderId,
    tenant_id: Option<TenantId>,
    number: String,
    customer_id: Option<PartyId>,
    order_date: Option<NaiveDate>,
    status: SalesOrderStatus,
    lines: Vec<DocumentLine>,
    settings: PricingSettings,
    totals: DocumentTotals,
    invoice_id: Option<AggregateId>,
    version: u64,
    created: bool,
}

impl SalesOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SalesOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            customer_id: None,
            order_date: None,
            status: SalesOrderStatus::Draft,
            lines: Vec::new(),
            settings: PricingSettings::default(),
            totals: DocumentTotals::default(),
            invoice_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SalesOrderId {
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

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn status(&self) -> SalesOrderStatus {
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

    /// The invoice this order was converted into, if any.
    pub fn invoice_id(&self) -> Option<AggregateId> {
        self.invoice_id
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(
            self.status,
            SalesOrderStatus::Draft | SalesOrderStatus::Confirmed
        )
    }

    pub fn is_invoice_allowed(&self) -> bool {
        matches!(self.status, SalesOrderStatus::Confirmed) && self.invoice_id.is_none()
    }
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateSalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSalesOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub number: String,
    pub customer_id: PartyId,
    pub order_date: NaiveDate,
    pub lines: Vec<DocumentLine>,
    #[serde(default)]
    pub settings: PricingSettings,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReplaceSalesOrderLines (lines and pricing settings together).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceSalesOrderLines {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub lines: Vec<DocumentLine>,
    pub settings: PricingSettings,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmSalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmSalesOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LinkInvoice (the order was converted into `invoice_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInvoice {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UnlinkInvoice (the linked invoice was voided).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkInvoice {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MirrorInvoice (copy the linked invoice's lines and settings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorInvoice {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub invoice_id: AggregateId,
    pub lines: Vec<DocumentLine>,
    pub settings: PricingSettings,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseSalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseSalesOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelSalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelSalesOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Commands for the SalesOrder aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderCommand {
    CreateSalesOrder(CreateSalesOrder),
    ReplaceSalesOrderLines(ReplaceSalesOrderLines),
    ConfirmSalesOrder(ConfirmSalesOrder),
    LinkInvoice(LinkInvoice),
    UnlinkInvoice(UnlinkInvoice),
    MirrorInvoice(MirrorInvoice),
    CloseSalesOrder(CloseSalesOrder),
    CancelSalesOrder(CancelSalesOrder),
}

/// Event: SalesOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub number: String,
    pub customer_id: PartyId,
    pub order_date: NaiveDate,
    pub lines: Vec<DocumentLine>,
    pub settings: PricingSettings,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesOrderLinesReplaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderLinesReplaced {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub lines: Vec<DocumentLine>,
    pub settings: PricingSettings,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesOrderConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderConfirmed {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesOrderInvoiceLinked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderInvoiceLinked {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesOrderInvoiceUnlinked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderInvoiceUnlinked {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesOrderMirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderMirrored {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub invoice_id: AggregateId,
    pub lines: Vec<DocumentLine>,
    pub settings: PricingSettings,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesOrderClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderClosed {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesOrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderCancelled {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Events for the SalesOrder aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderEvent {
    SalesOrderCreated(SalesOrderCreated),
    SalesOrderLinesReplaced(SalesOrderLinesReplaced),
    SalesOrderConfirmed(SalesOrderConfirmed),
    SalesOrderInvoiceLinked(SalesOrderInvoiceLinked),
    SalesOrderInvoiceUnlinked(SalesOrderInvoiceUnlinked),
    SalesOrderMirrored(SalesOrderMirrored),
    SalesOrderClosed(SalesOrderClosed),
    SalesOrderCancelled(SalesOrderCancelled),
}

impl Event for SalesOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalesOrderEvent::SalesOrderCreated(_) => "sales.sales_order.created",
            SalesOrderEvent::SalesOrderLinesReplaced(_) => "sales.sales_order.lines_replaced",
            SalesOrderEvent::SalesOrderConfirmed(_) => "sales.sales_order.confirmed",
            SalesOrderEvent::SalesOrderInvoiceLinked(_) => "sales.sales_order.invoice_linked",
            SalesOrderEvent::SalesOrderInvoiceUnlinked(_) => "sales.sales_order.invoice_unlinked",
            SalesOrderEvent::SalesOrderMirrored(_) => "sales.sales_order.mirrored",
            SalesOrderEvent::SalesOrderClosed(_) => "sales.sales_order.closed",
            SalesOrderEvent::SalesOrderCancelled(_) => "sales.sales_order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalesOrderEvent::SalesOrderCreated(e) => e.occurred_at,
            SalesOrderEvent::SalesOrderLinesReplaced(e) => e.occurred_at,
            SalesOrderEvent::SalesOrderConfirmed(e) => e.occurred_at,
            SalesOrderEvent::SalesOrderInvoiceLinked(e) => e.occurred_at,
            SalesOrderEvent::SalesOrderInvoiceUnlinked(e) => e.occurred_at,
            SalesOrderEvent::SalesOrderMirrored(e) => e.occurred_at,
            SalesOrderEvent::SalesOrderClosed(e) => e.occurred_at,
            SalesOrderEvent::SalesOrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SalesOrder {
    type Command = SalesOrderCommand;
    type Event = SalesOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalesOrderEvent::SalesOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.customer_id = Some(e.customer_id);
                self.order_date = Some(e.order_date);
                self.status = SalesOrderStatus::Draft;
                self.lines = e.lines.clone();
                self.settings = e.settings.clone();
                self.totals = e.totals.clone();
                self.created = true;
            }
            SalesOrderEvent::SalesOrderLinesReplaced(e) => {
                self.lines = e.lines.clone();
                self.settings = e.settings.clone();
                self.totals = e.totals.clone();
            }
            SalesOrderEvent::SalesOrderConfirmed(_) => {
                self.status = SalesOrderStatus::Confirmed;
            }
            SalesOrderEvent::SalesOrderInvoiceLinked(e) => {
                self.invoice_id = Some(e.invoice_id);
                self.status = SalesOrderStatus::Invoiced;
            }
            SalesOrderEvent::SalesOrderInvoiceUnlinked(_) => {
                self.invoice_id = None;
                self.status = SalesOrderStatus::Confirmed;
            }
            SalesOrderEvent::SalesOrderMirrored(e) => {
                self.lines = e.lines.clone();
                self.settings = e.settings.clone();
                self.totals = e.totals.clone();
            }
            SalesOrderEvent::SalesOrderClosed(_) => {
                self.status = SalesOrderStatus::Closed;
            }
            SalesOrderEvent::SalesOrderCancelled(_) => {
                self.status = SalesOrderStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalesOrderCommand::CreateSalesOrder(cmd) => self.handle_create(cmd),
            SalesOrderCommand::ReplaceSalesOrderLines(cmd) => self.handle_replace_lines(cmd),
            SalesOrderCommand::ConfirmSalesOrder(cmd) => self.handle_confirm(cmd),
            SalesOrderCommand::LinkInvoice(cmd) => self.handle_link_invoice(cmd),
            SalesOrderCommand::UnlinkInvoice(cmd) => self.handle_unlink_invoice(cmd),
            SalesOrderCommand::MirrorInvoice(cmd) => self.handle_mirror(cmd),
            SalesOrderCommand::CloseSalesOrder(cmd) => self.handle_close(cmd),
            SalesOrderCommand::CancelSalesOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl SalesOrder {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if let Some(existing) = self.tenant_id {
            if existing != tenant_id {
                return Err(DomainError::invariant("tenant mismatch"));
            }
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: SalesOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self, tenant_id: TenantId, order_id: SalesOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("sales order"));
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_order_id(order_id)
    }

    fn ensure_linked_to(&self, invoice_id: AggregateId) -> Result<(), DomainError> {
        if self.invoice_id != Some(invoice_id) {
            return Err(DomainError::invariant(format!(
                "sales order is not linked to invoice {invoice_id}"
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateSalesOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sales order already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("order number cannot be empty"));
        }
        let totals = price_document(&cmd.lines, &cmd.settings)?;

        Ok(vec![SalesOrderEvent::SalesOrderCreated(SalesOrderCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            number: cmd.number.trim().to_string(),
            customer_id: cmd.customer_id,
            order_date: cmd.order_date,
            lines: cmd.lines.clone(),
            settings: cmd.settings.clone(),
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_replace_lines(
        &self,
        cmd: &ReplaceSalesOrderLines,
    ) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        if !self.is_modifiable() {
            return Err(DomainError::invariant(
                "cannot modify order once it is invoiced, closed or cancelled",
            ));
        }
        let totals = price_document(&cmd.lines, &cmd.settings)?;
        if cmd.lines == self.lines && cmd.settings == self.settings {
            return Ok(vec![]);
        }

        Ok(vec![SalesOrderEvent::SalesOrderLinesReplaced(
            SalesOrderLinesReplaced {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                lines: cmd.lines.clone(),
                settings: cmd.settings.clone(),
                totals,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_confirm(&self, cmd: &ConfirmSalesOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        if self.status != SalesOrderStatus::Draft {
            return Err(DomainError::invariant("only draft orders can be confirmed"));
        }

        Ok(vec![SalesOrderEvent::SalesOrderConfirmed(SalesOrderConfirmed {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_link_invoice(&self, cmd: &LinkInvoice) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        if let Some(existing) = self.invoice_id {
            if existing == cmd.invoice_id {
                return Ok(vec![]);
            }
            return Err(DomainError::conflict(format!(
                "sales order already converted to invoice {existing}"
            )));
        }
        if self.status != SalesOrderStatus::Confirmed {
            return Err(DomainError::invariant(
                "cannot invoice order that is not confirmed",
            ));
        }

        Ok(vec![SalesOrderEvent::SalesOrderInvoiceLinked(
            SalesOrderInvoiceLinked {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                invoice_id: cmd.invoice_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_unlink_invoice(
        &self,
        cmd: &UnlinkInvoice,
    ) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        self.ensure_linked_to(cmd.invoice_id)?;
        if self.status != SalesOrderStatus::Invoiced {
            return Err(DomainError::invariant("only invoiced orders can be unlinked"));
        }

        Ok(vec![SalesOrderEvent::SalesOrderInvoiceUnlinked(
            SalesOrderInvoiceUnlinked {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                invoice_id: cmd.invoice_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_mirror(&self, cmd: &MirrorInvoice) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        self.ensure_linked_to(cmd.invoice_id)?;
        if cmd.lines == self.lines && cmd.settings == self.settings {
            return Ok(vec![]);
        }
        let totals = price_document(&cmd.lines, &cmd.settings)?;

        Ok(vec![SalesOrderEvent::SalesOrderMirrored(SalesOrderMirrored {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            invoice_id: cmd.invoice_id,
            lines: cmd.lines.clone(),
            settings: cmd.settings.clone(),
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseSalesOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        match self.status {
            SalesOrderStatus::Invoiced => {}
            SalesOrderStatus::Closed => return Ok(vec![]),
            _ => {
                return Err(DomainError::invariant("only invoiced orders can be closed"));
            }
        }

        Ok(vec![SalesOrderEvent::SalesOrderClosed(SalesOrderClosed {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelSalesOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        match self.status {
            SalesOrderStatus::Draft | SalesOrderStatus::Confirmed => {}
            SalesOrderStatus::Cancelled => return Ok(vec![]),
            SalesOrderStatus::Invoiced | SalesOrderStatus::Closed => {
                return Err(DomainError::invariant(
                    "cannot cancel an order once it is invoiced",
                ));
            }
        }

        Ok(vec![SalesOrderEvent::SalesOrderCancelled(SalesOrderCancelled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
