use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ledgerdesk_events::Event;
use ledgerdesk_inventory::WarehouseId;
use ledgerdesk_parties::PartyId;
use ledgerdesk_pricing::{DocumentLine, DocumentTotals, PricingSettings, price_document};

use crate::bill::BillId;

/// Purchase order identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Approved,
    PartiallyBilled,
    Billed,
    Closed,
    Cancelled,
}

/// Quantity billed against one purchase order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilledQuantity {
    pub line_id: Uuid,
    pub quantity: i64,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: Option<TenantId>,
    number: String,
    supplier_id: Option<PartyId>,
    warehouse_id: Option<WarehouseId>,
    order_date: Option<NaiveDate>,
    status: PurchaseOrderStatus,
    lines: Vec<DocumentLine>,
    settings: PricingSettings,
    totals: DocumentTotals,
    /// Per bill, what it bills against each line. Totals are derived.
    billed: HashMap<BillId, HashMap<Uuid, i64>>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            supplier_id: None,
            warehouse_id: None,
            order_date: None,
            status: PurchaseOrderStatus::Draft,
            lines: Vec::new(),
            settings: PricingSettings::default(),
            totals: DocumentTotals::default(),
            billed: HashMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
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

    /// Where goods on this order are received.
    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn status(&self) -> PurchaseOrderStatus {
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

    /// Billed across every bill still counted against the order.
    pub fn billed_quantity(&self, line_id: Uuid) -> i64 {
        self.billed
            .values()
            .filter_map(|lines| lines.get(&line_id))
            .sum()
    }

    /// What one bill has recorded against a line.
    pub fn billed_by(&self, bill_id: BillId, line_id: Uuid) -> i64 {
        self.billed
            .get(&bill_id)
            .and_then(|lines| lines.get(&line_id))
            .copied()
            .unwrap_or(0)
    }

    /// Ordered minus billed; `None` when the line does not exist.
    pub fn remaining_quantity(&self, line_id: Uuid) -> Option<i64> {
        self.lines
            .iter()
            .find(|l| l.line_id == line_id)
            .map(|l| l.quantity - self.billed_quantity(line_id))
    }

    /// Bills may be raised against approved, not yet closed orders.
    pub fn is_billable(&self) -> bool {
        matches!(
            self.status,
            PurchaseOrderStatus::Approved
                | PurchaseOrderStatus::PartiallyBilled
                | PurchaseOrderStatus::Billed
        )
    }

    /// Line totals once `bill_id` bills exactly `quantities`.
    fn totals_with(&self, bill_id: BillId, quantities: &HashMap<Uuid, i64>) -> HashMap<Uuid, i64> {
        let mut totals: HashMap<Uuid, i64> = HashMap::new();
        let others = self
            .billed
            .iter()
            .filter(|(id, _)| **id != bill_id)
            .map(|(_, lines)| lines);
        for lines in others.chain(std::iter::once(quantities)) {
            for (line_id, quantity) in lines {
                *totals.entry(*line_id).or_insert(0) += quantity;
            }
        }
        totals
    }

    fn billed_status(&self, billed: &HashMap<Uuid, i64>) -> PurchaseOrderStatus {
        let quantity = |id: &Uuid| billed.get(id).copied().unwrap_or(0);
        if self.lines.iter().all(|l| quantity(&l.line_id) == 0) {
            PurchaseOrderStatus::Approved
        } else if self.lines.iter().all(|l| quantity(&l.line_id) >= l.quantity) {
            PurchaseOrderStatus::Billed
        } else {
            PurchaseOrderStatus::PartiallyBilled
        }
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub number: String,
    pub supplier_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub order_date: NaiveDate,
    pub lines: Vec<DocumentLine>,
    #[serde(default)]
    pub settings: PricingSettings,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReplacePurchaseOrderLines (draft orders only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacePurchaseOrderLines {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub lines: Vec<DocumentLine>,
    pub settings: PricingSettings,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApprovePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SyncBilledQuantities.
///
/// `billed` is what `bill_id` bills against each PO line right now. It
/// replaces whatever that bill recorded before and leaves other bills alone;
/// an empty list releases the bill. Replaying the same command is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBilledQuantities {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub bill_id: BillId,
    pub billed: Vec<BilledQuantity>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ClosePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelPurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Commands for the PurchaseOrder aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    ReplacePurchaseOrderLines(ReplacePurchaseOrderLines),
    ApprovePurchaseOrder(ApprovePurchaseOrder),
    SyncBilledQuantities(SyncBilledQuantities),
    ClosePurchaseOrder(ClosePurchaseOrder),
    CancelPurchaseOrder(CancelPurchaseOrder),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub number: String,
    pub supplier_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub order_date: NaiveDate,
    pub lines: Vec<DocumentLine>,
    pub settings: PricingSettings,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderLinesReplaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLinesReplaced {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub lines: Vec<DocumentLine>,
    pub settings: PricingSettings,
    pub totals: DocumentTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderApproved {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BilledQuantitiesSynced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilledQuantitiesSynced {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub bill_id: BillId,
    /// The bill's own quantities, not order totals.
    pub billed: Vec<BilledQuantity>,
    pub status: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderClosed {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCancelled {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Events for the PurchaseOrder aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    PurchaseOrderLinesReplaced(PurchaseOrderLinesReplaced),
    PurchaseOrderApproved(PurchaseOrderApproved),
    BilledQuantitiesSynced(BilledQuantitiesSynced),
    PurchaseOrderClosed(PurchaseOrderClosed),
    PurchaseOrderCancelled(PurchaseOrderCancelled),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.purchase_order.created",
            PurchaseOrderEvent::PurchaseOrderLinesReplaced(_) => {
                "purchasing.purchase_order.lines_replaced"
            }
            PurchaseOrderEvent::PurchaseOrderApproved(_) => "purchasing.purchase_order.approved",
            PurchaseOrderEvent::BilledQuantitiesSynced(_) => {
                "purchasing.purchase_order.billed_quantities_synced"
            }
            PurchaseOrderEvent::PurchaseOrderClosed(_) => "purchasing.purchase_order.closed",
            PurchaseOrderEvent::PurchaseOrderCancelled(_) => "purchasing.purchase_order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderLinesReplaced(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderApproved(e) => e.occurred_at,
            PurchaseOrderEvent::BilledQuantitiesSynced(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderClosed(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.supplier_id = Some(e.supplier_id);
                self.warehouse_id = Some(e.warehouse_id);
                self.order_date = Some(e.order_date);
                self.status = PurchaseOrderStatus::Draft;
                self.lines = e.lines.clone();
                self.settings = e.settings.clone();
                self.totals = e.totals.clone();
                self.created = true;
            }
            PurchaseOrderEvent::PurchaseOrderLinesReplaced(e) => {
                self.lines = e.lines.clone();
                self.settings = e.settings.clone();
                self.totals = e.totals.clone();
            }
            PurchaseOrderEvent::PurchaseOrderApproved(_) => {
                self.status = PurchaseOrderStatus::Approved;
            }
            PurchaseOrderEvent::BilledQuantitiesSynced(e) => {
                if e.billed.is_empty() {
                    self.billed.remove(&e.bill_id);
                } else {
                    let lines = e.billed.iter().map(|b| (b.line_id, b.quantity)).collect();
                    self.billed.insert(e.bill_id, lines);
                }
                self.status = e.status;
            }
            PurchaseOrderEvent::PurchaseOrderClosed(_) => {
                self.status = PurchaseOrderStatus::Closed;
            }
            PurchaseOrderEvent::PurchaseOrderCancelled(_) => {
                self.status = PurchaseOrderStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::ReplacePurchaseOrderLines(cmd) => self.handle_replace_lines(cmd),
            PurchaseOrderCommand::ApprovePurchaseOrder(cmd) => self.handle_approve(cmd),
            PurchaseOrderCommand::SyncBilledQuantities(cmd) => self.handle_sync_billed(cmd),
            PurchaseOrderCommand::ClosePurchaseOrder(cmd) => self.handle_close(cmd),
            PurchaseOrderCommand::CancelPurchaseOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if let Some(existing) = self.tenant_id {
            if existing != tenant_id {
                return Err(DomainError::invariant("tenant mismatch"));
            }
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("purchase order"));
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_order_id(order_id)
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("order number cannot be empty"));
        }
        let totals = price_document(&cmd.lines, &cmd.settings)?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                number: cmd.number.trim().to_string(),
                supplier_id: cmd.supplier_id,
                warehouse_id: cmd.warehouse_id,
                order_date: cmd.order_date,
                lines: cmd.lines.clone(),
                settings: cmd.settings.clone(),
                totals,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_replace_lines(
        &self,
        cmd: &ReplacePurchaseOrderLines,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invariant(
                "cannot modify purchase order once approved",
            ));
        }
        let totals = price_document(&cmd.lines, &cmd.settings)?;
        if cmd.lines == self.lines && cmd.settings == self.settings {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderLinesReplaced(
            PurchaseOrderLinesReplaced {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                lines: cmd.lines.clone(),
                settings: cmd.settings.clone(),
                totals,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_approve(
        &self,
        cmd: &ApprovePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invariant(
                "only draft purchase orders can be approved",
            ));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot approve purchase order without lines",
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderApproved(
            PurchaseOrderApproved {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_sync_billed(
        &self,
        cmd: &SyncBilledQuantities,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;

        let mut billed = HashMap::with_capacity(cmd.billed.len());
        for b in &cmd.billed {
            if !self.lines.iter().any(|l| l.line_id == b.line_id) {
                return Err(DomainError::not_found(format!(
                    "purchase order line {}",
                    b.line_id
                )));
            }
            if b.quantity < 0 {
                return Err(DomainError::validation("billed quantity cannot be negative"));
            }
            if billed.insert(b.line_id, b.quantity).is_some() {
                return Err(DomainError::validation(format!(
                    "line {} listed twice",
                    b.line_id
                )));
            }
        }
        billed.retain(|_, q| *q > 0);

        let unchanged = match self.billed.get(&cmd.bill_id) {
            Some(previous) => *previous == billed,
            None => billed.is_empty(),
        };
        if unchanged {
            return Ok(vec![]);
        }
        if !self.is_billable() {
            return Err(DomainError::invariant(format!(
                "purchase order is {:?} and cannot be billed",
                self.status
            )));
        }

        let totals = self.totals_with(cmd.bill_id, &billed);
        for line in &self.lines {
            let total = totals.get(&line.line_id).copied().unwrap_or(0);
            if total > line.quantity {
                return Err(DomainError::invariant(format!(
                    "billed {} exceeds ordered {} on line {}",
                    total, line.quantity, line.line_id
                )));
            }
        }

        let status = self.billed_status(&totals);

        let mut listed: Vec<BilledQuantity> = billed
            .iter()
            .map(|(line_id, quantity)| BilledQuantity {
                line_id: *line_id,
                quantity: *quantity,
            })
            .collect();
        listed.sort_by_key(|b| b.line_id);

        Ok(vec![PurchaseOrderEvent::BilledQuantitiesSynced(
            BilledQuantitiesSynced {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                bill_id: cmd.bill_id,
                billed: listed,
                status,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_close(
        &self,
        cmd: &ClosePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        match self.status {
            PurchaseOrderStatus::Closed => return Ok(vec![]),
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::Cancelled => {
                return Err(DomainError::invariant(
                    "only approved purchase orders can be closed",
                ));
            }
            _ => {}
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderClosed(
            PurchaseOrderClosed {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_cancel(
        &self,
        cmd: &CancelPurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        match self.status {
            PurchaseOrderStatus::Cancelled => return Ok(vec![]),
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::Approved => {}
            _ => {
                return Err(DomainError::invariant(
                    "cannot cancel a purchase order that has been billed or closed",
                ));
            }
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCancelled(
            PurchaseOrderCancelled {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
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

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn line(quantity: i64) -> DocumentLine {
        DocumentLine {
            line_id: Uuid::now_v7(),
            product_id: ProductId::new(AggregateId::new()),
            description: String::new(),
            quantity,
            unit_price: 250,
            discount: Discount::None,
            tax_rate_bp: 0,
        }
    }

    fn approved(tenant_id: TenantId, lines: Vec<DocumentLine>) -> PurchaseOrder {
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let mut order = PurchaseOrder::empty(order_id);
        execute(
            &mut order,
            &PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                tenant_id,
                order_id,
                number: "PO-1".into(),
                supplier_id: PartyId::new(AggregateId::new()),
                warehouse_id: WarehouseId::main(tenant_id),
                order_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                lines,
                settings: PricingSettings::default(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        execute(
            &mut order,
            &PurchaseOrderCommand::ApprovePurchaseOrder(ApprovePurchaseOrder {
                tenant_id,
                order_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        order
    }

    fn sync(
        order: &mut PurchaseOrder,
        tenant_id: TenantId,
        bill_id: BillId,
        billed: Vec<BilledQuantity>,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        let order_id = order.id_typed();
        execute(
            order,
            &PurchaseOrderCommand::SyncBilledQuantities(SyncBilledQuantities {
                tenant_id,
                order_id,
                bill_id,
                billed,
                occurred_at: test_time(),
            }),
        )
    }

    fn bill() -> BillId {
        BillId(AggregateId::new())
    }

    #[test]
    fn billed_quantities_drive_status() {
        let tenant_id = test_tenant_id();
        let (a, b) = (line(10), line(4));
        let (a_id, b_id) = (a.line_id, b.line_id);
        let mut order = approved(tenant_id, vec![a, b]);
        assert_eq!(order.totals().total, 3_500);
        let first = bill();

        sync(&mut order, tenant_id, first, vec![BilledQuantity { line_id: a_id, quantity: 6 }]).unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::PartiallyBilled);
        assert_eq!(order.remaining_quantity(a_id), Some(4));

        sync(
            &mut order,
            tenant_id,
            first,
            vec![
                BilledQuantity { line_id: a_id, quantity: 10 },
                BilledQuantity { line_id: b_id, quantity: 4 },
            ],
        )
        .unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Billed);

        // A voided bill brings quantities back down.
        sync(&mut order, tenant_id, first, vec![]).unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Approved);
        assert_eq!(order.remaining_quantity(b_id), Some(4));
    }

    #[test]
    fn each_bill_only_replaces_its_own_quantities() {
        let tenant_id = test_tenant_id();
        let a = line(10);
        let a_id = a.line_id;
        let mut order = approved(tenant_id, vec![a]);
        let (first, second) = (bill(), bill());

        sync(&mut order, tenant_id, first, vec![BilledQuantity { line_id: a_id, quantity: 4 }]).unwrap();
        sync(&mut order, tenant_id, second, vec![BilledQuantity { line_id: a_id, quantity: 3 }]).unwrap();
        assert_eq!(order.billed_quantity(a_id), 7);
        assert_eq!(order.billed_by(first, a_id), 4);

        // Editing the first bill leaves the second one's units counted.
        sync(&mut order, tenant_id, first, vec![BilledQuantity { line_id: a_id, quantity: 6 }]).unwrap();
        assert_eq!(order.billed_quantity(a_id), 9);

        let err = sync(&mut order, tenant_id, second, vec![BilledQuantity { line_id: a_id, quantity: 5 }])
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(order.billed_quantity(a_id), 9);

        sync(&mut order, tenant_id, first, vec![]).unwrap();
        assert_eq!(order.billed_quantity(a_id), 3);
        assert_eq!(order.billed_by(first, a_id), 0);
        assert_eq!(order.status(), PurchaseOrderStatus::PartiallyBilled);
    }

    #[test]
    fn releasing_an_unknown_bill_is_a_noop() {
        let tenant_id = test_tenant_id();
        let mut order = approved(tenant_id, vec![line(2)]);
        assert!(sync(&mut order, tenant_id, bill(), vec![]).unwrap().is_empty());
    }

    #[test]
    fn cannot_bill_beyond_ordered_quantity() {
        let tenant_id = test_tenant_id();
        let a = line(3);
        let a_id = a.line_id;
        let mut order = approved(tenant_id, vec![a]);
        let err = sync(&mut order, tenant_id, bill(), vec![BilledQuantity { line_id: a_id, quantity: 4 }])
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn approved_order_lines_are_frozen() {
        let tenant_id = test_tenant_id();
        let order = approved(tenant_id, vec![line(1)]);
        let err = order
            .handle(&PurchaseOrderCommand::ReplacePurchaseOrderLines(
                ReplacePurchaseOrderLines {
                    tenant_id,
                    order_id: order.id_typed(),
                    lines: vec![line(2)],
                    settings: PricingSettings::default(),
                    occurred_at: test_time(),
                },
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn billed_order_cannot_be_cancelled() {
        let tenant_id = test_tenant_id();
        let a = line(2);
        let a_id = a.line_id;
        let mut order = approved(tenant_id, vec![a]);
        sync(&mut order, tenant_id, bill(), vec![BilledQuantity { line_id: a_id, quantity: 1 }]).unwrap();

        let err = order
            .handle(&PurchaseOrderCommand::CancelPurchaseOrder(CancelPurchaseOrder {
                tenant_id,
                order_id: order.id_typed(),
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn unchanged_sync_is_a_noop() {
        let tenant_id = test_tenant_id();
        let a = line(2);
        let a_id = a.line_id;
        let mut order = approved(tenant_id, vec![a]);
        let bill_id = bill();
        let billed = vec![BilledQuantity { line_id: a_id, quantity: 1 }];
        sync(&mut order, tenant_id, bill_id, billed.clone()).unwrap();
        let version = order.version();
        assert!(sync(&mut order, tenant_id, bill_id, billed).unwrap().is_empty());
        assert_eq!(order.version(), version);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Billed status agrees with the per-line quantities after any accepted sync.
            #[test]
            fn status_matches_quantities(
                ordered in prop::collection::vec(1i64..20, 1..5),
                billed in prop::collection::vec(0i64..25, 1..5),
            ) {
                let tenant_id = test_tenant_id();
                let lines: Vec<DocumentLine> = ordered.iter().map(|q| line(*q)).collect();
                let ids: Vec<Uuid> = lines.iter().map(|l| l.line_id).collect();
                let mut order = approved(tenant_id, lines);
                let sync_lines: Vec<BilledQuantity> = ids
                    .iter()
                    .zip(billed.iter())
                    .map(|(id, q)| BilledQuantity { line_id: *id, quantity: *q })
                    .collect();
                if sync(&mut order, tenant_id, bill(), sync_lines).is_ok() {
                    let all_full = ids
                        .iter()
                        .all(|id| order.remaining_quantity(*id) == Some(0));
                    let none = ids.iter().all(|id| order.billed_quantity(*id) == 0);
                    let expected = if none {
                        PurchaseOrderStatus::Approved
                    } else if all_full {
                        PurchaseOrderStatus::Billed
                    } else {
                        PurchaseOrderStatus::PartiallyBilled
                    };
                    prop_assert_eq!(order.status(), expected);
                }
            }
        }
    }
}
