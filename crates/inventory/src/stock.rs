use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerdesk_accounting::SourceDocument;
use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, Amount, DomainError, TenantId};
use ledgerdesk_events::Event;
use ledgerdesk_products::ProductId;

/// Warehouse identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseId(pub AggregateId);

impl WarehouseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// The tenant's default warehouse, used when a document names none.
    pub fn main(tenant_id: TenantId) -> Self {
        Self(AggregateId::derived(tenant_id, "inventory.warehouse", "main"))
    }
}

impl core::fmt::Display for WarehouseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Stock item identifier: one stream per (product, warehouse).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockItemId(pub AggregateId);

impl StockItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn for_product(tenant_id: TenantId, product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        let key = format!("{product_id}/{warehouse_id}");
        Self(AggregateId::derived(tenant_id, "inventory.stock_item", &key))
    }
}

impl core::fmt::Display for StockItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    PurchaseReceipt,
    Sale,
    SalesReturn,
    PurchaseReturn,
    Adjustment,
}

impl MovementKind {
    /// Required sign of the quantity: `Some(true)` inbound, `Some(false)` outbound,
    /// `None` either.
    fn inbound(self) -> Option<bool> {
        match self {
            MovementKind::PurchaseReceipt | MovementKind::SalesReturn => Some(true),
            MovementKind::Sale | MovementKind::PurchaseReturn => Some(false),
            MovementKind::Adjustment => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::PurchaseReceipt => "purchase_receipt",
            MovementKind::Sale => "sale",
            MovementKind::SalesReturn => "sales_return",
            MovementKind::PurchaseReturn => "purchase_return",
            MovementKind::Adjustment => "adjustment",
        }
    }
}

/// One inventory transaction. `quantity` is signed: positive adds stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub movement_id: Uuid,
    pub kind: MovementKind,
    pub quantity: i64,
    /// Cost per unit in minor units (tax-exclusive).
    pub unit_cost: Amount,
    pub source: Option<SourceDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MovementState {
    quantity: i64,
    reversed: bool,
    is_reversal: bool,
}

/// Aggregate root: StockItem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockItem {
    id: StockItemId,
    tenant_id: Option<TenantId>,
    product_id: Option<ProductId>,
    warehouse_id: Option<WarehouseId>,
    on_hand: i64,
    movements: HashMap<Uuid, MovementState>,
    version: u64,
    created: bool,
}

impl StockItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockItemId) -> Self {
        Self {
            id,
            tenant_id: None,
            product_id: None,
            warehouse_id: None,
            on_hand: 0,
            movements: HashMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockItemId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn has_movement(&self, movement_id: Uuid) -> bool {
        self.movements.contains_key(&movement_id)
    }

    pub fn is_reversed(&self, movement_id: Uuid) -> bool {
        self.movements
            .get(&movement_id)
            .map(|m| m.reversed)
            .unwrap_or(false)
    }

    /// Fail unless at least `required` units are on hand.
    pub fn check_availability(&self, required: i64) -> Result<(), DomainError> {
        if required > self.on_hand {
            return Err(DomainError::validation(format!(
                "insufficient stock: {} on hand, {} required",
                self.on_hand, required
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for StockItem {
    type Id = StockItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub tenant_id: TenantId,
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub movement: StockMovement,
    /// Permit on-hand to drop below zero (used for re-posting legs of an edit).
    pub allow_negative: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReverseMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseMovement {
    pub tenant_id: TenantId,
    pub stock_item_id: StockItemId,
    pub movement_id: Uuid,
    pub reversal_movement_id: Uuid,
    pub allow_negative: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    RecordMovement(RecordMovement),
    ReverseMovement(ReverseMovement),
}

/// Event: MovementRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub tenant_id: TenantId,
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub movement: StockMovement,
    pub on_hand_after: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovementReversed. `quantity` is the negated original quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReversed {
    pub tenant_id: TenantId,
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub original_movement_id: Uuid,
    pub reversal_movement_id: Uuid,
    pub quantity: i64,
    pub on_hand_after: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    MovementRecorded(MovementRecorded),
    MovementReversed(MovementReversed),
}

impl InventoryEvent {
    pub fn on_hand_after(&self) -> i64 {
        match self {
            InventoryEvent::MovementRecorded(e) => e.on_hand_after,
            InventoryEvent::MovementReversed(e) => e.on_hand_after,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::MovementRecorded(_) => "inventory.stock.movement_recorded",
            InventoryEvent::MovementReversed(_) => "inventory.stock.movement_reversed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::MovementRecorded(e) => e.occurred_at,
            InventoryEvent::MovementReversed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::MovementRecorded(e) => {
                if !self.created {
                    self.id = e.stock_item_id;
                    self.tenant_id = Some(e.tenant_id);
                    self.product_id = Some(e.product_id);
                    self.warehouse_id = Some(e.warehouse_id);
                    self.created = true;
                }
                self.movements.insert(
                    e.movement.movement_id,
                    MovementState {
                        quantity: e.movement.quantity,
                        reversed: false,
                        is_reversal: false,
                    },
                );
                self.on_hand = e.on_hand_after;
            }
            InventoryEvent::MovementReversed(e) => {
                if let Some(original) = self.movements.get_mut(&e.original_movement_id) {
                    original.reversed = true;
                }
                self.movements.insert(
                    e.reversal_movement_id,
                    MovementState {
                        quantity: e.quantity,
                        reversed: false,
                        is_reversal: true,
                    },
                );
                self.on_hand = e.on_hand_after;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::RecordMovement(cmd) => self.handle_record(cmd),
            InventoryCommand::ReverseMovement(cmd) => self.handle_reverse(cmd),
        }
    }
}

impl StockItem {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_stock_item_id(&self, stock_item_id: StockItemId) -> Result<(), DomainError> {
        if self.id != stock_item_id {
            return Err(DomainError::invariant("stock_item_id mismatch"));
        }
        Ok(())
    }

    fn next_on_hand(&self, delta: i64, allow_negative: bool) -> Result<i64, DomainError> {
        let next = self
            .on_hand
            .checked_add(delta)
            .ok_or_else(|| DomainError::overflow("stock quantity"))?;
        if next < 0 && !allow_negative {
            return Err(DomainError::invariant(format!(
                "insufficient stock: {} on hand, {} required",
                self.on_hand, -delta
            )));
        }
        Ok(next)
    }

    fn handle_record(&self, cmd: &RecordMovement) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_stock_item_id(cmd.stock_item_id)?;
        if self.created
            && (self.product_id != Some(cmd.product_id) || self.warehouse_id != Some(cmd.warehouse_id))
        {
            return Err(DomainError::invariant("product or warehouse mismatch"));
        }

        let movement = &cmd.movement;
        if movement.quantity == 0 {
            return Err(DomainError::validation("movement quantity cannot be zero"));
        }
        if movement.unit_cost < 0 {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }
        match movement.kind.inbound() {
            Some(true) if movement.quantity < 0 => {
                return Err(DomainError::validation(format!(
                    "{} quantity must be positive",
                    movement.kind.as_str()
                )));
            }
            Some(false) if movement.quantity > 0 => {
                return Err(DomainError::validation(format!(
                    "{} quantity must be negative",
                    movement.kind.as_str()
                )));
            }
            _ => {}
        }
        if self.movements.contains_key(&movement.movement_id) {
            return Err(DomainError::conflict(format!(
                "movement {} already recorded",
                movement.movement_id
            )));
        }

        let on_hand_after = self.next_on_hand(movement.quantity, cmd.allow_negative)?;

        Ok(vec![InventoryEvent::MovementRecorded(MovementRecorded {
            tenant_id: cmd.tenant_id,
            stock_item_id: cmd.stock_item_id,
            product_id: cmd.product_id,
            warehouse_id: cmd.warehouse_id,
            movement: movement.clone(),
            on_hand_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(&self, cmd: &ReverseMovement) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found("stock item"));
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_stock_item_id(cmd.stock_item_id)?;

        let original = self
            .movements
            .get(&cmd.movement_id)
            .ok_or_else(|| DomainError::not_found(format!("stock movement {}", cmd.movement_id)))?;
        if original.is_reversal {
            return Err(DomainError::invariant("cannot reverse a reversal movement"));
        }
        if original.reversed {
            return Err(DomainError::conflict(format!(
                "stock movement {} already reversed",
                cmd.movement_id
            )));
        }
        if self.movements.contains_key(&cmd.reversal_movement_id) {
            return Err(DomainError::conflict("reversal movement id already used"));
        }

        let quantity = -original.quantity;
        let on_hand_after = self.next_on_hand(quantity, cmd.allow_negative)?;

        let (Some(product_id), Some(warehouse_id)) = (self.product_id, self.warehouse_id) else {
            return Err(DomainError::invariant("stock item has no product"));
        };

        Ok(vec![InventoryEvent::MovementReversed(MovementReversed {
            tenant_id: cmd.tenant_id,
            stock_item_id: cmd.stock_item_id,
            product_id,
            warehouse_id,
            original_movement_id: cmd.movement_id,
            reversal_movement_id: cmd.reversal_movement_id,
            quantity,
            on_hand_after,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdesk_accounting::DocumentKind;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    struct Fixture {
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        item: StockItem,
    }

    impl Fixture {
        fn new() -> Self {
            let tenant_id = test_tenant_id();
            let product_id = ProductId::new(AggregateId::new());
            let warehouse_id = WarehouseId::main(tenant_id);
            let item = StockItem::empty(StockItemId::for_product(tenant_id, product_id, warehouse_id));
            Self {
                tenant_id,
                product_id,
                warehouse_id,
                item,
            }
        }

        fn record_cmd(&self, kind: MovementKind, quantity: i64, allow_negative: bool) -> InventoryCommand {
            InventoryCommand::RecordMovement(RecordMovement {
                tenant_id: self.tenant_id,
                stock_item_id: self.item.id_typed(),
                product_id: self.product_id,
                warehouse_id: self.warehouse_id,
                movement: StockMovement {
                    movement_id: Uuid::now_v7(),
                    kind,
                    quantity,
                    unit_cost: 300,
                    source: Some(SourceDocument::new(DocumentKind::Bill, AggregateId::new())),
                },
                allow_negative,
                occurred_at: test_time(),
            })
        }

        fn run(&mut self, cmd: InventoryCommand) -> Result<Vec<InventoryEvent>, DomainError> {
            ledgerdesk_events::execute(&mut self.item, &cmd)
        }

        fn record(&mut self, kind: MovementKind, quantity: i64) -> Uuid {
            let cmd = self.record_cmd(kind, quantity, false);
            let events = self.run(cmd).unwrap();
            match &events[0] {
                InventoryEvent::MovementRecorded(e) => e.movement.movement_id,
                _ => panic!("Expected MovementRecorded"),
            }
        }

        fn reverse_cmd(&self, movement_id: Uuid, allow_negative: bool) -> InventoryCommand {
            InventoryCommand::ReverseMovement(ReverseMovement {
                tenant_id: self.tenant_id,
                stock_item_id: self.item.id_typed(),
                movement_id,
                reversal_movement_id: Uuid::now_v7(),
                allow_negative,
                occurred_at: test_time(),
            })
        }
    }

    #[test]
    fn stock_item_ids_are_stable_per_product_and_warehouse() {
        let tenant_id = test_tenant_id();
        let product_id = ProductId::new(AggregateId::new());
        let main = WarehouseId::main(tenant_id);
        let other = WarehouseId::new(AggregateId::new());

        assert_eq!(
            StockItemId::for_product(tenant_id, product_id, main),
            StockItemId::for_product(tenant_id, product_id, main)
        );
        assert_ne!(
            StockItemId::for_product(tenant_id, product_id, main),
            StockItemId::for_product(tenant_id, product_id, other)
        );
    }

    #[test]
    fn receipts_and_sales_move_on_hand() {
        let mut f = Fixture::new();
        f.record(MovementKind::PurchaseReceipt, 10);
        f.record(MovementKind::Sale, -4);
        assert_eq!(f.item.on_hand(), 6);
        assert_eq!(f.item.version(), 2);
        assert!(f.item.check_availability(6).is_ok());
        assert!(f.item.check_availability(7).is_err());
    }

    #[test]
    fn outbound_movement_cannot_go_negative_unless_allowed() {
        let mut f = Fixture::new();
        f.record(MovementKind::PurchaseReceipt, 2);

        let err = f.run(f.record_cmd(MovementKind::Sale, -3, false)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(ref m) if m.contains("insufficient stock")));
        assert_eq!(f.item.on_hand(), 2);

        f.run(f.record_cmd(MovementKind::Sale, -3, true)).unwrap();
        assert_eq!(f.item.on_hand(), -1);
    }

    #[test]
    fn quantity_sign_must_match_kind() {
        let mut f = Fixture::new();
        assert!(f.run(f.record_cmd(MovementKind::Sale, 3, false)).is_err());
        assert!(f.run(f.record_cmd(MovementKind::PurchaseReceipt, -3, true)).is_err());
        assert!(f.run(f.record_cmd(MovementKind::Adjustment, 0, false)).is_err());
        f.run(f.record_cmd(MovementKind::Adjustment, 5, false)).unwrap();
        f.run(f.record_cmd(MovementKind::Adjustment, -5, false)).unwrap();
        assert_eq!(f.item.on_hand(), 0);
    }

    #[test]
    fn reversal_restores_on_hand_and_cannot_repeat() {
        let mut f = Fixture::new();
        f.record(MovementKind::PurchaseReceipt, 10);
        let sale = f.record(MovementKind::Sale, -4);

        let events = f.run(f.reverse_cmd(sale, false)).unwrap();
        assert_eq!(events[0].on_hand_after(), 10);
        assert!(f.item.is_reversed(sale));

        let err = f.run(f.reverse_cmd(sale, false)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn reversing_a_reversal_is_rejected() {
        let mut f = Fixture::new();
        let receipt = f.record(MovementKind::PurchaseReceipt, 3);
        let events = f.run(f.reverse_cmd(receipt, false)).unwrap();
        let reversal_id = match &events[0] {
            InventoryEvent::MovementReversed(e) => e.reversal_movement_id,
            _ => panic!("Expected MovementReversed"),
        };

        let err = f.run(f.reverse_cmd(reversal_id, false)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn reversing_a_consumed_receipt_needs_allow_negative() {
        let mut f = Fixture::new();
        let receipt = f.record(MovementKind::PurchaseReceipt, 5);
        f.record(MovementKind::Sale, -5);

        assert!(f.run(f.reverse_cmd(receipt, false)).is_err());
        f.run(f.reverse_cmd(receipt, true)).unwrap();
        assert_eq!(f.item.on_hand(), -5);
    }

    #[test]
    fn other_tenant_cannot_touch_stream() {
        let mut f = Fixture::new();
        f.record(MovementKind::PurchaseReceipt, 5);
        let mut cmd = f.record_cmd(MovementKind::Adjustment, 1, false);
        if let InventoryCommand::RecordMovement(c) = &mut cmd {
            c.tenant_id = test_tenant_id();
        }
        let err = f.run(cmd).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Without allow_negative, on-hand never drops below zero.
            #[test]
            fn on_hand_never_negative(deltas in prop::collection::vec(-20i64..20, 1..40)) {
                let mut f = Fixture::new();
                for delta in deltas {
                    if delta == 0 {
                        continue;
                    }
                    let kind = if delta > 0 { MovementKind::PurchaseReceipt } else { MovementKind::Sale };
                    let _ = f.run(f.record_cmd(kind, delta, false));
                    prop_assert!(f.item.on_hand() >= 0);
                }
            }
        }
    }
}
