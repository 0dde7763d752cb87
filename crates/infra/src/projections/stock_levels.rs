use serde::Serialize;
use serde_json::Value as JsonValue;

use ledgerdesk_core::TenantId;
use ledgerdesk_events::EventEnvelope;
use ledgerdesk_inventory::{InventoryEvent, StockItemId, WarehouseId};
use ledgerdesk_products::ProductId;

use super::ProjectionError;
use super::cursor::StreamCursors;
use crate::lifecycle::streams::STOCK_ITEM;
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// On-hand quantity for one product in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub on_hand: i64,
    pub movements: u64,
}

#[derive(Debug)]
pub struct StockLevelsProjection<S = InMemoryTenantStore<StockItemId, StockLevel>>
where
    S: TenantStore<StockItemId, StockLevel>,
{
    store: S,
    cursors: StreamCursors,
}

impl StockLevelsProjection {
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> StockLevelsProjection<S>
where
    S: TenantStore<StockItemId, StockLevel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, id: StockItemId) -> Option<StockLevel> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<StockLevel> {
        let mut all = self.store.list(tenant_id);
        all.sort_by_key(|l| (*l.product_id.0.as_uuid(), *l.warehouse_id.0.as_uuid()));
        all
    }

    pub fn for_product(&self, tenant_id: TenantId, product_id: ProductId) -> Vec<StockLevel> {
        self.list(tenant_id)
            .into_iter()
            .filter(|l| l.product_id == product_id)
            .collect()
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != STOCK_ITEM {
            return Ok(());
        }
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if !self.cursors.should_apply(tenant_id, aggregate_id, seq)? {
            return Ok(());
        }

        let ev: InventoryEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
        let (event_tenant, stock_item_id, product_id, warehouse_id) = match &ev {
            InventoryEvent::MovementRecorded(e) => {
                (e.tenant_id, e.stock_item_id, e.product_id, e.warehouse_id)
            }
            InventoryEvent::MovementReversed(e) => {
                (e.tenant_id, e.stock_item_id, e.product_id, e.warehouse_id)
            }
        };
        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        let movements = self
            .store
            .get(tenant_id, &stock_item_id)
            .map(|l| l.movements)
            .unwrap_or(0);
        self.store.upsert(
            tenant_id,
            stock_item_id,
            StockLevel {
                stock_item_id,
                product_id,
                warehouse_id,
                on_hand: ev.on_hand_after(),
                movements: movements + 1,
            },
        );

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }
}
