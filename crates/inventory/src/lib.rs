//! Inventory domain module (event-sourced).
//!
//! Stock on hand per (product, warehouse), changed only by recorded movements.
//! A movement is never edited or deleted; it is reversed by an opposite one.

pub mod stock;

pub use stock::{
    InventoryCommand, InventoryEvent, MovementKind, MovementRecorded, MovementReversed,
    RecordMovement, ReverseMovement, StockItem, StockItemId, StockMovement, WarehouseId,
};
