//! Sales Orders domain module (event-sourced).
//!
//! This crate contains business rules for sales orders, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Totals come from
//! `ledgerdesk-pricing`; an order converted to an invoice mirrors that invoice.

pub mod order;

pub use order::{
    CancelSalesOrder, CloseSalesOrder, ConfirmSalesOrder, CreateSalesOrder, LinkInvoice,
    MirrorInvoice, ReplaceSalesOrderLines, SalesOrder, SalesOrderCancelled, SalesOrderClosed,
    SalesOrderCommand, SalesOrderConfirmed, SalesOrderCreated, SalesOrderEvent, SalesOrderId,
    SalesOrderInvoiceLinked, SalesOrderInvoiceUnlinked, SalesOrderLinesReplaced,
    SalesOrderMirrored, SalesOrderStatus, UnlinkInvoice,
};
