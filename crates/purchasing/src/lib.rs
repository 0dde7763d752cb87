//! Purchasing domain module (event-sourced).
//!
//! Purchase orders, the supplier bills raised against them, and goods returned
//! to suppliers. Deterministic domain logic (no IO, no HTTP, no storage).

pub mod bill;
pub mod order;
pub mod purchase_return;

pub use bill::{
    ApplyBillCredit, ApplyPurchaseReturn, Bill, BillCommand, BillCreated, BillCreditApplied,
    BillEvent, BillId, BillLine, BillOpened, BillPaymentRegistered, BillStatus, BillUpdated,
    BillVoided, CreateBill, OpenBill, PurchaseReturnApplied, RegisterBillPayment,
    ReturnedQuantity, UpdateBill, VoidBill,
};
pub use order::{
    ApprovePurchaseOrder, BilledQuantitiesSynced, BilledQuantity, CancelPurchaseOrder,
    ClosePurchaseOrder, CreatePurchaseOrder, PurchaseOrder, PurchaseOrderApproved,
    PurchaseOrderCancelled, PurchaseOrderClosed, PurchaseOrderCommand, PurchaseOrderCreated,
    PurchaseOrderEvent, PurchaseOrderId, PurchaseOrderLinesReplaced, PurchaseOrderStatus,
    ReplacePurchaseOrderLines, SyncBilledQuantities,
};
pub use purchase_return::{
    ApprovalDecision, ApprovePurchaseReturn, CancelPurchaseReturn, CompletePurchaseReturn,
    CreatePurchaseReturn, PurchaseReturn, PurchaseReturnApproved, PurchaseReturnCancelled,
    PurchaseReturnCommand, PurchaseReturnCompleted, PurchaseReturnCreated, PurchaseReturnEvent,
    PurchaseReturnId, PurchaseReturnRejected, PurchaseReturnStatus, RejectPurchaseReturn,
};
