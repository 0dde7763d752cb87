//! Financial posting.
//!
//! `rules` turns a priced document into a `PostingPlan` (journal lines keyed by
//! posting role, plus stock movements). `record` remembers what was posted for
//! each source document so an edit can reverse it. `reconcile` derives payment
//! and return status and splits refunds into applied and excess parts.

pub mod reconcile;
pub mod record;
pub mod rules;

pub use reconcile::{
    Payment, PaymentStatus, RefundSplit, ReturnLineShare, ReturnStatus, ensure_within_balance,
    payment_status, return_shares, return_status, split_refund,
};
pub use record::{
    ActivePosting, ClearPosting, PostedMovement, PostingCleared, PostingRecord, PostingRecordCommand,
    PostingRecordEvent, PostingRecordId, PostingRecorded, RecordPosting,
};
pub use rules::{
    ItemPolicy, JournalDraft, JournalLineDraft, MovementDraft, PostingPlan, plan_bill,
    plan_bill_payment, plan_credit_application, plan_invoice, plan_invoice_payment,
    plan_purchase_return, plan_sales_return,
};
