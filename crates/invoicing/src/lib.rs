//! Invoicing domain module (event-sourced).
//!
//! Customer invoices with payment and return tracking, and the sales returns
//! raised against them. Pure domain logic (no IO, no HTTP, no storage).

pub mod invoice;
pub mod sales_return;

pub use invoice::{
    ApplyCredit, ApplySalesReturn, CreateInvoice, CreditApplied, Invoice, InvoiceCommand,
    InvoiceCreated, InvoiceEvent, InvoiceId, InvoiceIssued, InvoiceStatus, InvoiceUpdated,
    InvoiceVoided, IssueInvoice, PaymentRegistered, RegisterPayment, ReturnedQuantity,
    SalesReturnApplied, UpdateInvoice, VoidInvoice,
};
pub use sales_return::{
    CancelSalesReturn, CompleteSalesReturn, CreateSalesReturn, SalesReturn, SalesReturnCancelled,
    SalesReturnCommand, SalesReturnCompleted, SalesReturnCreated, SalesReturnEvent, SalesReturnId,
    SalesReturnStatus,
};
pub use ledgerdesk_posting::Payment;
