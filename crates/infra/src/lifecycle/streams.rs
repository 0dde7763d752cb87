//! Stream names and rehydration for every aggregate the coordinators touch.

use serde::Serialize;
use serde::de::DeserializeOwned;

use ledgerdesk_accounting::{ChartId, ChartOfAccounts, Ledger, LedgerId};
use ledgerdesk_core::{Aggregate, AggregateId, DomainError};
use ledgerdesk_events::Event;
use ledgerdesk_inventory::{StockItem, StockItemId};
use ledgerdesk_invoicing::{Invoice, InvoiceId, SalesReturn, SalesReturnId};
use ledgerdesk_parties::{Company, CompanyId, CreditNote, CreditNoteId, Party, PartyId};
use ledgerdesk_posting::{PostingRecord, PostingRecordId};
use ledgerdesk_products::{Product, ProductId};
use ledgerdesk_purchasing::{
    Bill, BillId, PurchaseOrder, PurchaseOrderId, PurchaseReturn, PurchaseReturnId,
};
use ledgerdesk_sales::{SalesOrder, SalesOrderId};

pub const PRODUCT: &str = "products.product";
pub const PARTY: &str = "parties.party";
pub const COMPANY: &str = "parties.company";
pub const CREDIT_NOTE: &str = "parties.credit_note";
pub const CHART: &str = "accounting.chart";
pub const LEDGER: &str = "accounting.ledger";
pub const STOCK_ITEM: &str = "inventory.stock";
pub const SALES_ORDER: &str = "sales.sales_order";
pub const INVOICE: &str = "invoicing.invoice";
pub const SALES_RETURN: &str = "invoicing.sales_return";
pub const PURCHASE_ORDER: &str = "purchasing.purchase_order";
pub const BILL: &str = "purchasing.bill";
pub const PURCHASE_RETURN: &str = "purchasing.purchase_return";
pub const POSTING_RECORD: &str = "posting.record";

/// An aggregate stored as one event stream per id.
pub trait Stream:
    Aggregate<Error = DomainError, Event: Event + Serialize + DeserializeOwned> + Sized
{
    const AGGREGATE_TYPE: &'static str;

    /// The not-yet-created instance history is folded into.
    fn empty_for(id: AggregateId) -> Self;
}

macro_rules! stream {
    ($agg:ty, $id:ident, $name:expr) => {
        impl Stream for $agg {
            const AGGREGATE_TYPE: &'static str = $name;

            fn empty_for(id: AggregateId) -> Self {
                <$agg>::empty($id(id))
            }
        }
    };
}

stream!(Product, ProductId, PRODUCT);
stream!(Party, PartyId, PARTY);
stream!(Company, CompanyId, COMPANY);
stream!(CreditNote, CreditNoteId, CREDIT_NOTE);
stream!(ChartOfAccounts, ChartId, CHART);
stream!(Ledger, LedgerId, LEDGER);
stream!(StockItem, StockItemId, STOCK_ITEM);
stream!(SalesOrder, SalesOrderId, SALES_ORDER);
stream!(Invoice, InvoiceId, INVOICE);
stream!(SalesReturn, SalesReturnId, SALES_RETURN);
stream!(PurchaseOrder, PurchaseOrderId, PURCHASE_ORDER);
stream!(Bill, BillId, BILL);
stream!(PurchaseReturn, PurchaseReturnId, PURCHASE_RETURN);
stream!(PostingRecord, PostingRecordId, POSTING_RECORD);
