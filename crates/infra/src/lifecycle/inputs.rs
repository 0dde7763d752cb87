//! Request shapes accepted by the coordinators.
//!
//! Optional ids are generated when absent; passing them makes a retried
//! request land on the same aggregate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerdesk_core::{Amount, RateBp};
use ledgerdesk_inventory::WarehouseId;
use ledgerdesk_invoicing::{InvoiceId, SalesReturnId};
use ledgerdesk_parties::PartyId;
use ledgerdesk_pricing::{Discount, PricingSettings};
use ledgerdesk_products::{ProductId, ProductPricing};
use ledgerdesk_purchasing::{BillId, PurchaseOrderId, PurchaseReturnId};
use ledgerdesk_sales::SalesOrderId;

fn default_true() -> bool {
    true
}

/// A document line before defaults are filled in. A missing price or tax
/// rate comes from the product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    #[serde(default)]
    pub line_id: Option<Uuid>,
    pub product_id: ProductId,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: Option<Amount>,
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub tax_rate_bp: Option<RateBp>,
}

impl LineInput {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            line_id: None,
            product_id,
            description: None,
            quantity,
            unit_price: None,
            discount: Discount::None,
            tax_rate_bp: None,
        }
    }

    pub fn with_id(mut self, line_id: Uuid) -> Self {
        self.line_id = Some(line_id);
        self
    }

    pub fn priced(mut self, unit_price: Amount, tax_rate_bp: RateBp) -> Self {
        self.unit_price = Some(unit_price);
        self.tax_rate_bp = Some(tax_rate_bp);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillLineInput {
    #[serde(flatten)]
    pub line: LineInput,
    /// Purchase order line this bill line bills against.
    #[serde(default)]
    pub po_line_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub sku: String,
    pub name: String,
    pub pricing: ProductPricing,
    #[serde(default = "default_true")]
    pub track_inventory: bool,
    /// Activate immediately so the product can go on documents.
    #[serde(default = "default_true")]
    pub activate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSalesOrder {
    #[serde(default)]
    pub order_id: Option<SalesOrderId>,
    pub number: String,
    pub customer_id: PartyId,
    pub order_date: NaiveDate,
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub settings: Option<PricingSettings>,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    #[serde(default)]
    pub order_id: Option<PurchaseOrderId>,
    pub number: String,
    pub supplier_id: PartyId,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    pub order_date: NaiveDate,
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub settings: Option<PricingSettings>,
    #[serde(default)]
    pub approve: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertOrderInput {
    #[serde(default)]
    pub invoice_id: Option<InvoiceId>,
    pub number: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub issue: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    #[serde(default)]
    pub invoice_id: Option<InvoiceId>,
    pub number: String,
    pub customer_id: PartyId,
    #[serde(default)]
    pub sales_order_id: Option<SalesOrderId>,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub settings: Option<PricingSettings>,
    /// Issue (and post) straight away.
    #[serde(default)]
    pub issue: bool,
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceChanges {
    #[serde(default)]
    pub customer_id: Option<PartyId>,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub lines: Option<Vec<LineInput>>,
    #[serde(default)]
    pub settings: Option<PricingSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBill {
    #[serde(default)]
    pub bill_id: Option<BillId>,
    pub number: String,
    pub supplier_id: PartyId,
    #[serde(default)]
    pub supplier_reference: Option<String>,
    #[serde(default)]
    pub purchase_order_id: Option<PurchaseOrderId>,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<BillLineInput>,
    #[serde(default)]
    pub settings: Option<PricingSettings>,
    /// Open (and post) straight away.
    #[serde(default)]
    pub open: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillChanges {
    #[serde(default)]
    pub supplier_id: Option<PartyId>,
    #[serde(default)]
    pub supplier_reference: Option<String>,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub bill_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub lines: Option<Vec<BillLineInput>>,
    #[serde(default)]
    pub settings: Option<PricingSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInput {
    #[serde(default)]
    pub payment_id: Option<Uuid>,
    pub amount: Amount,
    /// Defaults to the operation date.
    #[serde(default)]
    pub paid_on: Option<NaiveDate>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

impl PaymentInput {
    pub fn of(amount: Amount) -> Self {
        Self {
            payment_id: None,
            amount,
            paid_on: None,
            method: None,
            reference: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLineInput {
    pub line_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSalesReturn {
    #[serde(default)]
    pub return_id: Option<SalesReturnId>,
    pub number: String,
    pub invoice_id: InvoiceId,
    /// Defaults to the invoice's warehouse.
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    pub return_date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
    pub lines: Vec<ReturnLineInput>,
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseReturn {
    #[serde(default)]
    pub return_id: Option<PurchaseReturnId>,
    pub number: String,
    pub bill_id: BillId,
    /// Defaults to the bill's warehouse. Any other warehouse needs approval.
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    pub return_date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
    pub lines: Vec<ReturnLineInput>,
    /// Complete straight away when no approval is needed.
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    #[serde(default)]
    pub movement_id: Option<Uuid>,
    pub product_id: ProductId,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    /// Signed: positive adds stock.
    pub quantity: i64,
    /// Defaults to the product's standard cost.
    #[serde(default)]
    pub unit_cost: Option<Amount>,
}
