//! Posting rules per document type.
//!
//! Each `plan_*` function is pure: it takes priced amounts and returns the
//! journal lines (by `PostingRole`) and stock movements the document implies.
//! Roles are mapped to concrete accounts later by `JournalDraft::resolve`
//! against the tenant's chart.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use ledgerdesk_accounting::{
    ChartOfAccounts, JournalEntryLine, PostingRole, SourceDocument, validate_balanced,
};
use ledgerdesk_core::money::{checked_mul, div_round};
use ledgerdesk_core::{Amount, DomainError, DomainResult};
use ledgerdesk_inventory::{MovementKind, WarehouseId};
use ledgerdesk_pricing::{DocumentLine, DocumentTotals};
use ledgerdesk_products::ProductId;

use crate::reconcile::{RefundSplit, ReturnLineShare};

/// What posting needs to know about a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPolicy {
    pub track_inventory: bool,
    /// Tax-exclusive cost per unit; the COGS basis.
    pub standard_cost: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLineDraft {
    pub role: PostingRole,
    pub amount: Amount,
    pub is_debit: bool,
}

/// Journal lines keyed by role, not yet bound to accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDraft {
    pub source: SourceDocument,
    pub description: String,
    pub lines: Vec<JournalLineDraft>,
}

impl JournalDraft {
    pub fn new(source: SourceDocument, description: impl Into<String>) -> Self {
        Self {
            source,
            description: description.into(),
            lines: Vec::new(),
        }
    }

    fn push(&mut self, role: PostingRole, amount: Amount, is_debit: bool) {
        match amount {
            0 => {}
            a if a < 0 => self.lines.push(JournalLineDraft {
                role,
                amount: -a,
                is_debit: !is_debit,
            }),
            a => self.lines.push(JournalLineDraft {
                role,
                amount: a,
                is_debit,
            }),
        }
    }

    /// Debit `amount`; zero is skipped and a negative amount becomes a credit.
    pub fn debit(&mut self, role: PostingRole, amount: Amount) -> &mut Self {
        self.push(role, amount, true);
        self
    }

    /// Credit `amount`; zero is skipped and a negative amount becomes a debit.
    pub fn credit(&mut self, role: PostingRole, amount: Amount) -> &mut Self {
        self.push(role, amount, false);
        self
    }

    pub fn debit_total(&self) -> i128 {
        self.lines
            .iter()
            .filter(|l| l.is_debit)
            .map(|l| l.amount as i128)
            .sum()
    }

    pub fn credit_total(&self) -> i128 {
        self.lines
            .iter()
            .filter(|l| !l.is_debit)
            .map(|l| l.amount as i128)
            .sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.debit_total() == self.credit_total()
    }

    /// Bind roles to the chart's accounts, merging lines that share a role and side.
    pub fn resolve(&self, chart: &ChartOfAccounts) -> DomainResult<Vec<JournalEntryLine>> {
        let mut merged: Vec<(PostingRole, bool, Amount)> = Vec::new();
        for line in &self.lines {
            match merged
                .iter_mut()
                .find(|(role, is_debit, _)| *role == line.role && *is_debit == line.is_debit)
            {
                Some(entry) => {
                    entry.2 = entry
                        .2
                        .checked_add(line.amount)
                        .ok_or_else(|| DomainError::overflow("journal line"))?;
                }
                None => merged.push((line.role, line.is_debit, line.amount)),
            }
        }

        let mut resolved = Vec::with_capacity(merged.len());
        for (role, is_debit, amount) in merged {
            let account = chart.resolve(role)?;
            resolved.push(if is_debit {
                JournalEntryLine::debit(account, amount)
            } else {
                JournalEntryLine::credit(account, amount)
            });
        }
        validate_balanced(&resolved)?;
        Ok(resolved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementDraft {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub kind: MovementKind,
    /// Signed; positive adds stock.
    pub quantity: i64,
    pub unit_cost: Amount,
}

/// Everything one document posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingPlan {
    pub journal: Option<JournalDraft>,
    pub movements: Vec<MovementDraft>,
}

impl PostingPlan {
    fn new(journal: JournalDraft, movements: Vec<MovementDraft>) -> DomainResult<Self> {
        if !journal.is_balanced() {
            return Err(DomainError::invariant(format!(
                "posting plan does not balance (debits {}, credits {})",
                journal.debit_total(),
                journal.credit_total()
            )));
        }
        let journal = if journal.lines.is_empty() {
            None
        } else {
            Some(journal)
        };
        Ok(Self { journal, movements })
    }

    pub fn is_empty(&self) -> bool {
        self.journal.is_none() && self.movements.is_empty()
    }

    /// Net stock change per product implied by this plan.
    pub fn stock_delta(&self) -> HashMap<(ProductId, WarehouseId), i64> {
        let mut delta = HashMap::new();
        for m in &self.movements {
            *delta.entry((m.product_id, m.warehouse_id)).or_insert(0) += m.quantity;
        }
        delta
    }
}

fn policy(items: &HashMap<ProductId, ItemPolicy>, product_id: ProductId) -> DomainResult<ItemPolicy> {
    items
        .get(&product_id)
        .copied()
        .ok_or_else(|| DomainError::not_found(format!("product {product_id}")))
}

fn ensure_aligned(lines: &[DocumentLine], totals: &DocumentTotals) -> DomainResult<()> {
    if lines.len() != totals.lines.len() {
        return Err(DomainError::invariant("line totals out of date"));
    }
    Ok(())
}

fn unit_cost(net: Amount, quantity: i64) -> Amount {
    if quantity == 0 {
        return 0;
    }
    div_round(net as i128, quantity as i128) as Amount
}

/// Issued invoice: receivable, revenue, output tax, shipping income, COGS.
pub fn plan_invoice(
    source: SourceDocument,
    lines: &[DocumentLine],
    totals: &DocumentTotals,
    items: &HashMap<ProductId, ItemPolicy>,
    warehouse_id: WarehouseId,
) -> DomainResult<PostingPlan> {
    ensure_aligned(lines, totals)?;

    let mut journal = JournalDraft::new(source, "invoice");
    journal
        .debit(PostingRole::AccountsReceivable, totals.total)
        .debit(PostingRole::SalesDiscounts, totals.discount)
        .credit(PostingRole::SalesRevenue, totals.subtotal)
        .credit(PostingRole::SalesTaxPayable, totals.total_tax())
        .credit(PostingRole::ShippingIncome, totals.shipping)
        .credit(PostingRole::Adjustments, totals.adjustment);

    let mut movements = Vec::new();
    for line in lines {
        let item = policy(items, line.product_id)?;
        if !item.track_inventory {
            continue;
        }
        let cost = checked_mul(line.quantity, item.standard_cost, "cost of goods sold")?;
        journal
            .debit(PostingRole::CostOfGoodsSold, cost)
            .credit(PostingRole::Inventory, cost);
        movements.push(MovementDraft {
            product_id: line.product_id,
            warehouse_id,
            kind: MovementKind::Sale,
            quantity: -line.quantity,
            unit_cost: item.standard_cost,
        });
    }

    PostingPlan::new(journal, movements)
}

/// Open bill: inventory or expense, input tax, freight, payable.
pub fn plan_bill(
    source: SourceDocument,
    lines: &[DocumentLine],
    totals: &DocumentTotals,
    items: &HashMap<ProductId, ItemPolicy>,
    warehouse_id: WarehouseId,
) -> DomainResult<PostingPlan> {
    ensure_aligned(lines, totals)?;

    let mut journal = JournalDraft::new(source, "bill");
    let mut movements = Vec::new();
    for (line, priced) in lines.iter().zip(&totals.lines) {
        let item = policy(items, line.product_id)?;
        let role = if item.track_inventory {
            movements.push(MovementDraft {
                product_id: line.product_id,
                warehouse_id,
                kind: MovementKind::PurchaseReceipt,
                quantity: line.quantity,
                unit_cost: unit_cost(priced.net, line.quantity),
            });
            PostingRole::Inventory
        } else {
            PostingRole::PurchaseExpense
        };
        journal.debit(role, priced.net_before_document_discount());
    }

    journal
        .debit(PostingRole::InputTax, totals.total_tax())
        .debit(PostingRole::FreightIn, totals.shipping)
        .debit(PostingRole::Adjustments, totals.adjustment)
        .credit(PostingRole::PurchaseDiscounts, totals.discount)
        .credit(PostingRole::AccountsPayable, totals.total);

    PostingPlan::new(journal, movements)
}

fn ensure_split(shares: &[ReturnLineShare], split: RefundSplit) -> DomainResult<()> {
    let refund: Amount = shares.iter().map(ReturnLineShare::refund).sum();
    if split.applied + split.excess != refund || split.applied < 0 || split.excess < 0 {
        return Err(DomainError::invariant(format!(
            "refund split {} + {} does not match refund {}",
            split.applied, split.excess, refund
        )));
    }
    Ok(())
}

/// Completed sales return: contra revenue, tax back, receivable or customer credit.
pub fn plan_sales_return(
    source: SourceDocument,
    shares: &[ReturnLineShare],
    split: RefundSplit,
    items: &HashMap<ProductId, ItemPolicy>,
    warehouse_id: WarehouseId,
) -> DomainResult<PostingPlan> {
    ensure_split(shares, split)?;

    let mut journal = JournalDraft::new(source, "sales return");
    journal
        .debit(PostingRole::SalesReturns, shares.iter().map(|s| s.net).sum())
        .debit(PostingRole::SalesTaxPayable, shares.iter().map(|s| s.tax).sum())
        .credit(PostingRole::SalesDiscounts, shares.iter().map(|s| s.discount).sum())
        .credit(PostingRole::AccountsReceivable, split.applied)
        .credit(PostingRole::CustomerCredits, split.excess);

    let mut movements = Vec::new();
    for share in shares {
        let item = policy(items, share.product_id)?;
        if !item.track_inventory {
            continue;
        }
        let cost = checked_mul(share.quantity, item.standard_cost, "returned cost")?;
        journal
            .debit(PostingRole::Inventory, cost)
            .credit(PostingRole::CostOfGoodsSold, cost);
        movements.push(MovementDraft {
            product_id: share.product_id,
            warehouse_id,
            kind: MovementKind::SalesReturn,
            quantity: share.quantity,
            unit_cost: item.standard_cost,
        });
    }

    PostingPlan::new(journal, movements)
}

/// Completed purchase return: payable or supplier credit against stock and input tax.
pub fn plan_purchase_return(
    source: SourceDocument,
    shares: &[ReturnLineShare],
    split: RefundSplit,
    items: &HashMap<ProductId, ItemPolicy>,
    warehouse_id: WarehouseId,
) -> DomainResult<PostingPlan> {
    ensure_split(shares, split)?;

    let mut journal = JournalDraft::new(source, "purchase return");
    journal
        .debit(PostingRole::AccountsPayable, split.applied)
        .debit(PostingRole::SupplierCredits, split.excess)
        .debit(PostingRole::PurchaseDiscounts, shares.iter().map(|s| s.discount).sum())
        .credit(PostingRole::InputTax, shares.iter().map(|s| s.tax).sum());

    let mut movements = Vec::new();
    for share in shares {
        let item = policy(items, share.product_id)?;
        if item.track_inventory {
            journal.credit(PostingRole::Inventory, share.net);
            movements.push(MovementDraft {
                product_id: share.product_id,
                warehouse_id,
                kind: MovementKind::PurchaseReturn,
                quantity: -share.quantity,
                unit_cost: unit_cost(share.net, share.quantity),
            });
        } else {
            journal.credit(PostingRole::PurchaseExpense, share.net);
        }
    }

    PostingPlan::new(journal, movements)
}

pub fn plan_invoice_payment(source: SourceDocument, amount: Amount) -> DomainResult<PostingPlan> {
    let mut journal = JournalDraft::new(source, "invoice payment");
    journal
        .debit(PostingRole::Cash, amount)
        .credit(PostingRole::AccountsReceivable, amount);
    PostingPlan::new(journal, Vec::new())
}

pub fn plan_bill_payment(source: SourceDocument, amount: Amount) -> DomainResult<PostingPlan> {
    let mut journal = JournalDraft::new(source, "bill payment");
    journal
        .debit(PostingRole::AccountsPayable, amount)
        .credit(PostingRole::Cash, amount);
    PostingPlan::new(journal, Vec::new())
}

/// Credit note applied to a document. Customer credit settles a receivable;
/// supplier credit settles a payable.
pub fn plan_credit_application(
    source: SourceDocument,
    customer: bool,
    amount: Amount,
) -> DomainResult<PostingPlan> {
    let mut journal = JournalDraft::new(source, "credit note applied");
    if customer {
        journal
            .debit(PostingRole::CustomerCredits, amount)
            .credit(PostingRole::AccountsReceivable, amount);
    } else {
        journal
            .debit(PostingRole::AccountsPayable, amount)
            .credit(PostingRole::SupplierCredits, amount);
    }
    PostingPlan::new(journal, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdesk_accounting::{ChartId, ChartOfAccounts, DocumentKind};
    use ledgerdesk_core::{Aggregate, AggregateId, TenantId};
    use ledgerdesk_pricing::{Discount, DiscountPlacement, PricingSettings, price_document};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn seeded_chart() -> ChartOfAccounts {
        use ledgerdesk_accounting::{ChartCommand, SeedStandardChart};
        let tenant_id = TenantId::new();
        let id = ChartId::for_tenant(tenant_id);
        let mut chart = ChartOfAccounts::empty(id);
        let events = chart
            .handle(&ChartCommand::SeedStandardChart(SeedStandardChart {
                tenant_id,
                chart_id: id,
                occurred_at: chrono::Utc::now(),
            }))
            .unwrap();
        for e in &events {
            chart.apply(e);
        }
        chart
    }

    fn source(kind: DocumentKind) -> SourceDocument {
        SourceDocument::new(kind, AggregateId::new())
    }

    fn product_line(quantity: i64, unit_price: Amount) -> DocumentLine {
        DocumentLine {
            line_id: Uuid::now_v7(),
            product_id: ProductId::new(AggregateId::new()),
            description: String::new(),
            quantity,
            unit_price,
            discount: Discount::None,
            tax_rate_bp: 1_000,
        }
    }

    fn items_for(lines: &[DocumentLine], tracked: bool) -> HashMap<ProductId, ItemPolicy> {
        lines
            .iter()
            .map(|l| {
                (
                    l.product_id,
                    ItemPolicy {
                        track_inventory: tracked,
                        standard_cost: 400,
                    },
                )
            })
            .collect()
    }

    fn side(lines: &[JournalLineDraft], role: PostingRole, is_debit: bool) -> Amount {
        lines
            .iter()
            .filter(|l| l.role == role && l.is_debit == is_debit)
            .map(|l| l.amount)
            .sum()
    }

    #[test]
    fn invoice_plan_posts_revenue_tax_and_cogs() {
        let lines = vec![product_line(2, 1_000)];
        let settings = PricingSettings {
            shipping: 300,
            shipping_tax_rate_bp: 1_000,
            ..PricingSettings::default()
        };
        let totals = price_document(&lines, &settings).unwrap();
        let warehouse = WarehouseId::new(AggregateId::new());

        let plan = plan_invoice(
            source(DocumentKind::Invoice),
            &lines,
            &totals,
            &items_for(&lines, true),
            warehouse,
        )
        .unwrap();
        let journal = plan.journal.as_ref().unwrap();

        assert_eq!(side(&journal.lines, PostingRole::AccountsReceivable, true), 2_530);
        assert_eq!(side(&journal.lines, PostingRole::SalesRevenue, false), 2_000);
        assert_eq!(side(&journal.lines, PostingRole::SalesTaxPayable, false), 230);
        assert_eq!(side(&journal.lines, PostingRole::ShippingIncome, false), 300);
        assert_eq!(side(&journal.lines, PostingRole::CostOfGoodsSold, true), 800);
        assert_eq!(side(&journal.lines, PostingRole::Inventory, false), 800);
        assert_eq!(plan.movements.len(), 1);
        assert_eq!(plan.movements[0].quantity, -2);
        assert_eq!(plan.stock_delta()[&(lines[0].product_id, warehouse)], -2);

        let resolved = journal.resolve(&seeded_chart()).unwrap();
        assert!(resolved.iter().all(|l| l.amount > 0));
    }

    #[test]
    fn negative_adjustment_flips_side() {
        let lines = vec![product_line(1, 1_000)];
        let settings = PricingSettings {
            adjustment: -20,
            ..PricingSettings::default()
        };
        let totals = price_document(&lines, &settings).unwrap();
        let plan = plan_invoice(
            source(DocumentKind::Invoice),
            &lines,
            &totals,
            &items_for(&lines, false),
            WarehouseId::new(AggregateId::new()),
        )
        .unwrap();
        let journal = plan.journal.unwrap();
        assert_eq!(side(&journal.lines, PostingRole::Adjustments, true), 20);
        assert!(plan.movements.is_empty());
    }

    #[test]
    fn bill_plan_receives_stock_at_net_unit_cost() {
        let lines = vec![product_line(4, 1_000)];
        let settings = PricingSettings {
            document_discount: Discount::Percent(1_000),
            ..PricingSettings::default()
        };
        let totals = price_document(&lines, &settings).unwrap();
        let plan = plan_bill(
            source(DocumentKind::Bill),
            &lines,
            &totals,
            &items_for(&lines, true),
            WarehouseId::new(AggregateId::new()),
        )
        .unwrap();
        let journal = plan.journal.unwrap();
        assert_eq!(side(&journal.lines, PostingRole::Inventory, true), 4_000);
        assert_eq!(side(&journal.lines, PostingRole::PurchaseDiscounts, false), 400);
        assert_eq!(side(&journal.lines, PostingRole::AccountsPayable, false), totals.total);
        assert_eq!(plan.movements[0].quantity, 4);
        assert_eq!(plan.movements[0].unit_cost, 900);
    }

    #[test]
    fn sales_return_excess_goes_to_customer_credits() {
        let product_id = ProductId::new(AggregateId::new());
        let shares = vec![ReturnLineShare {
            line_id: Uuid::now_v7(),
            product_id,
            quantity: 1,
            net: 1_000,
            tax: 100,
            discount: 0,
        }];
        let items: HashMap<_, _> = [(
            product_id,
            ItemPolicy {
                track_inventory: true,
                standard_cost: 600,
            },
        )]
        .into();
        let plan = plan_sales_return(
            source(DocumentKind::SalesReturn),
            &shares,
            RefundSplit {
                applied: 300,
                excess: 800,
            },
            &items,
            WarehouseId::new(AggregateId::new()),
        )
        .unwrap();
        let journal = plan.journal.unwrap();
        assert_eq!(side(&journal.lines, PostingRole::AccountsReceivable, false), 300);
        assert_eq!(side(&journal.lines, PostingRole::CustomerCredits, false), 800);
        assert_eq!(side(&journal.lines, PostingRole::Inventory, true), 600);
        assert_eq!(plan.movements[0].quantity, 1);
    }

    #[test]
    fn mismatched_refund_split_is_rejected() {
        let shares = vec![ReturnLineShare {
            line_id: Uuid::now_v7(),
            product_id: ProductId::new(AggregateId::new()),
            quantity: 1,
            net: 1_000,
            tax: 0,
            discount: 0,
        }];
        let err = plan_purchase_return(
            source(DocumentKind::PurchaseReturn),
            &shares,
            RefundSplit {
                applied: 100,
                excess: 100,
            },
            &HashMap::new(),
            WarehouseId::new(AggregateId::new()),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn unknown_product_is_not_found() {
        let lines = vec![product_line(1, 100)];
        let totals = price_document(&lines, &PricingSettings::default()).unwrap();
        let err = plan_invoice(
            source(DocumentKind::Invoice),
            &lines,
            &totals,
            &HashMap::new(),
            WarehouseId::new(AggregateId::new()),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn payments_and_credit_applications_balance() {
        for plan in [
            plan_invoice_payment(source(DocumentKind::InvoicePayment), 500).unwrap(),
            plan_bill_payment(source(DocumentKind::BillPayment), 500).unwrap(),
            plan_credit_application(source(DocumentKind::CreditNote), true, 500).unwrap(),
            plan_credit_application(source(DocumentKind::CreditNote), false, 500).unwrap(),
        ] {
            let journal = plan.journal.unwrap();
            assert_eq!(journal.lines.len(), 2);
            assert!(journal.is_balanced());
        }
    }

    fn arb_lines() -> impl Strategy<Value = Vec<DocumentLine>> {
        prop::collection::vec(
            (1i64..20, 0i64..50_000, 0u32..2_500, 0u32..=5_000),
            1..6,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(quantity, unit_price, tax_rate_bp, discount_bp)| DocumentLine {
                    line_id: Uuid::now_v7(),
                    product_id: ProductId::new(AggregateId::new()),
                    description: String::new(),
                    quantity,
                    unit_price,
                    discount: Discount::Percent(discount_bp),
                    tax_rate_bp,
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Every invoice and bill plan balances, whatever the pricing inputs.
        #[test]
        fn document_plans_always_balance(
            lines in arb_lines(),
            tax_inclusive in any::<bool>(),
            after_tax in any::<bool>(),
            discount_bp in 0u32..=10_000,
            shipping in 0i64..10_000,
            adjustment in -500i64..500,
            tracked in any::<bool>(),
        ) {
            let settings = PricingSettings {
                tax_inclusive,
                document_discount: Discount::Percent(discount_bp),
                discount_placement: if after_tax { DiscountPlacement::AfterTax } else { DiscountPlacement::BeforeTax },
                shipping,
                shipping_tax_rate_bp: 1_000,
                adjustment,
            };
            let Ok(totals) = price_document(&lines, &settings) else {
                return Ok(());
            };
            let items = items_for(&lines, tracked);
            let warehouse = WarehouseId::new(AggregateId::new());

            let invoice = plan_invoice(source(DocumentKind::Invoice), &lines, &totals, &items, warehouse).unwrap();
            let bill = plan_bill(source(DocumentKind::Bill), &lines, &totals, &items, warehouse).unwrap();
            for plan in [invoice, bill] {
                if let Some(journal) = plan.journal {
                    prop_assert!(journal.is_balanced());
                    prop_assert!(journal.lines.iter().all(|l| l.amount > 0));
                }
            }
        }
    }
}
