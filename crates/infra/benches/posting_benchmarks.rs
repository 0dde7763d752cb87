use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use ledgerdesk_accounting::{DocumentKind, SourceDocument};
use ledgerdesk_core::{AggregateId, TenantId, UserId};
use ledgerdesk_events::{EventEnvelope, InMemoryEventBus};
use ledgerdesk_infra::event_store::InMemoryEventStore;
use ledgerdesk_infra::lifecycle::{
    CommandContext, InvoiceChanges, Lifecycle, LineInput, NewInvoice, NewProduct, StockAdjustment,
};
use ledgerdesk_inventory::WarehouseId;
use ledgerdesk_invoicing::InvoiceId;
use ledgerdesk_parties::{PartyId, PartyKind};
use ledgerdesk_posting::{ItemPolicy, plan_invoice};
use ledgerdesk_pricing::{Discount, DiscountPlacement, DocumentLine, PricingSettings, price_document};
use ledgerdesk_products::{ProductId, ProductPricing};
use uuid::Uuid;

type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;

fn lines(count: usize) -> Vec<DocumentLine> {
    (0..count)
        .map(|i| DocumentLine {
            line_id: Uuid::now_v7(),
            product_id: ProductId(AggregateId::new()),
            description: format!("line {i}"),
            quantity: (i as i64 % 7) + 1,
            unit_price: 1_999 + i as i64,
            discount: if i % 3 == 0 { Discount::Percent(500) } else { Discount::None },
            tax_rate_bp: 1_000,
        })
        .collect()
}

fn settings() -> PricingSettings {
    PricingSettings {
        tax_inclusive: false,
        document_discount: Discount::Percent(1_000),
        discount_placement: DiscountPlacement::BeforeTax,
        shipping: 1_500,
        shipping_tax_rate_bp: 1_000,
        adjustment: -3,
    }
}

fn bench_price_document(c: &mut Criterion) {
    let mut group = c.benchmark_group("price_document");
    let settings = settings();
    for count in [1usize, 10, 100, 1_000] {
        let doc = lines(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &doc, |b, doc| {
            b.iter(|| price_document(black_box(doc), black_box(&settings)))
        });
    }
    group.finish();
}

fn bench_plan_invoice(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_invoice");
    let tenant_id = TenantId::new();
    let warehouse_id = WarehouseId::main(tenant_id);
    let source = SourceDocument::new(DocumentKind::Invoice, AggregateId::new());
    for count in [10usize, 100, 1_000] {
        let doc = lines(count);
        let totals = price_document(&doc, &settings()).expect("valid document");
        let items: HashMap<_, _> = doc
            .iter()
            .enumerate()
            .map(|(i, l)| {
                let policy = ItemPolicy {
                    track_inventory: i % 2 == 0,
                    standard_cost: 1_200,
                };
                (l.product_id, policy)
            })
            .collect();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &doc, |b, doc| {
            b.iter(|| plan_invoice(source, black_box(doc), &totals, &items, warehouse_id))
        });
    }
    group.finish();
}

struct Books {
    lifecycle: Lifecycle<InMemoryEventStore, Bus>,
    ctx: CommandContext,
    customer: PartyId,
    product: ProductId,
}

fn books() -> Books {
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let lifecycle = Lifecycle::new(InMemoryEventStore::new(), bus);
    let ctx = CommandContext::new(TenantId::new(), UserId::new());
    let product = ProductId(
        lifecycle
            .create_product(
                &ctx,
                NewProduct {
                    product_id: None,
                    sku: "BENCH".into(),
                    name: "Bench item".into(),
                    pricing: ProductPricing {
                        sale_price: 1_000,
                        standard_cost: 600,
                        tax_rate_bp: 1_000,
                    },
                    track_inventory: true,
                    activate: true,
                },
            )
            .expect("product")
            .id,
    );
    lifecycle
        .adjust_stock(
            &ctx,
            StockAdjustment {
                movement_id: None,
                product_id: product,
                warehouse_id: None,
                quantity: 1_000_000,
                unit_cost: None,
            },
        )
        .expect("opening stock");
    let customer = PartyId(
        lifecycle
            .register_party(&ctx, None, PartyKind::Customer, "Bench".into(), None)
            .expect("customer")
            .id,
    );
    Books {
        lifecycle,
        ctx,
        customer,
        product,
    }
}

fn issue(books: &Books, quantity: i64) -> InvoiceId {
    let date = NaiveDate::from_ymd_opt(2025, 1, 1).expect("date");
    let out = books
        .lifecycle
        .create_invoice(
            &books.ctx,
            NewInvoice {
                invoice_id: None,
                number: format!("B-{}", AggregateId::new()),
                customer_id: books.customer,
                sales_order_id: None,
                warehouse_id: None,
                issue_date: date,
                due_date: date,
                lines: vec![LineInput::new(books.product, quantity)],
                settings: None,
                issue: true,
            },
        )
        .expect("issue");
    InvoiceId(out.id)
}

/// Issue, and edit-then-repost, through the full coordinator.
fn bench_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle");
    group.sample_size(30);

    let books_issue = books();
    group.bench_function("create_and_issue_invoice", |b| {
        b.iter(|| issue(&books_issue, black_box(1)))
    });

    let books_edit = books();
    let invoice_id = issue(&books_edit, 1);
    let mut quantity = 1;
    group.bench_function("edit_issued_invoice", |b| {
        b.iter(|| {
            quantity = quantity % 5 + 1;
            books_edit
                .lifecycle
                .update_invoice(
                    &books_edit.ctx,
                    invoice_id,
                    InvoiceChanges {
                        lines: Some(vec![LineInput::new(books_edit.product, quantity)]),
                        ..InvoiceChanges::default()
                    },
                )
                .expect("edit")
        })
    });
    group.finish();
}

criterion_group!(benches, bench_price_document, bench_plan_invoice, bench_lifecycle);
criterion_main!(benches);
