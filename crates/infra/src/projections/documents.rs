//! Document read models.
//!
//! Keeps a rehydrated copy of every document aggregate and renders it to a
//! JSON view after each event. The previous view is returned with the new one
//! so the audit log can diff them.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

use ledgerdesk_core::{AggregateId, AggregateRoot, TenantId};
use ledgerdesk_events::EventEnvelope;
use ledgerdesk_invoicing::{Invoice, SalesReturn};
use ledgerdesk_parties::{Company, CreditNote, Party};
use ledgerdesk_products::Product;
use ledgerdesk_purchasing::{Bill, PurchaseOrder, PurchaseReturn};
use ledgerdesk_sales::SalesOrder;

use super::ProjectionError;
use super::cursor::StreamCursors;
use crate::lifecycle::streams::{
    BILL, COMPANY, CREDIT_NOTE, INVOICE, PARTY, PRODUCT, PURCHASE_ORDER, PURCHASE_RETURN,
    SALES_ORDER, SALES_RETURN, Stream,
};
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// A document as served by the list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentView {
    pub id: AggregateId,
    pub entity_type: &'static str,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: JsonValue,
}

/// Result of applying one envelope to a document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub before: Option<DocumentView>,
    pub after: DocumentView,
}

enum DocState {
    Product(Product),
    Party(Party),
    Company(Company),
    CreditNote(CreditNote),
    SalesOrder(SalesOrder),
    Invoice(Invoice),
    SalesReturn(SalesReturn),
    PurchaseOrder(PurchaseOrder),
    Bill(Bill),
    PurchaseReturn(PurchaseReturn),
}

fn fold<A: Stream>(aggregate: &mut A, payload: &JsonValue) -> Result<(), ProjectionError> {
    let ev: A::Event = serde_json::from_value(payload.clone())
        .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
    aggregate.apply(&ev);
    Ok(())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

impl DocState {
    fn empty(aggregate_type: &str, id: AggregateId) -> Option<Self> {
        let state = match aggregate_type {
            PRODUCT => DocState::Product(Stream::empty_for(id)),
            PARTY => DocState::Party(Stream::empty_for(id)),
            COMPANY => DocState::Company(Stream::empty_for(id)),
            CREDIT_NOTE => DocState::CreditNote(Stream::empty_for(id)),
            SALES_ORDER => DocState::SalesOrder(Stream::empty_for(id)),
            INVOICE => DocState::Invoice(Stream::empty_for(id)),
            SALES_RETURN => DocState::SalesReturn(Stream::empty_for(id)),
            PURCHASE_ORDER => DocState::PurchaseOrder(Stream::empty_for(id)),
            BILL => DocState::Bill(Stream::empty_for(id)),
            PURCHASE_RETURN => DocState::PurchaseReturn(Stream::empty_for(id)),
            _ => return None,
        };
        Some(state)
    }

    fn apply(&mut self, payload: &JsonValue) -> Result<(), ProjectionError> {
        match self {
            DocState::Product(a) => fold(a, payload),
            DocState::Party(a) => fold(a, payload),
            DocState::Company(a) => fold(a, payload),
            DocState::CreditNote(a) => fold(a, payload),
            DocState::SalesOrder(a) => fold(a, payload),
            DocState::Invoice(a) => fold(a, payload),
            DocState::SalesReturn(a) => fold(a, payload),
            DocState::PurchaseOrder(a) => fold(a, payload),
            DocState::Bill(a) => fold(a, payload),
            DocState::PurchaseReturn(a) => fold(a, payload),
        }
    }

    fn version(&self) -> u64 {
        match self {
            DocState::Product(a) => a.version(),
            DocState::Party(a) => a.version(),
            DocState::Company(a) => a.version(),
            DocState::CreditNote(a) => a.version(),
            DocState::SalesOrder(a) => a.version(),
            DocState::Invoice(a) => a.version(),
            DocState::SalesReturn(a) => a.version(),
            DocState::PurchaseOrder(a) => a.version(),
            DocState::Bill(a) => a.version(),
            DocState::PurchaseReturn(a) => a.version(),
        }
    }

    fn tenant_id(&self) -> Option<TenantId> {
        match self {
            DocState::Product(a) => a.tenant_id(),
            DocState::Party(a) => a.tenant_id(),
            DocState::Company(a) => a.tenant_id(),
            DocState::CreditNote(a) => a.tenant_id(),
            DocState::SalesOrder(a) => a.tenant_id(),
            DocState::Invoice(a) => a.tenant_id(),
            DocState::SalesReturn(a) => a.tenant_id(),
            DocState::PurchaseOrder(a) => a.tenant_id(),
            DocState::Bill(a) => a.tenant_id(),
            DocState::PurchaseReturn(a) => a.tenant_id(),
        }
    }

    fn render(&self) -> (&'static str, JsonValue) {
        match self {
            DocState::Product(p) => (
                "product",
                json!({
                    "sku": p.sku(),
                    "name": p.name(),
                    "status": to_json(&p.status()),
                    "sale_price": p.pricing().sale_price,
                    "standard_cost": p.pricing().standard_cost,
                    "tax_rate_bp": p.pricing().tax_rate_bp,
                    "track_inventory": p.tracks_inventory(),
                }),
            ),
            DocState::Party(p) => (
                p.kind().as_str(),
                json!({
                    "kind": p.kind().as_str(),
                    "name": p.name(),
                    "contact": to_json(p.contact()),
                    "status": to_json(&p.status()),
                }),
            ),
            DocState::Company(c) => ("company", to_json(c.profile())),
            DocState::CreditNote(n) => (
                "credit_note",
                json!({
                    "kind": to_json(&n.kind()),
                    "party_id": n.party_id(),
                    "source": to_json(&n.source()),
                    "amount": n.amount(),
                    "applied": n.applied(),
                    "remaining": n.remaining(),
                    "status": to_json(&n.status()),
                    "applications": to_json(n.applications()),
                }),
            ),
            DocState::SalesOrder(o) => (
                "sales_order",
                json!({
                    "number": o.number(),
                    "customer_id": o.customer_id(),
                    "order_date": o.order_date(),
                    "status": to_json(&o.status()),
                    "lines": to_json(o.lines()),
                    "settings": to_json(o.settings()),
                    "totals": to_json(o.totals()),
                    "invoice_id": o.invoice_id(),
                }),
            ),
            DocState::Invoice(i) => (
                "invoice",
                json!({
                    "number": i.number(),
                    "customer_id": i.customer_id(),
                    "sales_order_id": i.sales_order_id(),
                    "warehouse_id": i.warehouse_id(),
                    "issue_date": i.issue_date(),
                    "due_date": i.due_date(),
                    "status": to_json(&i.status()),
                    "payment_status": to_json(&i.payment_status()),
                    "return_status": to_json(&i.return_status()),
                    "lines": to_json(i.lines()),
                    "settings": to_json(i.settings()),
                    "totals": to_json(i.totals()),
                    "total": i.totals().total,
                    "payments": to_json(i.payments()),
                    "amount_paid": i.amount_paid(),
                    "amount_credited": i.amount_credited(),
                    "return_applied": i.return_applied(),
                    "balance_due": i.balance_due(),
                    "returned_quantities": to_json(i.returned_quantities()),
                }),
            ),
            DocState::SalesReturn(r) => (
                "sales_return",
                json!({
                    "number": r.number(),
                    "invoice_id": r.invoice_id(),
                    "customer_id": r.customer_id(),
                    "warehouse_id": r.warehouse_id(),
                    "return_date": r.return_date(),
                    "reason": r.reason(),
                    "status": to_json(&r.status()),
                    "lines": to_json(r.lines()),
                    "refund_total": r.refund_total(),
                    "applied": r.applied(),
                    "excess": r.excess(),
                    "credit_note_id": r.credit_note_id(),
                }),
            ),
            DocState::PurchaseOrder(o) => {
                let billed: HashMap<String, i64> = o
                    .lines()
                    .iter()
                    .map(|l| (l.line_id.to_string(), o.billed_quantity(l.line_id)))
                    .collect();
                (
                    "purchase_order",
                    json!({
                        "number": o.number(),
                        "supplier_id": o.supplier_id(),
                        "warehouse_id": o.warehouse_id(),
                        "order_date": o.order_date(),
                        "status": to_json(&o.status()),
                        "lines": to_json(o.lines()),
                        "billed_quantities": billed,
                        "settings": to_json(o.settings()),
                        "totals": to_json(o.totals()),
                    }),
                )
            }
            DocState::Bill(b) => (
                "bill",
                json!({
                    "number": b.number(),
                    "supplier_id": b.supplier_id(),
                    "supplier_reference": b.supplier_reference(),
                    "purchase_order_id": b.purchase_order_id(),
                    "warehouse_id": b.warehouse_id(),
                    "bill_date": b.bill_date(),
                    "due_date": b.due_date(),
                    "status": to_json(&b.status()),
                    "payment_status": to_json(&b.payment_status()),
                    "return_status": to_json(&b.return_status()),
                    "lines": to_json(b.lines()),
                    "settings": to_json(b.settings()),
                    "totals": to_json(b.totals()),
                    "total": b.totals().total,
                    "payments": to_json(b.payments()),
                    "amount_paid": b.amount_paid(),
                    "amount_credited": b.amount_credited(),
                    "return_applied": b.return_applied(),
                    "balance_due": b.balance_due(),
                    "returned_quantities": to_json(b.returned_quantities()),
                }),
            ),
            DocState::PurchaseReturn(r) => (
                "purchase_return",
                json!({
                    "number": r.number(),
                    "bill_id": r.bill_id(),
                    "supplier_id": r.supplier_id(),
                    "warehouse_id": r.warehouse_id(),
                    "return_date": r.return_date(),
                    "reason": r.reason(),
                    "status": to_json(&r.status()),
                    "requires_approval": r.requires_approval(),
                    "decision": to_json(&r.decision()),
                    "lines": to_json(r.lines()),
                    "refund_total": r.refund_total(),
                    "applied": r.applied(),
                    "excess": r.excess(),
                    "credit_note_id": r.credit_note_id(),
                }),
            ),
        }
    }
}

/// Projection: document streams → rendered JSON views.
pub struct DocumentsProjection<S = InMemoryTenantStore<AggregateId, DocumentView>>
where
    S: TenantStore<AggregateId, DocumentView>,
{
    views: S,
    states: RwLock<HashMap<(TenantId, AggregateId), DocState>>,
    cursors: StreamCursors,
}

impl DocumentsProjection {
    pub fn in_memory() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> DocumentsProjection<S>
where
    S: TenantStore<AggregateId, DocumentView>,
{
    pub fn new(views: S) -> Self {
        Self {
            views,
            states: RwLock::new(HashMap::new()),
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, id: AggregateId) -> Option<DocumentView> {
        self.views.get(tenant_id, &id)
    }

    /// Views of one entity type, oldest first.
    pub fn list(&self, tenant_id: TenantId, entity_type: &str) -> Vec<DocumentView> {
        let mut all: Vec<DocumentView> = self
            .views
            .list(tenant_id)
            .into_iter()
            .filter(|v| v.entity_type == entity_type)
            .collect();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.views.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
        if let Ok(mut states) = self.states.write() {
            states.retain(|(t, _), _| *t != tenant_id);
        }
    }

    /// Fold one envelope. Returns `None` for streams that are not documents
    /// and for redelivered envelopes.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<Option<DocumentChange>, ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut states = match self.states.write() {
            Ok(states) => states,
            Err(poisoned) => poisoned.into_inner(),
        };
        let key = (tenant_id, aggregate_id);
        if !states.contains_key(&key) {
            match DocState::empty(envelope.aggregate_type(), aggregate_id) {
                Some(state) => {
                    states.insert(key, state);
                }
                None => return Ok(None),
            }
        }
        if !self.cursors.should_apply(tenant_id, aggregate_id, seq)? {
            return Ok(None);
        }
        let Some(state) = states.get_mut(&key) else {
            return Ok(None);
        };

        state.apply(envelope.payload())?;
        if state.tenant_id() != Some(tenant_id) {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        let before = self.views.get(tenant_id, &aggregate_id);
        let (entity_type, data) = state.render();
        let after = DocumentView {
            id: aggregate_id,
            entity_type,
            version: state.version(),
            created_at: before
                .as_ref()
                .map(|b| b.created_at)
                .unwrap_or_else(|| envelope.occurred_at()),
            updated_at: envelope.occurred_at(),
            data,
        };
        self.views.upsert(tenant_id, aggregate_id, after.clone());
        self.cursors.advance(tenant_id, aggregate_id, seq);

        Ok(Some(DocumentChange { before, after }))
    }
}
