//! Supplier bill lifecycle, mirroring invoices on the purchase side.
//!
//! Lines that reference a purchase order line count towards that order's
//! billed quantities for as long as the bill is not void. Each bill records
//! its own quantities on the order, so a sync only ever replaces that bill's
//! share and retrying one converges.

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use ledgerdesk_accounting::{DocumentKind, SourceDocument};
use ledgerdesk_core::{AggregateId, DomainError, TenantId};
use ledgerdesk_events::{EventBus, EventEnvelope, execute};
use ledgerdesk_inventory::WarehouseId;
use ledgerdesk_parties::{PartyId, PartyKind};
use ledgerdesk_posting::{Payment, PostingPlan, plan_bill, plan_bill_payment};
use ledgerdesk_purchasing::{
    Bill, BillCommand, BillId, BillLine, BillStatus, BilledQuantity, CreateBill, OpenBill,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderId, RegisterBillPayment,
    SyncBilledQuantities, UpdateBill, VoidBill,
};

use super::catalog::PriceBasis;
use super::error::AfterCommit;
use super::inputs::{BillChanges, BillLineInput, LineInput, NewBill, PaymentInput};
use super::{CommandContext, Lifecycle, LifecycleResult, Outcome, required, status_str};
use crate::event_store::EventStore;

pub(crate) fn bill_source(bill_id: BillId) -> SourceDocument {
    SourceDocument::new(DocumentKind::Bill, bill_id.0)
}

impl<S, B> Lifecycle<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    #[tracing::instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, number = %input.number), err)]
    pub fn create_bill(&self, ctx: &CommandContext, input: NewBill) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        self.party_as(tenant_id, input.supplier_id, PartyKind::Supplier)?;
        let lines = self.resolve_bill_lines(tenant_id, &input.lines)?;

        let mut warehouse_id = input.warehouse_id;
        if let Some(po_id) = input.purchase_order_id {
            let order = self.billable_order(tenant_id, po_id, input.supplier_id)?;
            ensure_within_order(&order, &lines, None)?;
            warehouse_id = warehouse_id.or(order.warehouse_id());
        }
        let settings = match input.settings {
            Some(s) => s,
            None => self.default_settings(tenant_id)?,
        };
        let bill_id = input.bill_id.unwrap_or_else(|| BillId(AggregateId::new()));
        let create = BillCommand::CreateBill(CreateBill {
            tenant_id,
            bill_id,
            number: input.number,
            supplier_id: input.supplier_id,
            supplier_reference: input.supplier_reference,
            purchase_order_id: input.purchase_order_id,
            warehouse_id: warehouse_id.unwrap_or_else(|| WarehouseId::main(tenant_id)),
            bill_date: input.bill_date,
            due_date: input.due_date,
            lines,
            settings,
            occurred_at: ctx.at,
        });

        let mut preview = Bill::empty(bill_id);
        execute(&mut preview, &create)?;
        let plan = if input.open {
            execute(&mut preview, &open_command(ctx, bill_id))?;
            Some(self.bill_plan(tenant_id, &preview)?)
        } else {
            None
        };

        let mut outcome = Outcome::new(bill_id.0);
        let (bill, committed) = self.dispatch_loaded::<Bill>(ctx, bill_id.0, create)?;
        outcome.committed += committed;
        if let Some(po_id) = bill.purchase_order_id() {
            let synced = self.sync_billed(ctx, po_id, bill_id, &bill.po_quantities());
            outcome.best_effort("purchase order billed quantities", synced);
        }

        let Some(plan) = plan else {
            return Ok(outcome.with_status(bill.status()));
        };
        outcome.committed += self
            .dispatch::<Bill>(ctx, bill_id.0, open_command(ctx, bill_id))
            .after_commit(bill_id.0, "open")?;
        outcome.committed += self
            .repost(ctx, bill_source(bill_id), Some(&plan), "bill opened")
            .after_commit(bill_id.0, "posting")?;
        Ok(outcome.with_status(BillStatus::Open))
    }

    #[tracing::instrument(skip(self, ctx, changes), fields(tenant_id = %ctx.tenant_id, bill_id = %bill_id), err)]
    pub fn update_bill(
        &self,
        ctx: &CommandContext,
        bill_id: BillId,
        changes: BillChanges,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let bill = self.load_existing::<Bill>(tenant_id, bill_id.0, "bill")?;
        if !bill.is_editable() {
            return Err(DomainError::invariant(format!(
                "bill is {} and cannot be edited",
                status_str(&bill.status())
            ))
            .into());
        }

        let supplier_id = match changes.supplier_id {
            Some(supplier_id) => {
                self.party_as(tenant_id, supplier_id, PartyKind::Supplier)?;
                supplier_id
            }
            None => required(bill.supplier_id(), "supplier")?,
        };
        let lines = match &changes.lines {
            Some(lines) => self.resolve_bill_lines(tenant_id, lines)?,
            None => bill.lines().to_vec(),
        };
        if let Some(po_id) = bill.purchase_order_id() {
            if changes.lines.is_some() {
                let order = self.billable_order(tenant_id, po_id, supplier_id)?;
                ensure_within_order(&order, &lines, Some(bill_id))?;
            }
        }
        let command = BillCommand::UpdateBill(UpdateBill {
            tenant_id,
            bill_id,
            supplier_id,
            supplier_reference: changes
                .supplier_reference
                .or_else(|| bill.supplier_reference().map(str::to_string)),
            warehouse_id: match changes.warehouse_id {
                Some(w) => w,
                None => required(bill.warehouse_id(), "warehouse")?,
            },
            bill_date: match changes.bill_date {
                Some(d) => d,
                None => required(bill.bill_date(), "bill date")?,
            },
            due_date: match changes.due_date {
                Some(d) => d,
                None => required(bill.due_date(), "due date")?,
            },
            lines,
            settings: changes.settings.unwrap_or_else(|| bill.settings().clone()),
            occurred_at: ctx.at,
        });

        let mut preview = bill.clone();
        if execute(&mut preview, &command)?.is_empty() {
            return Ok(Outcome::new(bill_id.0).with_status(bill.status()));
        }
        let plan = if preview.status().is_postable() {
            let plan = self.bill_plan(tenant_id, &preview)?;
            self.ensure_stock(ctx, bill_source(bill_id), &plan)?;
            Some(plan)
        } else {
            None
        };

        let mut outcome = Outcome::new(bill_id.0);
        let (updated, committed) = self.dispatch_loaded::<Bill>(ctx, bill_id.0, command)?;
        outcome.committed += committed;
        if let Some(plan) = &plan {
            outcome.committed += self
                .repost(ctx, bill_source(bill_id), Some(plan), "bill updated")
                .after_commit(bill_id.0, "posting")?;
        }
        if let Some(po_id) = updated.purchase_order_id() {
            let synced = self.sync_billed(ctx, po_id, bill_id, &updated.po_quantities());
            outcome.best_effort("purchase order billed quantities", synced);
        }
        Ok(outcome.with_status(updated.status()))
    }

    /// Open a draft bill: receive tracked stock and post the payable.
    #[tracing::instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, bill_id = %bill_id), err)]
    pub fn open_bill(&self, ctx: &CommandContext, bill_id: BillId) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let bill = self.load_existing::<Bill>(tenant_id, bill_id.0, "bill")?;
        let command = open_command(ctx, bill_id);

        let mut preview = bill.clone();
        execute(&mut preview, &command)?;
        let plan = self.bill_plan(tenant_id, &preview)?;

        let mut outcome = Outcome::new(bill_id.0);
        outcome.committed += self.dispatch::<Bill>(ctx, bill_id.0, command)?;
        outcome.committed += self
            .repost(ctx, bill_source(bill_id), Some(&plan), "bill opened")
            .after_commit(bill_id.0, "posting")?;
        Ok(outcome.with_status(preview.status()))
    }

    #[tracing::instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, bill_id = %bill_id, amount = input.amount), err)]
    pub fn record_bill_payment(
        &self,
        ctx: &CommandContext,
        bill_id: BillId,
        input: PaymentInput,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let bill = self.load_existing::<Bill>(tenant_id, bill_id.0, "bill")?;
        let payment = Payment {
            payment_id: input.payment_id.unwrap_or_else(Uuid::now_v7),
            amount: input.amount,
            paid_on: input.paid_on.unwrap_or_else(|| ctx.at.date_naive()),
            method: input.method,
            reference: input.reference,
        };
        let payment_id = payment.payment_id;
        let amount = payment.amount;
        let command = BillCommand::RegisterBillPayment(RegisterBillPayment {
            tenant_id,
            bill_id,
            payment,
            occurred_at: ctx.at,
        });

        let mut preview = bill.clone();
        execute(&mut preview, &command)?;

        let mut outcome = Outcome::new(bill_id.0);
        outcome.committed += self.dispatch::<Bill>(ctx, bill_id.0, command)?;
        let plan = plan_bill_payment(SourceDocument::new(DocumentKind::BillPayment, bill_id.0), amount)?;
        outcome.committed += self
            .post_journal(ctx, payment_id, &plan)
            .after_commit(bill_id.0, "payment posting")?;
        Ok(outcome.with_status(preview.status()))
    }

    /// Void a bill, reverse its posting and release its purchase order
    /// quantities.
    #[tracing::instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, bill_id = %bill_id), err)]
    pub fn void_bill(
        &self,
        ctx: &CommandContext,
        bill_id: BillId,
        reason: Option<String>,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let bill = self.load_existing::<Bill>(tenant_id, bill_id.0, "bill")?;
        if bill.status().is_postable() {
            // Reversing the receipt takes the received stock back out.
            let empty = PostingPlan {
                journal: None,
                movements: Vec::new(),
            };
            self.ensure_stock(ctx, bill_source(bill_id), &empty)?;
        }

        let mut outcome = Outcome::new(bill_id.0);
        outcome.committed += self.dispatch::<Bill>(
            ctx,
            bill_id.0,
            BillCommand::VoidBill(VoidBill {
                tenant_id,
                bill_id,
                reason,
                occurred_at: ctx.at,
            }),
        )?;
        outcome.committed += self
            .repost(ctx, bill_source(bill_id), None, "bill voided")
            .after_commit(bill_id.0, "posting reversal")?;
        if let Some(po_id) = bill.purchase_order_id() {
            let synced = self.sync_billed(ctx, po_id, bill_id, &HashMap::new());
            outcome.best_effort("purchase order billed quantities", synced);
        }
        Ok(outcome.with_status(BillStatus::Void))
    }

    pub(crate) fn bill_plan(&self, tenant_id: TenantId, bill: &Bill) -> LifecycleResult<PostingPlan> {
        let lines = bill.document_lines();
        let items = self.item_policies(tenant_id, &lines)?;
        let warehouse_id = bill.warehouse_id().unwrap_or_else(|| WarehouseId::main(tenant_id));
        Ok(plan_bill(
            bill_source(bill.id_typed()),
            &lines,
            bill.totals(),
            &items,
            warehouse_id,
        )?)
    }

    fn resolve_bill_lines(
        &self,
        tenant_id: TenantId,
        inputs: &[BillLineInput],
    ) -> LifecycleResult<Vec<BillLine>> {
        let plain: Vec<LineInput> = inputs.iter().map(|i| i.line.clone()).collect();
        let resolved = self.resolve_lines(tenant_id, &plain, PriceBasis::Cost)?;
        Ok(resolved
            .into_iter()
            .zip(inputs)
            .map(|(line, input)| BillLine {
                line,
                po_line_id: input.po_line_id,
            })
            .collect())
    }

    fn billable_order(
        &self,
        tenant_id: TenantId,
        po_id: PurchaseOrderId,
        supplier_id: PartyId,
    ) -> LifecycleResult<PurchaseOrder> {
        let order = self.load_existing::<PurchaseOrder>(tenant_id, po_id.0, "purchase order")?;
        if order.supplier_id() != Some(supplier_id) {
            return Err(DomainError::validation("bill supplier differs from the purchase order").into());
        }
        if !order.is_billable() {
            return Err(DomainError::invariant(format!(
                "purchase order is {} and cannot be billed",
                status_str(&order.status())
            ))
            .into());
        }
        Ok(order)
    }

    /// Record what one bill bills against its purchase order. Only that
    /// bill's share is replaced; an empty map releases it.
    fn sync_billed(
        &self,
        ctx: &CommandContext,
        po_id: PurchaseOrderId,
        bill_id: BillId,
        quantities: &HashMap<Uuid, i64>,
    ) -> LifecycleResult<usize> {
        let mut billed: Vec<BilledQuantity> = quantities
            .iter()
            .map(|(line_id, quantity)| BilledQuantity {
                line_id: *line_id,
                quantity: *quantity,
            })
            .collect();
        billed.sort_by_key(|b| b.line_id);
        self.dispatch::<PurchaseOrder>(
            ctx,
            po_id.0,
            PurchaseOrderCommand::SyncBilledQuantities(SyncBilledQuantities {
                tenant_id: ctx.tenant_id,
                order_id: po_id,
                bill_id,
                billed,
                occurred_at: ctx.at,
            }),
        )
    }
}

/// Each referenced order line must exist, carry the same product and have
/// enough unbilled quantity. An existing bill's own recorded share counts as
/// available to it.
fn ensure_within_order(
    order: &PurchaseOrder,
    lines: &[BillLine],
    bill_id: Option<BillId>,
) -> LifecycleResult<()> {
    let mut requested: HashMap<Uuid, i64> = HashMap::new();
    for l in lines {
        let Some(po_line_id) = l.po_line_id else {
            continue;
        };
        let po_line = order
            .lines()
            .iter()
            .find(|p| p.line_id == po_line_id)
            .ok_or_else(|| DomainError::not_found(format!("purchase order line {po_line_id}")))?;
        if po_line.product_id != l.line.product_id {
            return Err(DomainError::validation(format!(
                "bill line product differs from purchase order line {po_line_id}"
            ))
            .into());
        }
        *requested.entry(po_line_id).or_insert(0) += l.line.quantity;
    }
    for (po_line_id, quantity) in requested {
        let remaining = order.remaining_quantity(po_line_id).unwrap_or(0)
            + bill_id.map_or(0, |id| order.billed_by(id, po_line_id));
        if quantity > remaining {
            return Err(DomainError::invariant(format!(
                "cannot bill {quantity} of purchase order line {po_line_id}: only {remaining} unbilled"
            ))
            .into());
        }
    }
    Ok(())
}

fn open_command(ctx: &CommandContext, bill_id: BillId) -> BillCommand {
    BillCommand::OpenBill(OpenBill {
        tenant_id: ctx.tenant_id,
        bill_id,
        occurred_at: ctx.at,
    })
}
