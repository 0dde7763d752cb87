//! Customer invoice lifecycle: create, edit, issue, pay, void.
//!
//! An issued invoice posts AR, revenue, tax and shipping, plus COGS and a
//! stock issue for tracked products. Editing an issued or partially paid
//! invoice reverses that posting and posts the new figures.

use serde_json::Value as JsonValue;
use uuid::Uuid;

use ledgerdesk_accounting::{DocumentKind, SourceDocument};
use ledgerdesk_core::{AggregateId, DomainError, TenantId};
use ledgerdesk_events::{EventBus, EventEnvelope, execute};
use ledgerdesk_inventory::WarehouseId;
use ledgerdesk_invoicing::{
    CreateInvoice, Invoice, InvoiceCommand, InvoiceId, InvoiceStatus, IssueInvoice, RegisterPayment,
    UpdateInvoice, VoidInvoice,
};
use ledgerdesk_parties::PartyKind;
use ledgerdesk_posting::{Payment, PostingPlan, plan_invoice, plan_invoice_payment};
use ledgerdesk_sales::SalesOrder;

use super::catalog::PriceBasis;
use super::error::AfterCommit;
use super::inputs::{InvoiceChanges, NewInvoice, PaymentInput};
use super::{CommandContext, Lifecycle, LifecycleResult, Outcome, required, status_str};
use crate::event_store::EventStore;

pub(crate) fn invoice_source(invoice_id: InvoiceId) -> SourceDocument {
    SourceDocument::new(DocumentKind::Invoice, invoice_id.0)
}

impl<S, B> Lifecycle<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Create an invoice, optionally against a sales order and optionally
    /// issuing it in the same call.
    #[tracing::instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, number = %input.number), err)]
    pub fn create_invoice(&self, ctx: &CommandContext, input: NewInvoice) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        self.party_as(tenant_id, input.customer_id, PartyKind::Customer)?;
        if let Some(order_id) = input.sales_order_id {
            let order = self.load_existing::<SalesOrder>(tenant_id, order_id.0, "sales order")?;
            self.ensure_order_convertible(&order, input.customer_id)?;
        }
        let lines = self.resolve_lines(tenant_id, &input.lines, PriceBasis::Sale)?;
        let settings = match input.settings {
            Some(s) => s,
            None => self.default_settings(tenant_id)?,
        };

        let create = CreateInvoice {
            tenant_id,
            invoice_id: input.invoice_id.unwrap_or_else(|| InvoiceId(AggregateId::new())),
            number: input.number,
            customer_id: input.customer_id,
            sales_order_id: input.sales_order_id,
            warehouse_id: input.warehouse_id.unwrap_or_else(|| WarehouseId::main(tenant_id)),
            issue_date: input.issue_date,
            due_date: input.due_date,
            lines,
            settings,
            occurred_at: ctx.at,
        };
        self.create_invoice_from(ctx, create, input.issue)
    }

    /// Shared by direct creation and sales order conversion. When `issue` is
    /// set the whole result is previewed first so a stock shortfall rejects
    /// the request before anything is written.
    pub(crate) fn create_invoice_from(
        &self,
        ctx: &CommandContext,
        create: CreateInvoice,
        issue: bool,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let invoice_id = create.invoice_id;
        let order_id = create.sales_order_id;

        let mut preview = Invoice::empty(invoice_id);
        execute(&mut preview, &InvoiceCommand::CreateInvoice(create.clone()))?;
        let plan = if issue {
            execute(&mut preview, &issue_command(ctx, invoice_id))?;
            let plan = self.invoice_plan(tenant_id, &preview)?;
            self.ensure_stock(ctx, invoice_source(invoice_id), &plan)?;
            Some(plan)
        } else {
            None
        };

        let mut outcome = Outcome::new(invoice_id.0);
        let (invoice, committed) =
            self.dispatch_loaded::<Invoice>(ctx, invoice_id.0, InvoiceCommand::CreateInvoice(create))?;
        outcome.committed += committed;

        if let Some(order_id) = order_id {
            let linked = self.link_sales_order(ctx, order_id, &invoice);
            outcome.best_effort("sales order link", linked);
        }

        let Some(plan) = plan else {
            return Ok(outcome.with_status(invoice.status()));
        };
        outcome.committed += self
            .dispatch::<Invoice>(ctx, invoice_id.0, issue_command(ctx, invoice_id))
            .after_commit(invoice_id.0, "issue")?;
        outcome.committed += self
            .repost(ctx, invoice_source(invoice_id), Some(&plan), "invoice issued")
            .after_commit(invoice_id.0, "posting")?;
        Ok(outcome.with_status(InvoiceStatus::Issued))
    }

    /// Edit an invoice. Fields left unset keep their values. Paid and void
    /// invoices are rejected; a posted invoice is re-posted.
    #[tracing::instrument(skip(self, ctx, changes), fields(tenant_id = %ctx.tenant_id, invoice_id = %invoice_id), err)]
    pub fn update_invoice(
        &self,
        ctx: &CommandContext,
        invoice_id: InvoiceId,
        changes: InvoiceChanges,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let invoice = self.load_existing::<Invoice>(tenant_id, invoice_id.0, "invoice")?;
        if !invoice.is_editable() {
            return Err(DomainError::invariant(format!(
                "invoice is {} and cannot be edited",
                status_str(&invoice.status())
            ))
            .into());
        }

        let customer_id = match changes.customer_id {
            Some(customer_id) => {
                self.party_as(tenant_id, customer_id, PartyKind::Customer)?;
                customer_id
            }
            None => required(invoice.customer_id(), "customer")?,
        };
        let lines = match &changes.lines {
            Some(lines) => self.resolve_lines(tenant_id, lines, PriceBasis::Sale)?,
            None => invoice.lines().to_vec(),
        };
        let command = InvoiceCommand::UpdateInvoice(UpdateInvoice {
            tenant_id,
            invoice_id,
            customer_id,
            warehouse_id: match changes.warehouse_id {
                Some(w) => w,
                None => required(invoice.warehouse_id(), "warehouse")?,
            },
            issue_date: match changes.issue_date {
                Some(d) => d,
                None => required(invoice.issue_date(), "issue date")?,
            },
            due_date: match changes.due_date {
                Some(d) => d,
                None => required(invoice.due_date(), "due date")?,
            },
            lines,
            settings: changes.settings.unwrap_or_else(|| invoice.settings().clone()),
            occurred_at: ctx.at,
        });

        let mut preview = invoice.clone();
        if execute(&mut preview, &command)?.is_empty() {
            return Ok(Outcome::new(invoice_id.0).with_status(invoice.status()));
        }
        let plan = if preview.status().is_postable() {
            let plan = self.invoice_plan(tenant_id, &preview)?;
            self.ensure_stock(ctx, invoice_source(invoice_id), &plan)?;
            Some(plan)
        } else {
            None
        };

        let mut outcome = Outcome::new(invoice_id.0);
        let (updated, committed) = self.dispatch_loaded::<Invoice>(ctx, invoice_id.0, command)?;
        outcome.committed += committed;
        if let Some(plan) = &plan {
            outcome.committed += self
                .repost(ctx, invoice_source(invoice_id), Some(plan), "invoice updated")
                .after_commit(invoice_id.0, "posting")?;
        }
        if let Some(order_id) = updated.sales_order_id() {
            let mirrored = self.mirror_sales_order(ctx, order_id, &updated);
            outcome.best_effort("sales order mirror", mirrored);
        }
        Ok(outcome.with_status(updated.status()))
    }

    #[tracing::instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, invoice_id = %invoice_id), err)]
    pub fn issue_invoice(&self, ctx: &CommandContext, invoice_id: InvoiceId) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let invoice = self.load_existing::<Invoice>(tenant_id, invoice_id.0, "invoice")?;
        let command = issue_command(ctx, invoice_id);

        let mut preview = invoice.clone();
        execute(&mut preview, &command)?;
        let plan = self.invoice_plan(tenant_id, &preview)?;
        self.ensure_stock(ctx, invoice_source(invoice_id), &plan)?;

        let mut outcome = Outcome::new(invoice_id.0);
        outcome.committed += self.dispatch::<Invoice>(ctx, invoice_id.0, command)?;
        outcome.committed += self
            .repost(ctx, invoice_source(invoice_id), Some(&plan), "invoice issued")
            .after_commit(invoice_id.0, "posting")?;
        Ok(outcome.with_status(preview.status()))
    }

    /// Register a payment and post it (cash against receivables). Paying an
    /// order-backed invoice in full closes the order.
    #[tracing::instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, invoice_id = %invoice_id, amount = input.amount), err)]
    pub fn record_invoice_payment(
        &self,
        ctx: &CommandContext,
        invoice_id: InvoiceId,
        input: PaymentInput,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let invoice = self.load_existing::<Invoice>(tenant_id, invoice_id.0, "invoice")?;
        let payment = Payment {
            payment_id: input.payment_id.unwrap_or_else(Uuid::now_v7),
            amount: input.amount,
            paid_on: input.paid_on.unwrap_or_else(|| ctx.at.date_naive()),
            method: input.method,
            reference: input.reference,
        };
        let payment_id = payment.payment_id;
        let amount = payment.amount;
        let command = InvoiceCommand::RegisterPayment(RegisterPayment {
            tenant_id,
            invoice_id,
            payment,
            occurred_at: ctx.at,
        });

        let mut preview = invoice.clone();
        execute(&mut preview, &command)?;

        let mut outcome = Outcome::new(invoice_id.0);
        outcome.committed += self.dispatch::<Invoice>(ctx, invoice_id.0, command)?;
        let plan = plan_invoice_payment(
            SourceDocument::new(DocumentKind::InvoicePayment, invoice_id.0),
            amount,
        )?;
        outcome.committed += self
            .post_journal(ctx, payment_id, &plan)
            .after_commit(invoice_id.0, "payment posting")?;
        self.close_order_when_paid(ctx, &preview, &mut outcome);
        Ok(outcome.with_status(preview.status()))
    }

    /// Void an invoice and reverse everything it posted. Only invoices with
    /// nothing settled or returned can be voided.
    #[tracing::instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, invoice_id = %invoice_id), err)]
    pub fn void_invoice(
        &self,
        ctx: &CommandContext,
        invoice_id: InvoiceId,
        reason: Option<String>,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let invoice = self.load_existing::<Invoice>(tenant_id, invoice_id.0, "invoice")?;

        let mut outcome = Outcome::new(invoice_id.0);
        outcome.committed += self.dispatch::<Invoice>(
            ctx,
            invoice_id.0,
            InvoiceCommand::VoidInvoice(VoidInvoice {
                tenant_id,
                invoice_id,
                reason,
                occurred_at: ctx.at,
            }),
        )?;
        outcome.committed += self
            .repost(ctx, invoice_source(invoice_id), None, "invoice voided")
            .after_commit(invoice_id.0, "posting reversal")?;
        if let Some(order_id) = invoice.sales_order_id() {
            let unlinked = self.unlink_sales_order(ctx, order_id, invoice_id.0);
            outcome.best_effort("sales order unlink", unlinked);
        }
        Ok(outcome.with_status(InvoiceStatus::Void))
    }

    pub(crate) fn invoice_plan(&self, tenant_id: TenantId, invoice: &Invoice) -> LifecycleResult<PostingPlan> {
        let items = self.item_policies(tenant_id, invoice.lines())?;
        let warehouse_id = invoice
            .warehouse_id()
            .unwrap_or_else(|| WarehouseId::main(tenant_id));
        Ok(plan_invoice(
            invoice_source(invoice.id_typed()),
            invoice.lines(),
            invoice.totals(),
            &items,
            warehouse_id,
        )?)
    }

    /// Close the sales order behind a fully settled invoice.
    pub(crate) fn close_order_when_paid(&self, ctx: &CommandContext, invoice: &Invoice, outcome: &mut Outcome) {
        if invoice.status() != InvoiceStatus::Paid {
            return;
        }
        if let Some(order_id) = invoice.sales_order_id() {
            let closed = self.close_sales_order(ctx, order_id);
            outcome.best_effort("sales order close", closed);
        }
    }
}

fn issue_command(ctx: &CommandContext, invoice_id: InvoiceId) -> InvoiceCommand {
    InvoiceCommand::IssueInvoice(IssueInvoice {
        tenant_id: ctx.tenant_id,
        invoice_id,
        occurred_at: ctx.at,
    })
}
