//! Sales returns: goods coming back against an issued invoice.
//!
//! Completing a return refunds the prorated net, tax and discount of the
//! returned quantities, priced against the invoice as it stands at
//! completion. The part covered by the invoice's balance reduces the
//! receivable; the rest becomes a customer credit note.

use serde_json::Value as JsonValue;

use ledgerdesk_accounting::{DocumentKind, SourceDocument};
use ledgerdesk_core::{AggregateId, Amount, DomainError};
use ledgerdesk_events::{EventBus, EventEnvelope, execute};
use ledgerdesk_invoicing::{
    ApplySalesReturn, CancelSalesReturn, CompleteSalesReturn, CreateSalesReturn, Invoice,
    InvoiceCommand, ReturnedQuantity, SalesReturn, SalesReturnCommand, SalesReturnId,
    SalesReturnStatus,
};
use ledgerdesk_parties::{CreditNoteId, CreditNoteKind};
use ledgerdesk_posting::{
    PostingRecord, PostingRecordId, RefundSplit, ReturnLineShare, plan_sales_return, return_shares,
    split_refund,
};

use super::error::AfterCommit;
use super::inputs::NewSalesReturn;
use super::{CommandContext, Lifecycle, LifecycleResult, Outcome, required, status_str};
use crate::event_store::EventStore;

pub(crate) fn sales_return_source(return_id: SalesReturnId) -> SourceDocument {
    SourceDocument::new(DocumentKind::SalesReturn, return_id.0)
}

impl<S, B> Lifecycle<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    #[tracing::instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, invoice_id = %input.invoice_id), err)]
    pub fn create_sales_return(
        &self,
        ctx: &CommandContext,
        input: NewSalesReturn,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let invoice = self.load_existing::<Invoice>(tenant_id, input.invoice_id.0, "invoice")?;
        if !invoice.status().is_postable() {
            return Err(DomainError::invariant(format!(
                "invoice is {} and cannot take returns",
                status_str(&invoice.status())
            ))
            .into());
        }
        let requested: Vec<_> = input.lines.iter().map(|l| (l.line_id, l.quantity)).collect();
        let shares = return_shares(
            invoice.lines(),
            invoice.totals(),
            &requested,
            invoice.returned_quantities(),
        )?;

        let return_id = input.return_id.unwrap_or_else(|| SalesReturnId(AggregateId::new()));
        let warehouse_id = match input.warehouse_id {
            Some(w) => w,
            None => required(invoice.warehouse_id(), "warehouse")?,
        };
        let (sales_return, committed) = self.dispatch_loaded::<SalesReturn>(
            ctx,
            return_id.0,
            SalesReturnCommand::CreateSalesReturn(CreateSalesReturn {
                tenant_id,
                return_id,
                number: input.number,
                invoice_id: input.invoice_id,
                customer_id: required(invoice.customer_id(), "customer")?,
                warehouse_id,
                return_date: input.return_date,
                reason: input.reason,
                lines: shares,
                occurred_at: ctx.at,
            }),
        )?;

        if !input.complete {
            return Ok(Outcome {
                committed,
                ..Outcome::new(return_id.0).with_status(sales_return.status())
            });
        }
        let mut outcome = self
            .complete_sales_return(ctx, return_id)
            .after_commit(return_id.0, "completion")?;
        outcome.committed += committed;
        Ok(outcome)
    }

    /// Complete a draft return: apply it to the invoice, issue a credit note
    /// for any excess, restock and post. Calling it again on a completed
    /// return finishes whatever steps did not land.
    #[tracing::instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, return_id = %return_id), err)]
    pub fn complete_sales_return(
        &self,
        ctx: &CommandContext,
        return_id: SalesReturnId,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let sales_return = self.load_existing::<SalesReturn>(tenant_id, return_id.0, "sales return")?;
        let invoice_id = required(sales_return.invoice_id(), "invoice")?;
        let customer_id = required(sales_return.customer_id(), "customer")?;
        let invoice = self.load_existing::<Invoice>(tenant_id, invoice_id.0, "invoice")?;
        let source = sales_return_source(return_id);

        let resuming = sales_return.status() == SalesReturnStatus::Completed;
        let (shares, split, credit_note_id) = if resuming {
            let split = RefundSplit {
                applied: sales_return.applied(),
                excess: sales_return.excess(),
            };
            (sales_return.lines().to_vec(), split, sales_return.credit_note_id())
        } else {
            // The invoice may have been edited since the draft was taken.
            if !invoice.status().is_postable() {
                return Err(DomainError::invariant(format!(
                    "invoice is {} and cannot take returns",
                    status_str(&invoice.status())
                ))
                .into());
            }
            let requested: Vec<_> = sales_return
                .lines()
                .iter()
                .map(|s| (s.line_id, s.quantity))
                .collect();
            let shares = return_shares(
                invoice.lines(),
                invoice.totals(),
                &requested,
                invoice.returned_quantities(),
            )?;
            let refund: Amount = shares.iter().map(ReturnLineShare::refund).sum();
            let split = split_refund(refund, invoice.balance_due());
            let credit_note_id =
                (split.excess > 0).then(|| CreditNoteId::for_source(tenant_id, source));
            (shares, split, credit_note_id)
        };

        let apply = InvoiceCommand::ApplySalesReturn(ApplySalesReturn {
            tenant_id,
            invoice_id,
            return_id: return_id.0,
            lines: shares
                .iter()
                .map(|s| ReturnedQuantity {
                    line_id: s.line_id,
                    quantity: s.quantity,
                })
                .collect(),
            applied: split.applied,
            occurred_at: ctx.at,
        });
        let mut settled = invoice.clone();
        execute(&mut settled, &apply)?;

        let warehouse_id = required(sales_return.warehouse_id(), "warehouse")?;
        let items = self.policies_for(tenant_id, shares.iter().map(|s| s.product_id))?;
        let plan = plan_sales_return(source, &shares, split, &items, warehouse_id)?;

        let mut outcome = Outcome::new(return_id.0);
        outcome.credit_note_id = credit_note_id.map(|id| id.0);
        if !resuming {
            outcome.committed += self.dispatch::<SalesReturn>(
                ctx,
                return_id.0,
                SalesReturnCommand::CompleteSalesReturn(CompleteSalesReturn {
                    tenant_id,
                    return_id,
                    lines: shares.clone(),
                    applied: split.applied,
                    excess: split.excess,
                    credit_note_id,
                    occurred_at: ctx.at,
                }),
            )?;
        }
        outcome.committed += self
            .dispatch::<Invoice>(ctx, invoice_id.0, apply)
            .after_commit(return_id.0, "invoice settlement")?;
        if let Some(credit_note_id) = credit_note_id {
            outcome.committed += self
                .issue_return_credit(
                    ctx,
                    credit_note_id,
                    CreditNoteKind::Customer,
                    customer_id,
                    source,
                    split.excess,
                    format!("excess refund on sales return {}", sales_return.number()),
                )
                .after_commit(return_id.0, "credit note")?;
        }
        if !self.is_posted(ctx, source)? {
            outcome.committed += self
                .repost(ctx, source, Some(&plan), "sales return completed")
                .after_commit(return_id.0, "posting")?;
        }
        self.close_order_when_paid(ctx, &settled, &mut outcome);
        Ok(outcome.with_status(SalesReturnStatus::Completed))
    }

    /// Cancel a return that has not been completed.
    pub fn cancel_sales_return(
        &self,
        ctx: &CommandContext,
        return_id: SalesReturnId,
    ) -> LifecycleResult<Outcome> {
        let (sales_return, committed) = self.dispatch_loaded::<SalesReturn>(
            ctx,
            return_id.0,
            SalesReturnCommand::CancelSalesReturn(CancelSalesReturn {
                tenant_id: ctx.tenant_id,
                return_id,
                occurred_at: ctx.at,
            }),
        )?;
        Ok(Outcome {
            committed,
            ..Outcome::new(return_id.0).with_status(sales_return.status())
        })
    }

    /// Whether `source` has an active posting.
    pub(crate) fn is_posted(&self, ctx: &CommandContext, source: SourceDocument) -> LifecycleResult<bool> {
        let record_id = PostingRecordId::for_source(ctx.tenant_id, source);
        let record = self.load::<PostingRecord>(ctx.tenant_id, record_id.0)?;
        Ok(record.active().is_some())
    }
}
