//! Purchase returns: goods sent back to a supplier against an open bill.
//!
//! A return shipped from a warehouse other than the one the bill received
//! into waits for an approver before it can be completed.

use serde_json::Value as JsonValue;

use ledgerdesk_accounting::{DocumentKind, SourceDocument};
use ledgerdesk_core::{AggregateId, Amount, DomainError};
use ledgerdesk_events::{EventBus, EventEnvelope, execute};
use ledgerdesk_parties::{CreditNoteId, CreditNoteKind};
use ledgerdesk_posting::{
    RefundSplit, ReturnLineShare, plan_purchase_return, return_shares, split_refund,
};
use ledgerdesk_purchasing::{
    ApplyPurchaseReturn, ApprovePurchaseReturn, Bill, BillCommand, CancelPurchaseReturn,
    CompletePurchaseReturn, CreatePurchaseReturn, PurchaseReturn, PurchaseReturnCommand,
    PurchaseReturnId, PurchaseReturnStatus, RejectPurchaseReturn, ReturnedQuantity,
};

use super::error::AfterCommit;
use super::inputs::NewPurchaseReturn;
use super::{CommandContext, Lifecycle, LifecycleResult, Outcome, required, status_str, unauthorized};
use crate::event_store::EventStore;

pub(crate) fn purchase_return_source(return_id: PurchaseReturnId) -> SourceDocument {
    SourceDocument::new(DocumentKind::PurchaseReturn, return_id.0)
}

impl<S, B> Lifecycle<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    #[tracing::instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, bill_id = %input.bill_id), err)]
    pub fn create_purchase_return(
        &self,
        ctx: &CommandContext,
        input: NewPurchaseReturn,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let bill = self.load_existing::<Bill>(tenant_id, input.bill_id.0, "bill")?;
        if !bill.status().is_postable() {
            return Err(DomainError::invariant(format!(
                "bill is {} and cannot take returns",
                status_str(&bill.status())
            ))
            .into());
        }
        let requested: Vec<_> = input.lines.iter().map(|l| (l.line_id, l.quantity)).collect();
        let shares = return_shares(
            &bill.document_lines(),
            bill.totals(),
            &requested,
            bill.returned_quantities(),
        )?;

        let return_id = input.return_id.unwrap_or_else(|| PurchaseReturnId(AggregateId::new()));
        let bill_warehouse_id = required(bill.warehouse_id(), "warehouse")?;
        let (purchase_return, committed) = self.dispatch_loaded::<PurchaseReturn>(
            ctx,
            return_id.0,
            PurchaseReturnCommand::CreatePurchaseReturn(CreatePurchaseReturn {
                tenant_id,
                return_id,
                number: input.number,
                bill_id: input.bill_id,
                supplier_id: required(bill.supplier_id(), "supplier")?,
                warehouse_id: input.warehouse_id.unwrap_or(bill_warehouse_id),
                bill_warehouse_id,
                return_date: input.return_date,
                reason: input.reason,
                lines: shares,
                occurred_at: ctx.at,
            }),
        )?;

        if purchase_return.requires_approval() {
            tracing::info!(return_id = %return_id, "purchase return awaits approval");
        }
        if !input.complete || purchase_return.requires_approval() {
            return Ok(Outcome {
                committed,
                ..Outcome::new(return_id.0).with_status(purchase_return.status())
            });
        }
        let mut outcome = self
            .complete_purchase_return(ctx, return_id)
            .after_commit(return_id.0, "completion")?;
        outcome.committed += committed;
        Ok(outcome)
    }

    /// Approve or reject a return waiting on approval. The decision is
    /// recorded against the acting user.
    #[tracing::instrument(skip(self, ctx, note), fields(tenant_id = %ctx.tenant_id, return_id = %return_id), err)]
    pub fn decide_purchase_return(
        &self,
        ctx: &CommandContext,
        return_id: PurchaseReturnId,
        approve: bool,
        note: Option<String>,
    ) -> LifecycleResult<Outcome> {
        let user_id = ctx.user_id.ok_or_else(unauthorized)?;
        let command = if approve {
            PurchaseReturnCommand::ApprovePurchaseReturn(ApprovePurchaseReturn {
                tenant_id: ctx.tenant_id,
                return_id,
                approved_by: user_id,
                note,
                occurred_at: ctx.at,
            })
        } else {
            PurchaseReturnCommand::RejectPurchaseReturn(RejectPurchaseReturn {
                tenant_id: ctx.tenant_id,
                return_id,
                rejected_by: user_id,
                note,
                occurred_at: ctx.at,
            })
        };
        let (purchase_return, committed) =
            self.dispatch_loaded::<PurchaseReturn>(ctx, return_id.0, command)?;
        Ok(Outcome {
            committed,
            ..Outcome::new(return_id.0).with_status(purchase_return.status())
        })
    }

    /// Complete a draft or approved return: settle the bill, issue a supplier
    /// credit note for any excess, ship the stock out and post. Calling it
    /// again on a completed return finishes whatever steps did not land.
    #[tracing::instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id, return_id = %return_id), err)]
    pub fn complete_purchase_return(
        &self,
        ctx: &CommandContext,
        return_id: PurchaseReturnId,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let purchase_return =
            self.load_existing::<PurchaseReturn>(tenant_id, return_id.0, "purchase return")?;
        let bill_id = required(purchase_return.bill_id(), "bill")?;
        let supplier_id = required(purchase_return.supplier_id(), "supplier")?;
        let bill = self.load_existing::<Bill>(tenant_id, bill_id.0, "bill")?;
        let source = purchase_return_source(return_id);

        let resuming = purchase_return.status() == PurchaseReturnStatus::Completed;
        if !resuming && !purchase_return.can_complete() {
            return Err(DomainError::invariant(format!(
                "purchase return is {} and cannot be completed",
                status_str(&purchase_return.status())
            ))
            .into());
        }
        let (shares, split, credit_note_id) = if resuming {
            let split = RefundSplit {
                applied: purchase_return.applied(),
                excess: purchase_return.excess(),
            };
            (purchase_return.lines().to_vec(), split, purchase_return.credit_note_id())
        } else {
            // An approval can take a while; price against the bill as it is now.
            if !bill.status().is_postable() {
                return Err(DomainError::invariant(format!(
                    "bill is {} and cannot take returns",
                    status_str(&bill.status())
                ))
                .into());
            }
            let requested: Vec<_> = purchase_return
                .lines()
                .iter()
                .map(|s| (s.line_id, s.quantity))
                .collect();
            let shares = return_shares(
                &bill.document_lines(),
                bill.totals(),
                &requested,
                bill.returned_quantities(),
            )?;
            let refund: Amount = shares.iter().map(ReturnLineShare::refund).sum();
            let split = split_refund(refund, bill.balance_due());
            let credit_note_id =
                (split.excess > 0).then(|| CreditNoteId::for_source(tenant_id, source));
            (shares, split, credit_note_id)
        };

        let apply = BillCommand::ApplyPurchaseReturn(ApplyPurchaseReturn {
            tenant_id,
            bill_id,
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
        execute(&mut bill.clone(), &apply)?;

        let warehouse_id = required(purchase_return.warehouse_id(), "warehouse")?;
        let items =
            self.policies_for(tenant_id, shares.iter().map(|s| s.product_id))?;
        let plan = plan_purchase_return(source, &shares, split, &items, warehouse_id)?;
        let posted = self.is_posted(ctx, source)?;
        if !posted {
            self.ensure_stock(ctx, source, &plan)?;
        }

        let mut outcome = Outcome::new(return_id.0);
        outcome.credit_note_id = credit_note_id.map(|id| id.0);
        if !resuming {
            outcome.committed += self.dispatch::<PurchaseReturn>(
                ctx,
                return_id.0,
                PurchaseReturnCommand::CompletePurchaseReturn(CompletePurchaseReturn {
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
            .dispatch::<Bill>(ctx, bill_id.0, apply)
            .after_commit(return_id.0, "bill settlement")?;
        if let Some(credit_note_id) = credit_note_id {
            outcome.committed += self
                .issue_return_credit(
                    ctx,
                    credit_note_id,
                    CreditNoteKind::Supplier,
                    supplier_id,
                    source,
                    split.excess,
                    format!("excess refund on purchase return {}", purchase_return.number()),
                )
                .after_commit(return_id.0, "credit note")?;
        }
        if !posted {
            outcome.committed += self
                .repost(ctx, source, Some(&plan), "purchase return completed")
                .after_commit(return_id.0, "posting")?;
        }
        Ok(outcome.with_status(PurchaseReturnStatus::Completed))
    }

    pub fn cancel_purchase_return(
        &self,
        ctx: &CommandContext,
        return_id: PurchaseReturnId,
    ) -> LifecycleResult<Outcome> {
        let (purchase_return, committed) = self.dispatch_loaded::<PurchaseReturn>(
            ctx,
            return_id.0,
            PurchaseReturnCommand::CancelPurchaseReturn(CancelPurchaseReturn {
                tenant_id: ctx.tenant_id,
                return_id,
                occurred_at: ctx.at,
            }),
        )?;
        Ok(Outcome {
            committed,
            ..Outcome::new(return_id.0).with_status(purchase_return.status())
        })
    }
}
