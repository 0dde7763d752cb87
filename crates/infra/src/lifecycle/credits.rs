//! Credit notes: issuing them from excess returns and spending them on later
//! invoices or bills of the same party.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use ledgerdesk_accounting::{DocumentKind, SourceDocument};
use ledgerdesk_core::{Amount, DomainError};
use ledgerdesk_events::{EventBus, EventEnvelope, execute};
use ledgerdesk_invoicing::{ApplyCredit, Invoice, InvoiceCommand, InvoiceId};
use ledgerdesk_parties::{
    ApplyCreditNote, CreditNote, CreditNoteCommand, CreditNoteId, CreditNoteKind, IssueCreditNote,
    PartyId, VoidCreditNote,
};
use ledgerdesk_posting::plan_credit_application;
use ledgerdesk_purchasing::{ApplyBillCredit, Bill, BillCommand, BillId};

use super::bills::bill_source;
use super::error::AfterCommit;
use super::invoices::invoice_source;
use super::{CommandContext, Lifecycle, LifecycleResult, Outcome};
use crate::event_store::EventStore;

/// Document a credit note is spent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CreditTarget {
    Invoice(InvoiceId),
    Bill(BillId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyCreditInput {
    /// Makes a retried request a no-op.
    #[serde(default)]
    pub application_id: Option<Uuid>,
    pub target: CreditTarget,
    pub amount: Amount,
}

impl<S, B> Lifecycle<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Spend part of a credit note on an open document of the same party.
    /// Customer credit settles invoices; supplier credit settles bills.
    #[tracing::instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id, credit_note_id = %credit_note_id, amount = input.amount), err)]
    pub fn apply_credit_note(
        &self,
        ctx: &CommandContext,
        credit_note_id: CreditNoteId,
        input: ApplyCreditInput,
    ) -> LifecycleResult<Outcome> {
        let tenant_id = ctx.tenant_id;
        let note = self.load_existing::<CreditNote>(tenant_id, credit_note_id.0, "credit note")?;
        let application_id = input.application_id.unwrap_or_else(Uuid::now_v7);
        let amount = input.amount;

        let (target, party_id, customer) = match input.target {
            CreditTarget::Invoice(invoice_id) => {
                let invoice = self.load_existing::<Invoice>(tenant_id, invoice_id.0, "invoice")?;
                (invoice_source(invoice_id), invoice.customer_id(), true)
            }
            CreditTarget::Bill(bill_id) => {
                let bill = self.load_existing::<Bill>(tenant_id, bill_id.0, "bill")?;
                (bill_source(bill_id), bill.supplier_id(), false)
            }
        };
        let expected = if customer {
            CreditNoteKind::Customer
        } else {
            CreditNoteKind::Supplier
        };
        if note.kind() != expected {
            return Err(DomainError::validation(format!(
                "a {} credit note cannot settle a {}",
                kind_str(note.kind()),
                target.kind.as_str()
            ))
            .into());
        }
        if party_id.is_none() || note.party_id() != party_id {
            return Err(DomainError::validation("credit note belongs to a different party").into());
        }

        let settle = self.settle_command(ctx, input.target, application_id, credit_note_id, amount);
        let already_applied = note
            .applications()
            .iter()
            .any(|a| a.application_id == application_id);
        if !already_applied {
            let mut preview = note.clone();
            execute(
                &mut preview,
                &CreditNoteCommand::ApplyCreditNote(ApplyCreditNote {
                    tenant_id,
                    credit_note_id,
                    application_id,
                    target,
                    amount,
                    occurred_at: ctx.at,
                }),
            )?;
        }
        self.preview_settlement(ctx, &settle)?;

        let mut outcome = Outcome::new(credit_note_id.0);
        if !already_applied {
            outcome.committed += self.dispatch::<CreditNote>(
                ctx,
                credit_note_id.0,
                CreditNoteCommand::ApplyCreditNote(ApplyCreditNote {
                    tenant_id,
                    credit_note_id,
                    application_id,
                    target,
                    amount,
                    occurred_at: ctx.at,
                }),
            )?;
        }
        outcome.committed += self
            .dispatch_settlement(ctx, settle)
            .after_commit(credit_note_id.0, "document settlement")?;
        let plan = plan_credit_application(
            SourceDocument::new(DocumentKind::CreditNote, credit_note_id.0),
            customer,
            amount,
        )?;
        outcome.committed += self
            .post_journal(ctx, application_id, &plan)
            .after_commit(credit_note_id.0, "credit posting")?;

        if let CreditTarget::Invoice(invoice_id) = input.target {
            let invoice = self.load::<Invoice>(tenant_id, invoice_id.0)?;
            self.close_order_when_paid(ctx, &invoice, &mut outcome);
        }
        let note = self.load::<CreditNote>(tenant_id, credit_note_id.0)?;
        Ok(outcome.with_status(note.status()))
    }

    /// Void a credit note nothing has been applied from.
    pub fn void_credit_note(
        &self,
        ctx: &CommandContext,
        credit_note_id: CreditNoteId,
        reason: Option<String>,
    ) -> LifecycleResult<Outcome> {
        let (note, committed) = self.dispatch_loaded::<CreditNote>(
            ctx,
            credit_note_id.0,
            CreditNoteCommand::VoidCreditNote(VoidCreditNote {
                tenant_id: ctx.tenant_id,
                credit_note_id,
                reason,
                occurred_at: ctx.at,
            }),
        )?;
        Ok(Outcome {
            committed,
            ..Outcome::new(credit_note_id.0).with_status(note.status())
        })
    }

    /// Issue the credit note for a return's excess refund, unless it was
    /// issued already.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn issue_return_credit(
        &self,
        ctx: &CommandContext,
        credit_note_id: CreditNoteId,
        kind: CreditNoteKind,
        party_id: PartyId,
        source: SourceDocument,
        amount: Amount,
        reason: String,
    ) -> LifecycleResult<usize> {
        let existing = self.load::<CreditNote>(ctx.tenant_id, credit_note_id.0)?;
        if existing.is_created() {
            return Ok(0);
        }
        self.dispatch::<CreditNote>(
            ctx,
            credit_note_id.0,
            CreditNoteCommand::IssueCreditNote(IssueCreditNote {
                tenant_id: ctx.tenant_id,
                credit_note_id,
                kind,
                party_id,
                source: Some(source),
                amount,
                reason: Some(reason),
                occurred_at: ctx.at,
            }),
        )
    }

    fn settle_command(
        &self,
        ctx: &CommandContext,
        target: CreditTarget,
        application_id: Uuid,
        credit_note_id: CreditNoteId,
        amount: Amount,
    ) -> Settlement {
        match target {
            CreditTarget::Invoice(invoice_id) => Settlement::Invoice(
                invoice_id,
                InvoiceCommand::ApplyCredit(ApplyCredit {
                    tenant_id: ctx.tenant_id,
                    invoice_id,
                    application_id,
                    credit_note_id: credit_note_id.0,
                    amount,
                    occurred_at: ctx.at,
                }),
            ),
            CreditTarget::Bill(bill_id) => Settlement::Bill(
                bill_id,
                BillCommand::ApplyBillCredit(ApplyBillCredit {
                    tenant_id: ctx.tenant_id,
                    bill_id,
                    application_id,
                    credit_note_id: credit_note_id.0,
                    amount,
                    occurred_at: ctx.at,
                }),
            ),
        }
    }

    fn preview_settlement(&self, ctx: &CommandContext, settle: &Settlement) -> LifecycleResult<()> {
        match settle {
            Settlement::Invoice(id, command) => {
                let mut invoice = self.load::<Invoice>(ctx.tenant_id, id.0)?;
                execute(&mut invoice, command)?;
            }
            Settlement::Bill(id, command) => {
                let mut bill = self.load::<Bill>(ctx.tenant_id, id.0)?;
                execute(&mut bill, command)?;
            }
        }
        Ok(())
    }

    fn dispatch_settlement(&self, ctx: &CommandContext, settle: Settlement) -> LifecycleResult<usize> {
        match settle {
            Settlement::Invoice(id, command) => self.dispatch::<Invoice>(ctx, id.0, command),
            Settlement::Bill(id, command) => self.dispatch::<Bill>(ctx, id.0, command),
        }
    }
}

enum Settlement {
    Invoice(InvoiceId, InvoiceCommand),
    Bill(BillId, BillCommand),
}

fn kind_str(kind: CreditNoteKind) -> &'static str {
    match kind {
        CreditNoteKind::Customer => "customer",
        CreditNoteKind::Supplier => "supplier",
    }
}
