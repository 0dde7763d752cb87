use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerdesk_core::money::{allocate, prorate};
use ledgerdesk_core::{Amount, DomainError, DomainResult};
use ledgerdesk_pricing::{DocumentLine, DocumentTotals};
use ledgerdesk_products::ProductId;

/// A payment received on an invoice or made on a bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub amount: Amount,
    pub paid_on: NaiveDate,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

/// Status from the settled amount (payments, credits and applied returns).
pub fn payment_status(total: Amount, settled: Amount) -> PaymentStatus {
    if settled >= total {
        PaymentStatus::Paid
    } else if settled > 0 {
        PaymentStatus::PartiallyPaid
    } else {
        PaymentStatus::Unpaid
    }
}

/// Reject a settlement that would take `settled` past `total`.
pub fn ensure_within_balance(
    total: Amount,
    settled: Amount,
    amount: Amount,
    what: &str,
) -> DomainResult<()> {
    if amount <= 0 {
        return Err(DomainError::validation(format!("{what} must be positive")));
    }
    let balance = total - settled;
    if amount > balance {
        return Err(DomainError::invariant(format!(
            "{what} {amount} exceeds balance due {balance}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    None,
    Partial,
    Full,
}

/// Status from `(invoiced, returned)` quantities per line.
pub fn return_status<I>(lines: I) -> ReturnStatus
where
    I: IntoIterator<Item = (i64, i64)>,
{
    let mut any = false;
    let mut all = true;
    for (invoiced, returned) in lines {
        if returned > 0 {
            any = true;
        }
        if returned < invoiced {
            all = false;
        }
    }
    match (any, all) {
        (false, _) => ReturnStatus::None,
        (true, true) => ReturnStatus::Full,
        (true, false) => ReturnStatus::Partial,
    }
}

/// A refund divided between the document's outstanding balance and the excess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundSplit {
    /// Reduces what the party still owes (or is owed) on the document.
    pub applied: Amount,
    /// Becomes a credit note.
    pub excess: Amount,
}

pub fn split_refund(refund: Amount, outstanding: Amount) -> RefundSplit {
    let applied = refund.min(outstanding.max(0)).max(0);
    RefundSplit {
        applied,
        excess: refund - applied,
    }
}

/// Amounts a partial return takes from one document line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLineShare {
    pub line_id: Uuid,
    pub product_id: ProductId,
    pub quantity: i64,
    pub net: Amount,
    pub tax: Amount,
    /// Share of an after-tax document discount.
    pub discount: Amount,
}

impl ReturnLineShare {
    pub fn refund(&self) -> Amount {
        self.net + self.tax - self.discount
    }
}

/// Prorate the returned quantities against the document's priced lines.
///
/// `requested` is `(line_id, quantity)`; `already_returned` holds quantities
/// returned by earlier returns. An after-tax discount is spread in proportion
/// to line totals so that returning everything refunds exactly the total
/// minus shipping and adjustment.
pub fn return_shares(
    lines: &[DocumentLine],
    totals: &DocumentTotals,
    requested: &[(Uuid, i64)],
    already_returned: &HashMap<Uuid, i64>,
) -> DomainResult<Vec<ReturnLineShare>> {
    if requested.is_empty() {
        return Err(DomainError::validation("return must have at least one line"));
    }
    let after_tax = totals.discount_after_tax();
    let line_totals: Vec<Amount> = totals.lines.iter().map(|l| l.total()).collect();
    let line_discounts = allocate(after_tax, &line_totals);

    let mut seen = HashMap::new();
    let mut shares = Vec::with_capacity(requested.len());
    for &(line_id, quantity) in requested {
        if quantity <= 0 {
            return Err(DomainError::validation("returned quantity must be positive"));
        }
        if seen.insert(line_id, ()).is_some() {
            return Err(DomainError::validation(format!(
                "line {line_id} listed twice"
            )));
        }
        let idx = lines
            .iter()
            .position(|l| l.line_id == line_id)
            .ok_or_else(|| DomainError::not_found(format!("document line {line_id}")))?;
        let line = &lines[idx];
        let priced = totals
            .lines
            .get(idx)
            .ok_or_else(|| DomainError::invariant("line totals out of date"))?;

        let returned = already_returned.get(&line_id).copied().unwrap_or(0);
        let remaining = line.quantity - returned;
        if quantity > remaining {
            return Err(DomainError::invariant(format!(
                "cannot return {quantity} of line {line_id}: only {remaining} remaining"
            )));
        }

        // Taking the remainder by difference keeps a full return exact.
        let (net_before, tax_before) = priced.share(returned)?;
        let (net_after, tax_after) = priced.share(returned + quantity)?;
        let (net, tax) = (net_after - net_before, tax_after - tax_before);

        let line_discount = line_discounts.get(idx).copied().unwrap_or(0);
        let discount = if line_discount == 0 {
            0
        } else {
            prorate(line_discount, returned + quantity, line.quantity)?
                - prorate(line_discount, returned, line.quantity)?
        };

        shares.push(ReturnLineShare {
            line_id,
            product_id: line.product_id,
            quantity,
            net,
            tax,
            discount,
        });
    }
    Ok(shares)
}
