use serde::{Deserialize, Serialize};

use ledgerdesk_core::money::{allocate, apply_rate, checked_sum, extract_inclusive_tax, prorate};
use ledgerdesk_core::{Amount, DomainError, DomainResult, RateBp, ValueObject};

use crate::document::{DiscountPlacement, DocumentPricing, PricingLine};

/// Computed amounts of one line. `net` is always tax-exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotals {
    pub quantity: i64,
    pub tax_rate_bp: RateBp,
    /// `quantity × unit_price` as entered.
    pub gross: Amount,
    pub line_discount: Amount,
    /// Share of a before-tax document discount, on a net basis.
    pub document_discount: Amount,
    pub net: Amount,
    pub tax: Amount,
}

impl LineTotals {
    pub fn total(&self) -> Amount {
        self.net + self.tax
    }

    /// Net before the document discount share was taken off.
    pub fn net_before_document_discount(&self) -> Amount {
        self.net + self.document_discount
    }

    /// Net and tax attributable to `returned` of this line's units.
    pub fn share(&self, returned: i64) -> DomainResult<(Amount, Amount)> {
        if returned < 0 || returned > self.quantity {
            return Err(DomainError::validation(format!(
                "cannot take {returned} of {} units",
                self.quantity
            )));
        }
        if returned == self.quantity {
            return Ok((self.net, self.tax));
        }
        Ok((
            prorate(self.net, returned, self.quantity)?,
            prorate(self.tax, returned, self.quantity)?,
        ))
    }
}

/// Computed amounts of a document.
///
/// `total = subtotal − discount + tax_total + shipping + shipping_tax + adjustment`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub lines: Vec<LineTotals>,
    /// Sum of line nets before the document discount.
    pub subtotal: Amount,
    /// Document discount actually granted (net basis when before tax).
    pub discount: Amount,
    pub discount_placement: DiscountPlacement,
    /// Sum of line taxes (after reallocation for a before-tax discount).
    pub tax_total: Amount,
    /// Shipping, tax-exclusive.
    pub shipping: Amount,
    pub shipping_tax: Amount,
    pub adjustment: Amount,
    pub total: Amount,
}

impl ValueObject for LineTotals {}
impl ValueObject for DocumentTotals {}

impl DocumentTotals {
    /// All tax on the document, lines plus shipping.
    pub fn total_tax(&self) -> Amount {
        self.tax_total + self.shipping_tax
    }

    /// Discount that reduced the taxable base (zero when placed after tax).
    pub fn discount_before_tax(&self) -> Amount {
        match self.discount_placement {
            DiscountPlacement::BeforeTax => self.discount,
            DiscountPlacement::AfterTax => 0,
        }
    }

    pub fn discount_after_tax(&self) -> Amount {
        match self.discount_placement {
            DiscountPlacement::BeforeTax => 0,
            DiscountPlacement::AfterTax => self.discount,
        }
    }
}

struct Split {
    amount: Amount,
    net: Amount,
    tax: Amount,
}

fn split(amount: Amount, rate: RateBp, tax_inclusive: bool) -> DomainResult<Split> {
    let (net, tax) = if tax_inclusive {
        extract_inclusive_tax(amount, rate)?
    } else {
        (amount, apply_rate(amount, rate)?)
    };
    Ok(Split { amount, net, tax })
}

fn price_line(line: &PricingLine, tax_inclusive: bool) -> DomainResult<(Amount, Amount, Split)> {
    let gross = line.gross()?;
    let line_discount = line.discount.amount_on(gross)?;
    let s = split(gross - line_discount, line.tax_rate_bp, tax_inclusive)?;
    Ok((gross, line_discount, s))
}

/// Compute every amount of a document.
///
/// A before-tax document discount is spread over the lines in proportion to
/// their discounted amounts and each line's tax is recomputed on what is left.
/// An after-tax discount is taken off `subtotal + tax_total`.
pub fn compute_totals(doc: &DocumentPricing) -> DomainResult<DocumentTotals> {
    doc.validate()?;

    let mut priced = Vec::with_capacity(doc.lines.len());
    for line in &doc.lines {
        priced.push(price_line(line, doc.tax_inclusive)?);
    }

    let subtotal = checked_sum(priced.iter().map(|(_, _, s)| s.net), "subtotal")?;
    let mut lines: Vec<LineTotals> = doc
        .lines
        .iter()
        .zip(&priced)
        .map(|(line, (gross, line_discount, s))| LineTotals {
            quantity: line.quantity,
            tax_rate_bp: line.tax_rate_bp,
            gross: *gross,
            line_discount: *line_discount,
            document_discount: 0,
            net: s.net,
            tax: s.tax,
        })
        .collect();

    let discount = match doc.discount_placement {
        DiscountPlacement::BeforeTax if !doc.document_discount.is_none() => {
            // Inclusive documents discount the amounts customers see, then re-split.
            let amounts: Vec<Amount> = priced.iter().map(|(_, _, s)| s.amount).collect();
            let base = checked_sum(amounts.iter().copied(), "discount base")?;
            let granted = doc.document_discount.amount_on(base)?;
            let shares = allocate(granted, &amounts);

            let mut net_reduction = 0;
            for (lt, share) in lines.iter_mut().zip(shares) {
                let reduced = split(
                    lt.net + if doc.tax_inclusive { lt.tax } else { 0 } - share,
                    lt.tax_rate_bp,
                    doc.tax_inclusive,
                )?;
                lt.document_discount = lt.net - reduced.net;
                net_reduction += lt.document_discount;
                lt.net = reduced.net;
                lt.tax = reduced.tax;
            }
            net_reduction
        }
        DiscountPlacement::BeforeTax => 0,
        DiscountPlacement::AfterTax => {
            let base = subtotal + checked_sum(lines.iter().map(|l| l.tax), "tax total")?;
            doc.document_discount.amount_on(base)?
        }
    };

    let tax_total = checked_sum(lines.iter().map(|l| l.tax), "tax total")?;
    let shipping = split(doc.shipping, doc.shipping_tax_rate_bp, doc.tax_inclusive)?;

    let total = checked_sum(
        [
            subtotal,
            -discount,
            tax_total,
            shipping.net,
            shipping.tax,
            doc.adjustment,
        ],
        "document total",
    )?;
    if total < 0 {
        return Err(DomainError::validation("document total cannot be negative"));
    }

    Ok(DocumentTotals {
        lines,
        subtotal,
        discount,
        discount_placement: doc.discount_placement,
        tax_total,
        shipping: shipping.net,
        shipping_tax: shipping.tax,
        adjustment: doc.adjustment,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Discount;
    use proptest::prelude::*;

    fn line(quantity: i64, unit_price: Amount, tax_rate_bp: RateBp) -> PricingLine {
        PricingLine {
            quantity,
            unit_price,
            discount: Discount::None,
            tax_rate_bp,
        }
    }

    #[test]
    fn tax_inclusive_with_ten_percent_discount_before_tax() {
        let doc = DocumentPricing {
            tax_inclusive: true,
            lines: vec![line(2, 5_500, 1_000)],
            document_discount: Discount::Percent(1_000),
            discount_placement: DiscountPlacement::BeforeTax,
            ..Default::default()
        };

        let t = compute_totals(&doc).unwrap();
        assert_eq!(t.subtotal, 10_000);
        assert_eq!(t.discount, 1_000);
        assert_eq!(t.tax_total, 900);
        assert_eq!(t.total, 9_900);
        assert_eq!(t.lines[0].net, 9_000);
        assert_eq!(t.lines[0].tax, 900);
    }

    #[test]
    fn exclusive_fixed_discount_reallocates_tax_proportionally() {
        let doc = DocumentPricing {
            tax_inclusive: false,
            lines: vec![line(1, 10_000, 1_000), line(1, 5_000, 0)],
            document_discount: Discount::Amount(1_500),
            discount_placement: DiscountPlacement::BeforeTax,
            shipping: 1_000,
            shipping_tax_rate_bp: 1_000,
            adjustment: -50,
        };

        let t = compute_totals(&doc).unwrap();
        assert_eq!(t.subtotal, 15_000);
        assert_eq!(t.lines[0].document_discount, 1_000);
        assert_eq!(t.lines[1].document_discount, 500);
        assert_eq!(t.lines[0].tax, 900);
        assert_eq!(t.lines[1].tax, 0);
        assert_eq!(t.shipping_tax, 100);
        assert_eq!(t.total, 15_000 - 1_500 + 900 + 1_000 + 100 - 50);
    }

    #[test]
    fn discount_after_tax_leaves_taxes_untouched() {
        let doc = DocumentPricing {
            lines: vec![line(1, 10_000, 1_000), line(1, 5_000, 0)],
            document_discount: Discount::Percent(1_000),
            discount_placement: DiscountPlacement::AfterTax,
            ..Default::default()
        };

        let t = compute_totals(&doc).unwrap();
        assert_eq!(t.tax_total, 1_000);
        assert_eq!(t.discount, 1_600);
        assert_eq!(t.total, 14_400);
        assert_eq!(t.discount_before_tax(), 0);
        assert_eq!(t.discount_after_tax(), 1_600);
    }

    #[test]
    fn inclusive_shipping_is_split_into_net_and_tax() {
        let doc = DocumentPricing {
            tax_inclusive: true,
            lines: vec![line(1, 1_100, 1_000)],
            shipping: 550,
            shipping_tax_rate_bp: 1_000,
            ..Default::default()
        };

        let t = compute_totals(&doc).unwrap();
        assert_eq!(t.shipping, 500);
        assert_eq!(t.shipping_tax, 50);
        assert_eq!(t.total, 1_650);
    }

    #[test]
    fn line_discount_applies_before_tax() {
        let mut l = line(4, 2_500, 2_000);
        l.discount = Discount::Percent(5_000);
        let doc = DocumentPricing {
            lines: vec![l],
            ..Default::default()
        };

        let t = compute_totals(&doc).unwrap();
        assert_eq!(t.lines[0].gross, 10_000);
        assert_eq!(t.lines[0].line_discount, 5_000);
        assert_eq!(t.lines[0].net, 5_000);
        assert_eq!(t.lines[0].tax, 1_000);
        assert_eq!(t.total, 6_000);
    }

    #[test]
    fn negative_total_is_rejected() {
        let doc = DocumentPricing {
            lines: vec![line(1, 100, 0)],
            adjustment: -101,
            ..Default::default()
        };
        assert!(matches!(compute_totals(&doc), Err(DomainError::Validation(_))));
    }

    #[test]
    fn share_prorates_partial_returns() {
        let doc = DocumentPricing {
            lines: vec![line(3, 1_000, 1_000)],
            ..Default::default()
        };
        let t = compute_totals(&doc).unwrap();
        assert_eq!(t.lines[0].share(1).unwrap(), (1_000, 100));
        assert_eq!(t.lines[0].share(3).unwrap(), (3_000, 300));
        assert!(t.lines[0].share(4).is_err());
    }

    fn arb_line() -> impl Strategy<Value = PricingLine> {
        (1i64..50, 0i64..100_000, 0u32..3_000, prop_oneof![
            Just(Discount::None),
            (0u32..=10_000).prop_map(Discount::Percent),
            (0i64..200_000).prop_map(Discount::Amount),
        ])
            .prop_map(|(quantity, unit_price, tax_rate_bp, discount)| PricingLine {
                quantity,
                unit_price,
                discount,
                tax_rate_bp,
            })
    }

    proptest! {
        #[test]
        fn total_identity_holds(
            tax_inclusive in any::<bool>(),
            lines in proptest::collection::vec(arb_line(), 1..8),
            doc_discount in prop_oneof![
                Just(Discount::None),
                (0u32..=10_000).prop_map(Discount::Percent),
                (0i64..500_000).prop_map(Discount::Amount),
            ],
            after_tax in any::<bool>(),
            shipping in 0i64..50_000,
            shipping_rate in 0u32..3_000,
            adjustment in 0i64..1_000,
        ) {
            let doc = DocumentPricing {
                tax_inclusive,
                lines,
                document_discount: doc_discount,
                discount_placement: if after_tax { DiscountPlacement::AfterTax } else { DiscountPlacement::BeforeTax },
                shipping,
                shipping_tax_rate_bp: shipping_rate,
                adjustment,
            };
            let t = compute_totals(&doc).unwrap();

            prop_assert_eq!(
                t.total,
                t.subtotal - t.discount + t.tax_total + t.shipping + t.shipping_tax + t.adjustment
            );
            let line_sum: i64 = t.lines.iter().map(|l| l.total()).sum();
            prop_assert_eq!(
                t.total,
                line_sum + t.shipping + t.shipping_tax + t.adjustment - t.discount_after_tax()
            );
            prop_assert!(t.lines.iter().all(|l| l.net >= 0 && l.tax >= 0));
        }
    }
}
