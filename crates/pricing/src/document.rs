use serde::{Deserialize, Serialize};

use ledgerdesk_core::{Amount, DomainError, DomainResult, RATE_SCALE, RateBp, ValueObject};
use ledgerdesk_core::money::{apply_rate, checked_mul};

/// Discount on a line or on the whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    #[default]
    None,
    /// Percentage in basis points.
    Percent(RateBp),
    /// Fixed amount in minor units; capped at the amount it applies to.
    Amount(Amount),
}

impl Discount {
    pub fn validate(&self, what: &str) -> DomainResult<()> {
        match *self {
            Discount::None => Ok(()),
            Discount::Percent(bp) if bp as i64 > RATE_SCALE => Err(DomainError::validation(
                format!("{what} percentage cannot exceed 100%"),
            )),
            Discount::Amount(a) if a < 0 => Err(DomainError::validation(format!(
                "{what} amount cannot be negative"
            ))),
            _ => Ok(()),
        }
    }

    /// Discount amount against `base`, never more than `base`.
    pub fn amount_on(&self, base: Amount) -> DomainResult<Amount> {
        let raw = match *self {
            Discount::None => 0,
            Discount::Percent(bp) => apply_rate(base, bp)?,
            Discount::Amount(a) => a,
        };
        Ok(raw.clamp(0, base.max(0)))
    }

    pub fn is_none(&self) -> bool {
        match *self {
            Discount::None => true,
            Discount::Percent(bp) => bp == 0,
            Discount::Amount(a) => a == 0,
        }
    }
}

/// Where the document-level discount is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountPlacement {
    /// Reduces the taxable base; line taxes are recomputed.
    #[default]
    BeforeTax,
    /// Reduces the amount payable; taxes are unchanged.
    AfterTax,
}

/// One priced line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingLine {
    pub quantity: i64,
    /// Unit price in minor units; includes tax when the document is tax-inclusive.
    pub unit_price: Amount,
    #[serde(default)]
    pub discount: Discount,
    pub tax_rate_bp: RateBp,
}

impl PricingLine {
    pub fn gross(&self) -> DomainResult<Amount> {
        checked_mul(self.quantity, self.unit_price, "line amount")
    }
}

/// Pricing inputs of a whole document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentPricing {
    /// Entered prices and shipping already contain tax.
    pub tax_inclusive: bool,
    pub lines: Vec<PricingLine>,
    #[serde(default)]
    pub document_discount: Discount,
    #[serde(default)]
    pub discount_placement: DiscountPlacement,
    #[serde(default)]
    pub shipping: Amount,
    #[serde(default)]
    pub shipping_tax_rate_bp: RateBp,
    /// Signed rounding or manual adjustment added to the total.
    #[serde(default)]
    pub adjustment: Amount,
}

impl ValueObject for Discount {}
impl ValueObject for PricingLine {}
impl ValueObject for DocumentPricing {}

pub(crate) fn validate_rate(rate: RateBp, what: &str) -> DomainResult<()> {
    if rate as i64 > RATE_SCALE {
        return Err(DomainError::validation(format!("{what} cannot exceed 100%")));
    }
    Ok(())
}

impl DocumentPricing {
    pub fn validate(&self) -> DomainResult<()> {
        for (idx, line) in self.lines.iter().enumerate() {
            let n = idx + 1;
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "line {n}: quantity must be positive"
                )));
            }
            if line.unit_price < 0 {
                return Err(DomainError::validation(format!(
                    "line {n}: unit price cannot be negative"
                )));
            }
            validate_rate(line.tax_rate_bp, &format!("line {n}: tax rate"))?;
            line.discount.validate(&format!("line {n}: discount"))?;
        }
        self.document_discount.validate("document discount")?;
        if self.shipping < 0 {
            return Err(DomainError::validation("shipping cannot be negative"));
        }
        validate_rate(self.shipping_tax_rate_bp, "shipping tax rate")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_discount_is_capped_at_base() {
        assert_eq!(Discount::Amount(500).amount_on(300).unwrap(), 300);
        assert_eq!(Discount::Percent(2_500).amount_on(1_000).unwrap(), 250);
        assert_eq!(Discount::None.amount_on(1_000).unwrap(), 0);
    }

    #[test]
    fn discount_serializes_with_tag() {
        let json = serde_json::to_value(Discount::Percent(1_000)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "percent", "value": 1000}));
        let back: Discount = serde_json::from_value(serde_json::json!({"type": "none"})).unwrap();
        assert_eq!(back, Discount::None);
    }

    #[test]
    fn validation_rejects_out_of_range_inputs() {
        let mut doc = DocumentPricing {
            lines: vec![PricingLine {
                quantity: 1,
                unit_price: 100,
                discount: Discount::None,
                tax_rate_bp: 1_000,
            }],
            ..Default::default()
        };
        assert!(doc.validate().is_ok());

        doc.lines[0].quantity = 0;
        assert!(doc.validate().is_err());
        doc.lines[0].quantity = 1;

        doc.document_discount = Discount::Percent(10_001);
        assert!(doc.validate().is_err());
        doc.document_discount = Discount::None;

        doc.shipping = -1;
        assert!(doc.validate().is_err());
    }
}
