//! Line items as stored on sales and purchase documents.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerdesk_core::{Amount, DomainError, DomainResult, RateBp, ValueObject};
use ledgerdesk_products::ProductId;

use crate::document::{Discount, DiscountPlacement, DocumentPricing, PricingLine};
use crate::totals::{DocumentTotals, compute_totals};

/// One line of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub line_id: Uuid,
    pub product_id: ProductId,
    #[serde(default)]
    pub description: String,
    pub quantity: i64,
    pub unit_price: Amount,
    #[serde(default)]
    pub discount: Discount,
    pub tax_rate_bp: RateBp,
}

impl DocumentLine {
    pub fn pricing_line(&self) -> PricingLine {
        PricingLine {
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount: self.discount,
            tax_rate_bp: self.tax_rate_bp,
        }
    }
}

/// Document-level pricing settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PricingSettings {
    pub tax_inclusive: bool,
    #[serde(default)]
    pub document_discount: Discount,
    #[serde(default)]
    pub discount_placement: DiscountPlacement,
    #[serde(default)]
    pub shipping: Amount,
    #[serde(default)]
    pub shipping_tax_rate_bp: RateBp,
    #[serde(default)]
    pub adjustment: Amount,
}

impl ValueObject for DocumentLine {}
impl ValueObject for PricingSettings {}

impl PricingSettings {
    pub fn pricing_for(&self, lines: &[DocumentLine]) -> DocumentPricing {
        DocumentPricing {
            tax_inclusive: self.tax_inclusive,
            lines: lines.iter().map(DocumentLine::pricing_line).collect(),
            document_discount: self.document_discount,
            discount_placement: self.discount_placement,
            shipping: self.shipping,
            shipping_tax_rate_bp: self.shipping_tax_rate_bp,
            adjustment: self.adjustment,
        }
    }
}

/// A document needs at least one line and line ids are unique.
pub fn validate_lines(lines: &[DocumentLine]) -> DomainResult<()> {
    if lines.is_empty() {
        return Err(DomainError::validation("document must have at least one line"));
    }
    let mut seen = HashSet::with_capacity(lines.len());
    for line in lines {
        if !seen.insert(line.line_id) {
            return Err(DomainError::validation(format!(
                "duplicate line id {}",
                line.line_id
            )));
        }
    }
    Ok(())
}

/// Validate the lines and compute the document's totals.
///
/// `DocumentTotals::lines` is index-aligned with `lines`.
pub fn price_document(lines: &[DocumentLine], settings: &PricingSettings) -> DomainResult<DocumentTotals> {
    validate_lines(lines)?;
    compute_totals(&settings.pricing_for(lines))
}
