//! Document pricing: line discounts, tax-inclusive/exclusive splitting,
//! document discounts before or after tax, shipping tax and adjustments.
//!
//! Pure functions over integer minor units; every sales and purchase document
//! computes its totals here so the arithmetic is written once.

pub mod document;
pub mod lines;
pub mod totals;

pub use document::{Discount, DiscountPlacement, DocumentPricing, PricingLine};
pub use lines::{DocumentLine, PricingSettings, price_document, validate_lines};
pub use totals::{DocumentTotals, LineTotals, compute_totals};
