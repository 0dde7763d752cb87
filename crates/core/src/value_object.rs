//! Value object marker: equality by value, not identity.

/// Marker trait for immutable values compared by their attributes.
///
/// Document totals, account references and pricing inputs are value objects:
/// two instances with the same fields are interchangeable. To "change" one,
/// build a new instance.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
