use chrono::{DateTime, Utc};

/// A domain event: an immutable, versioned, append-only fact.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "invoicing.invoice.issued").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;
}
