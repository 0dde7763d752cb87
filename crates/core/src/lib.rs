//! Domain foundation for the ledgerdesk crates.
//!
//! Pure domain primitives shared by every business module: identifiers, the
//! error model, aggregate traits and integer money arithmetic.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use money::{Amount, RATE_SCALE, RateBp};
pub use value_object::ValueObject;
