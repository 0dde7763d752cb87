//! `ledgerdesk-auth`: token validation and role-based permission checks.
//!
//! Nothing here knows about HTTP or storage. The API decodes a bearer token
//! into [`JwtClaims`], resolves a [`Principal`] and checks one [`Permission`]
//! per operation.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use principal::{Principal, TenantMembership};
pub use roles::{Role, permissions_for};
