//! Permission guard run by every handler before it reads or dispatches.

use ledgerdesk_auth::{Permission, authorize};

use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

pub fn require(principal: &PrincipalContext, permission: Permission) -> Result<(), ApiError> {
    authorize(principal.principal(), &permission).map_err(|e| ApiError::Forbidden(e.to_string()))
}
