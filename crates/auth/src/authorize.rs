use thiserror::Error;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Check one permission for a principal in its active tenant. Pure policy,
/// no IO.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let granted = principal
        .membership
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);
    if granted {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %principal.user_id,
            permission = %required,
            "permission denied"
        );
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JwtClaims, Role};
    use chrono::{Duration, Utc};
    use ledgerdesk_core::{TenantId, UserId};

    fn principal(roles: &[&'static str]) -> Principal {
        let now = Utc::now();
        Principal::from_claims(&JwtClaims {
            sub: UserId::new(),
            tenant_id: TenantId::new(),
            roles: roles.iter().map(|r| Role::new(*r)).collect(),
            issued_at: now,
            expires_at: now + Duration::minutes(5),
        })
    }

    #[test]
    fn admin_wildcard_allows_everything() {
        let p = principal(&["admin"]);
        assert!(authorize(&p, &Permission::PURCHASE_RETURNS_APPROVE).is_ok());
        assert!(authorize(&p, &Permission::new("anything.at_all")).is_ok());
    }

    #[test]
    fn roles_combine() {
        let p = principal(&["clerk", "approver"]);
        assert!(authorize(&p, &Permission::BILLS_WRITE).is_ok());
        assert!(authorize(&p, &Permission::PURCHASE_RETURNS_APPROVE).is_ok());
        assert_eq!(
            authorize(&p, &Permission::LEDGER_READ),
            Err(AuthzError::Forbidden("ledger.read".into()))
        );
    }

    #[test]
    fn membership_of_another_tenant_is_rejected() {
        let mut p = principal(&["admin"]);
        p.active_tenant_id = TenantId::new();
        assert_eq!(
            authorize(&p, &Permission::DOCUMENTS_READ),
            Err(AuthzError::TenantMismatch)
        );
    }
}
