use serde::{Deserialize, Serialize};

use ledgerdesk_core::{TenantId, UserId};

use crate::{JwtClaims, Permission, Role, permissions_for};

/// What a principal may do inside one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

/// A resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    /// Membership comes from the token's roles; the token's tenant is the
    /// active one.
    pub fn from_claims(claims: &JwtClaims) -> Self {
        let mut permissions: Vec<Permission> = Vec::new();
        for role in &claims.roles {
            for p in permissions_for(role) {
                if !permissions.contains(&p) {
                    permissions.push(p);
                }
            }
        }
        Self {
            user_id: claims.sub,
            active_tenant_id: claims.tenant_id,
            membership: TenantMembership {
                tenant_id: claims.tenant_id,
                roles: claims.roles.clone(),
                permissions,
            },
        }
    }
}
