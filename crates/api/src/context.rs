use ledgerdesk_auth::{Principal, Role};
use ledgerdesk_core::{TenantId, UserId};
use ledgerdesk_infra::CommandContext;

/// Tenant context for a request, taken from the token and nowhere else.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Authenticated identity for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.principal.membership.roles
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Context stamped on every command this request dispatches.
    pub fn command_context(&self, tenant: &TenantContext) -> CommandContext {
        CommandContext::new(tenant.tenant_id(), self.user_id())
    }
}
