use chrono::{DateTime, Utc};

use ledgerdesk_core::{TenantId, UserId};

/// Who is acting, for which tenant, and the timestamp stamped on every
/// command of one coordinated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub at: DateTime<Utc>,
}

impl CommandContext {
    pub fn new(tenant_id: TenantId, user_id: UserId) -> Self {
        Self {
            tenant_id,
            user_id: Some(user_id),
            at: Utc::now(),
        }
    }

    /// No human actor (seeding, background repair).
    pub fn system(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            user_id: None,
            at: Utc::now(),
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }
}
