use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role name as carried in a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permissions a role grants. Unknown roles grant nothing.
///
/// Approving a cross-warehouse purchase return is kept apart from writing
/// returns, so the clerk who raised a return cannot approve it.
pub fn permissions_for(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "admin" => vec![Permission::ALL],
        "accountant" => vec![
            Permission::DOCUMENTS_READ,
            Permission::COMPANY_MANAGE,
            Permission::ACCOUNTS_MANAGE,
            Permission::LEDGER_READ,
            Permission::AUDIT_READ,
            Permission::INVOICES_WRITE,
            Permission::INVOICES_PAY,
            Permission::BILLS_WRITE,
            Permission::BILLS_PAY,
            Permission::RETURNS_WRITE,
            Permission::CREDIT_NOTES_MANAGE,
        ],
        "clerk" => vec![
            Permission::DOCUMENTS_READ,
            Permission::PRODUCTS_WRITE,
            Permission::PARTIES_WRITE,
            Permission::STOCK_ADJUST,
            Permission::SALES_WRITE,
            Permission::INVOICES_WRITE,
            Permission::PURCHASING_WRITE,
            Permission::BILLS_WRITE,
            Permission::RETURNS_WRITE,
        ],
        "approver" => vec![
            Permission::DOCUMENTS_READ,
            Permission::PURCHASE_RETURNS_APPROVE,
        ],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clerk_cannot_approve_returns() {
        let perms = permissions_for(&Role::new("clerk"));
        assert!(perms.contains(&Permission::RETURNS_WRITE));
        assert!(!perms.contains(&Permission::PURCHASE_RETURNS_APPROVE));
    }

    #[test]
    fn unknown_role_grants_nothing() {
        assert!(permissions_for(&Role::new("intern")).is_empty());
    }
}
