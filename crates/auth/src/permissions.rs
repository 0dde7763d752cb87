use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier, e.g. `invoices.write`.
///
/// `"*"` grants everything within the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ALL: Permission = Permission::from_static("*");

    pub const DOCUMENTS_READ: Permission = Permission::from_static("documents.read");
    pub const COMPANY_MANAGE: Permission = Permission::from_static("company.manage");
    pub const ACCOUNTS_MANAGE: Permission = Permission::from_static("accounts.manage");
    pub const LEDGER_READ: Permission = Permission::from_static("ledger.read");
    pub const AUDIT_READ: Permission = Permission::from_static("audit.read");

    pub const PRODUCTS_WRITE: Permission = Permission::from_static("products.write");
    pub const PARTIES_WRITE: Permission = Permission::from_static("parties.write");
    pub const STOCK_ADJUST: Permission = Permission::from_static("stock.adjust");

    pub const SALES_WRITE: Permission = Permission::from_static("sales.write");
    pub const INVOICES_WRITE: Permission = Permission::from_static("invoices.write");
    pub const INVOICES_PAY: Permission = Permission::from_static("invoices.pay");
    pub const PURCHASING_WRITE: Permission = Permission::from_static("purchasing.write");
    pub const BILLS_WRITE: Permission = Permission::from_static("bills.write");
    pub const BILLS_PAY: Permission = Permission::from_static("bills.pay");
    pub const RETURNS_WRITE: Permission = Permission::from_static("returns.write");
    pub const PURCHASE_RETURNS_APPROVE: Permission =
        Permission::from_static("purchase_returns.approve");
    pub const CREDIT_NOTES_MANAGE: Permission = Permission::from_static("credit_notes.manage");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
