//! Chart of accounts (one per tenant) and heuristic account resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ledgerdesk_events::Event;

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    /// Assets and expenses grow on the debit side.
    pub fn is_debit_normal(self) -> bool {
        matches!(self, AccountKind::Asset | AccountKind::Expense)
    }
}

/// Finer classification used to find the account for a posting role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountSubType {
    Cash,
    Bank,
    AccountsReceivable,
    Inventory,
    InputTaxReceivable,
    SupplierCredits,
    AccountsPayable,
    SalesTaxPayable,
    CustomerCredits,
    Equity,
    SalesRevenue,
    ShippingIncome,
    SalesReturns,
    SalesDiscounts,
    PurchaseDiscounts,
    Adjustments,
    CostOfGoodsSold,
    FreightIn,
    Expense,
}

/// Account identifier + metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    #[serde(default)]
    pub sub_type: Option<AccountSubType>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Account {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        kind: AccountKind,
        sub_type: Option<AccountSubType>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
            sub_type,
            active: true,
        }
    }
}

/// The purpose an account serves in a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingRole {
    Cash,
    AccountsReceivable,
    AccountsPayable,
    Inventory,
    SalesRevenue,
    SalesReturns,
    SalesDiscounts,
    PurchaseDiscounts,
    CostOfGoodsSold,
    SalesTaxPayable,
    InputTax,
    ShippingIncome,
    FreightIn,
    PurchaseExpense,
    CustomerCredits,
    SupplierCredits,
    Adjustments,
}

struct RoleHints {
    sub_types: &'static [AccountSubType],
    codes: &'static [&'static str],
    keywords: &'static [&'static str],
    kind: AccountKind,
}

impl PostingRole {
    fn hints(self) -> RoleHints {
        use AccountKind as K;
        use AccountSubType as S;
        let (sub_types, codes, keywords, kind): (&[S], &[&str], &[&str], K) = match self {
            PostingRole::Cash => (&[S::Cash, S::Bank], &["1000", "1010"], &["cash", "bank"], K::Asset),
            PostingRole::AccountsReceivable => (
                &[S::AccountsReceivable],
                &["1100", "1200"],
                &["accounts receivable", "receivable", "debtors"],
                K::Asset,
            ),
            PostingRole::Inventory => (&[S::Inventory], &["1300", "1400"], &["inventory", "stock"], K::Asset),
            PostingRole::InputTax => (
                &[S::InputTaxReceivable],
                &["1500"],
                &["input tax", "tax receivable", "vat receivable"],
                K::Asset,
            ),
            PostingRole::SupplierCredits => (
                &[S::SupplierCredits],
                &["1600"],
                &["supplier credit", "vendor credit"],
                K::Asset,
            ),
            PostingRole::AccountsPayable => (
                &[S::AccountsPayable],
                &["2000", "2100"],
                &["accounts payable", "creditors", "trade payable"],
                K::Liability,
            ),
            PostingRole::SalesTaxPayable => (
                &[S::SalesTaxPayable],
                &["2200"],
                &["sales tax", "output tax", "tax payable", "vat payable"],
                K::Liability,
            ),
            PostingRole::CustomerCredits => (
                &[S::CustomerCredits],
                &["2300"],
                &["customer credit", "unapplied credit", "customer deposit"],
                K::Liability,
            ),
            PostingRole::SalesRevenue => (&[S::SalesRevenue], &["4000"], &["sales revenue", "sales", "revenue"], K::Revenue),
            PostingRole::ShippingIncome => (
                &[S::ShippingIncome],
                &["4100"],
                &["shipping income", "freight income", "shipping"],
                K::Revenue,
            ),
            PostingRole::SalesReturns => (&[S::SalesReturns], &["4200"], &["sales return", "returns"], K::Revenue),
            PostingRole::SalesDiscounts => (
                &[S::SalesDiscounts],
                &["4300"],
                &["sales discount", "discounts allowed", "discount"],
                K::Revenue,
            ),
            PostingRole::PurchaseDiscounts => (
                &[S::PurchaseDiscounts],
                &["4400"],
                &["purchase discount", "discounts received"],
                K::Revenue,
            ),
            PostingRole::Adjustments => (
                &[S::Adjustments],
                &["4900"],
                &["adjustment", "rounding"],
                K::Revenue,
            ),
            PostingRole::CostOfGoodsSold => (
                &[S::CostOfGoodsSold],
                &["5000"],
                &["cost of goods", "cogs", "cost of sales"],
                K::Expense,
            ),
            PostingRole::FreightIn => (
                &[S::FreightIn],
                &["5100"],
                &["freight", "shipping expense", "carriage"],
                K::Expense,
            ),
            PostingRole::PurchaseExpense => (
                &[S::Expense],
                &["5200", "6000"],
                &["purchases", "expense"],
                K::Expense,
            ),
        };
        RoleHints {
            sub_types,
            codes,
            keywords,
            kind,
        }
    }
}

/// Find the active account for a posting role.
///
/// Matches by sub_type first, then by well-known code, then by
/// case-insensitive name keyword among accounts of the expected kind.
pub fn resolve_account(accounts: &[Account], role: PostingRole) -> Result<Account, DomainError> {
    let hints = role.hints();
    let active = || accounts.iter().filter(|a| a.active);

    for st in hints.sub_types {
        if let Some(a) = active().find(|a| a.sub_type == Some(*st)) {
            return Ok(a.clone());
        }
    }

    for code in hints.codes {
        if let Some(a) = active().find(|a| a.code == *code && a.kind == hints.kind) {
            return Ok(a.clone());
        }
    }

    for kw in hints.keywords {
        if let Some(a) = active()
            .filter(|a| a.kind == hints.kind && a.sub_type.is_none())
            .find(|a| a.name.to_lowercase().contains(kw))
        {
            return Ok(a.clone());
        }
    }

    Err(DomainError::validation(format!(
        "no active account found for posting role {role:?}"
    )))
}

/// The chart seeded for a new tenant.
pub fn standard_chart() -> Vec<Account> {
    use AccountKind as K;
    use AccountSubType as S;
    [
        ("1000", "Cash", K::Asset, S::Cash),
        ("1100", "Accounts Receivable", K::Asset, S::AccountsReceivable),
        ("1300", "Inventory", K::Asset, S::Inventory),
        ("1500", "Input Tax Receivable", K::Asset, S::InputTaxReceivable),
        ("1600", "Supplier Credits", K::Asset, S::SupplierCredits),
        ("2000", "Accounts Payable", K::Liability, S::AccountsPayable),
        ("2200", "Sales Tax Payable", K::Liability, S::SalesTaxPayable),
        ("2300", "Customer Credits", K::Liability, S::CustomerCredits),
        ("3000", "Owner's Equity", K::Equity, S::Equity),
        ("4000", "Sales Revenue", K::Revenue, S::SalesRevenue),
        ("4100", "Shipping Income", K::Revenue, S::ShippingIncome),
        ("4200", "Sales Returns", K::Revenue, S::SalesReturns),
        ("4300", "Sales Discounts", K::Revenue, S::SalesDiscounts),
        ("4400", "Purchase Discounts", K::Revenue, S::PurchaseDiscounts),
        ("4900", "Rounding Adjustments", K::Revenue, S::Adjustments),
        ("5000", "Cost of Goods Sold", K::Expense, S::CostOfGoodsSold),
        ("5100", "Freight In", K::Expense, S::FreightIn),
        ("5200", "Purchases Expense", K::Expense, S::Expense),
    ]
    .into_iter()
    .map(|(code, name, kind, st)| Account::new(code, name, kind, Some(st)))
    .collect()
}

/// Chart identifier (one chart per tenant).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartId(pub AggregateId);

impl ChartId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// The tenant's chart.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self(AggregateId::derived(tenant_id, "accounting.chart", "default"))
    }
}

impl core::fmt::Display for ChartId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: ChartOfAccounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartOfAccounts {
    id: ChartId,
    tenant_id: Option<TenantId>,
    accounts: Vec<Account>,
    version: u64,
    created: bool,
}

impl ChartOfAccounts {
    pub fn empty(id: ChartId) -> Self {
        Self {
            id,
            tenant_id: None,
            accounts: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn account(&self, code: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.code == code)
    }

    pub fn resolve(&self, role: PostingRole) -> Result<Account, DomainError> {
        resolve_account(&self.accounts, role)
    }
}

impl AggregateRoot for ChartOfAccounts {
    type Id = ChartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedStandardChart {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAccount {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub account: Account,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateAccount {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartCommand {
    SeedStandardChart(SeedStandardChart),
    AddAccount(AddAccount),
    DeactivateAccount(DeactivateAccount),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSeeded {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub accounts: Vec<Account>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAdded {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub account: Account,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDeactivated {
    pub tenant_id: TenantId,
    pub chart_id: ChartId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartEvent {
    ChartSeeded(ChartSeeded),
    AccountAdded(AccountAdded),
    AccountDeactivated(AccountDeactivated),
}

impl ChartEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            ChartEvent::ChartSeeded(e) => e.tenant_id,
            ChartEvent::AccountAdded(e) => e.tenant_id,
            ChartEvent::AccountDeactivated(e) => e.tenant_id,
        }
    }
}

impl Event for ChartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ChartEvent::ChartSeeded(_) => "accounting.chart.seeded",
            ChartEvent::AccountAdded(_) => "accounting.chart.account_added",
            ChartEvent::AccountDeactivated(_) => "accounting.chart.account_deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ChartEvent::ChartSeeded(e) => e.occurred_at,
            ChartEvent::AccountAdded(e) => e.occurred_at,
            ChartEvent::AccountDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ChartOfAccounts {
    type Command = ChartCommand;
    type Event = ChartEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        if !self.created {
            self.tenant_id = Some(event.tenant_id());
            self.created = true;
        }
        match event {
            ChartEvent::ChartSeeded(e) => {
                self.id = e.chart_id;
                self.accounts = e.accounts.clone();
            }
            ChartEvent::AccountAdded(e) => {
                self.id = e.chart_id;
                self.accounts.push(e.account.clone());
            }
            ChartEvent::AccountDeactivated(e) => {
                if let Some(a) = self.accounts.iter_mut().find(|a| a.code == e.code) {
                    a.active = false;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ChartCommand::SeedStandardChart(cmd) => self.handle_seed(cmd),
            ChartCommand::AddAccount(cmd) => self.handle_add(cmd),
            ChartCommand::DeactivateAccount(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl ChartOfAccounts {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_seed(&self, cmd: &SeedStandardChart) -> Result<Vec<ChartEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("chart of accounts already exists"));
        }

        Ok(vec![ChartEvent::ChartSeeded(ChartSeeded {
            tenant_id: cmd.tenant_id,
            chart_id: cmd.chart_id,
            accounts: standard_chart(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add(&self, cmd: &AddAccount) -> Result<Vec<ChartEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;

        let code = cmd.account.code.trim();
        if code.is_empty() {
            return Err(DomainError::validation("account code cannot be empty"));
        }
        if cmd.account.name.trim().is_empty() {
            return Err(DomainError::validation("account name cannot be empty"));
        }
        if self.account(code).is_some() {
            return Err(DomainError::conflict(format!("account code {code} already exists")));
        }

        let mut account = cmd.account.clone();
        account.code = code.to_string();
        account.active = true;

        Ok(vec![ChartEvent::AccountAdded(AccountAdded {
            tenant_id: cmd.tenant_id,
            chart_id: cmd.chart_id,
            account,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateAccount) -> Result<Vec<ChartEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found("chart of accounts"));
        }
        self.ensure_tenant(cmd.tenant_id)?;

        match self.account(&cmd.code) {
            None => Err(DomainError::not_found(format!("account {}", cmd.code))),
            Some(a) if !a.active => Err(DomainError::conflict("account is already inactive")),
            Some(_) => Ok(vec![ChartEvent::AccountDeactivated(AccountDeactivated {
                tenant_id: cmd.tenant_id,
                chart_id: cmd.chart_id,
                code: cmd.code.clone(),
                occurred_at: cmd.occurred_at,
            })]),
        }
    }
}
