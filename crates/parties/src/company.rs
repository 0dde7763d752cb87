//! The tenant's own company profile and its document defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, RATE_SCALE, RateBp, TenantId};
use ledgerdesk_events::Event;
use ledgerdesk_pricing::DiscountPlacement;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub AggregateId);

impl CompanyId {
    /// One profile per tenant.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self(AggregateId::derived(tenant_id, "parties.company", "profile"))
    }
}

impl core::fmt::Display for CompanyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Pricing settings applied to a new document that does not choose its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDefaults {
    pub tax_inclusive: bool,
    pub discount_placement: DiscountPlacement,
    pub default_tax_rate_bp: RateBp,
}

impl Default for DocumentDefaults {
    fn default() -> Self {
        Self {
            tax_inclusive: false,
            discount_placement: DiscountPlacement::BeforeTax,
            default_tax_rate_bp: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    /// ISO 4217 code, e.g. `USD`.
    pub currency: String,
    pub tax_number: Option<String>,
    pub address: Option<String>,
    pub defaults: DocumentDefaults,
}

impl CompanyProfile {
    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("company name cannot be empty"));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DomainError::validation(
                "currency must be a three-letter ISO code",
            ));
        }
        if self.defaults.default_tax_rate_bp as i64 > RATE_SCALE {
            return Err(DomainError::validation("default tax rate cannot exceed 100%"));
        }
        Ok(())
    }
}

/// Aggregate root: Company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Company {
    id: CompanyId,
    tenant_id: Option<TenantId>,
    profile: CompanyProfile,
    version: u64,
    created: bool,
}

impl Company {
    pub fn empty(id: CompanyId) -> Self {
        Self {
            id,
            tenant_id: None,
            profile: CompanyProfile::default(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CompanyId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn profile(&self) -> &CompanyProfile {
        &self.profile
    }

    /// Defaults for new documents; zeroed settings before the profile exists.
    pub fn defaults(&self) -> DocumentDefaults {
        self.profile.defaults
    }
}

impl AggregateRoot for Company {
    type Id = CompanyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: SaveCompanyProfile. Creates the profile on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveCompanyProfile {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub profile: CompanyProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyCommand {
    SaveCompanyProfile(SaveCompanyProfile),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRegistered {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub profile: CompanyProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfileUpdated {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub profile: CompanyProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyEvent {
    CompanyRegistered(CompanyRegistered),
    CompanyProfileUpdated(CompanyProfileUpdated),
}

impl Event for CompanyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CompanyEvent::CompanyRegistered(_) => "parties.company.registered",
            CompanyEvent::CompanyProfileUpdated(_) => "parties.company.profile_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CompanyEvent::CompanyRegistered(e) => e.occurred_at,
            CompanyEvent::CompanyProfileUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Company {
    type Command = CompanyCommand;
    type Event = CompanyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CompanyEvent::CompanyRegistered(e) => {
                self.id = e.company_id;
                self.tenant_id = Some(e.tenant_id);
                self.profile = e.profile.clone();
                self.created = true;
            }
            CompanyEvent::CompanyProfileUpdated(e) => {
                self.profile = e.profile.clone();
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CompanyCommand::SaveCompanyProfile(cmd) => self.handle_save(cmd),
        }
    }
}

impl Company {
    fn handle_save(&self, cmd: &SaveCompanyProfile) -> Result<Vec<CompanyEvent>, DomainError> {
        if self.created && self.tenant_id != Some(cmd.tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if cmd.company_id != CompanyId::for_tenant(cmd.tenant_id) {
            return Err(DomainError::invariant("company_id mismatch"));
        }

        let mut profile = cmd.profile.clone();
        profile.name = profile.name.trim().to_string();
        profile.currency = profile.currency.trim().to_ascii_uppercase();
        profile.validate()?;

        if !self.created {
            return Ok(vec![CompanyEvent::CompanyRegistered(CompanyRegistered {
                tenant_id: cmd.tenant_id,
                company_id: cmd.company_id,
                profile,
                occurred_at: cmd.occurred_at,
            })]);
        }
        if profile == self.profile {
            return Ok(vec![]);
        }
        Ok(vec![CompanyEvent::CompanyProfileUpdated(CompanyProfileUpdated {
            tenant_id: cmd.tenant_id,
            company_id: cmd.company_id,
            profile,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdesk_events::execute;

    fn profile() -> CompanyProfile {
        CompanyProfile {
            name: "Northwind Ltd".into(),
            currency: "usd".into(),
            tax_number: Some("GB123".into()),
            address: None,
            defaults: DocumentDefaults {
                tax_inclusive: true,
                discount_placement: DiscountPlacement::AfterTax,
                default_tax_rate_bp: 2_000,
            },
        }
    }

    fn save(tenant_id: TenantId, profile: CompanyProfile) -> CompanyCommand {
        CompanyCommand::SaveCompanyProfile(SaveCompanyProfile {
            tenant_id,
            company_id: CompanyId::for_tenant(tenant_id),
            profile,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn first_save_registers_then_updates() {
        let tenant_id = TenantId::new();
        let mut company = Company::empty(CompanyId::for_tenant(tenant_id));

        let events = execute(&mut company, &save(tenant_id, profile())).unwrap();
        assert!(matches!(events[0], CompanyEvent::CompanyRegistered(_)));
        assert_eq!(company.profile().currency, "USD");
        assert!(company.defaults().tax_inclusive);

        let mut changed = profile();
        changed.name = "Northwind Group".into();
        let events = execute(&mut company, &save(tenant_id, changed)).unwrap();
        assert!(matches!(events[0], CompanyEvent::CompanyProfileUpdated(_)));
        assert_eq!(company.profile().name, "Northwind Group");
        assert_eq!(company.version(), 2);
    }

    #[test]
    fn unchanged_profile_emits_nothing() {
        let tenant_id = TenantId::new();
        let mut company = Company::empty(CompanyId::for_tenant(tenant_id));
        execute(&mut company, &save(tenant_id, profile())).unwrap();
        let events = execute(&mut company, &save(tenant_id, profile())).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn invalid_currency_or_rate_is_rejected() {
        let tenant_id = TenantId::new();
        let company = Company::empty(CompanyId::for_tenant(tenant_id));

        let mut bad = profile();
        bad.currency = "dollars".into();
        assert!(matches!(
            company.handle(&save(tenant_id, bad)),
            Err(DomainError::Validation(_))
        ));

        let mut bad = profile();
        bad.defaults.default_tax_rate_bp = 12_000;
        assert!(company.handle(&save(tenant_id, bad)).is_err());
    }

    #[test]
    fn profile_id_is_bound_to_tenant() {
        let tenant_id = TenantId::new();
        let company = Company::empty(CompanyId::for_tenant(tenant_id));
        let cmd = CompanyCommand::SaveCompanyProfile(SaveCompanyProfile {
            tenant_id: TenantId::new(),
            company_id: CompanyId::for_tenant(tenant_id),
            profile: profile(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            company.handle(&cmd),
            Err(DomainError::InvariantViolation(_))
        ));
    }
}
