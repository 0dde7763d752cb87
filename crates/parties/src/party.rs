use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ledgerdesk_events::Event;

/// Party identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub AggregateId);

impl PartyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Party kind: customer or supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Supplier,
}

impl PartyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PartyKind::Customer => "customer",
            PartyKind::Supplier => "supplier",
        }
    }
}

/// Party status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    Active,
    Suspended,
}

/// Contact information for a party.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_number: Option<String>,
}

/// Aggregate root: Party (customer or supplier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    id: PartyId,
    tenant_id: Option<TenantId>,
    kind: PartyKind,
    name: String,
    contact: ContactInfo,
    status: PartyStatus,
    version: u64,
    created: bool,
}

impl Party {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PartyId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: PartyKind::Customer,
            name: String::new(),
            contact: ContactInfo::default(),
            status: PartyStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PartyId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> PartyStatus {
        self.status
    }

    /// Suspended parties cannot transact.
    pub fn can_transact(&self) -> bool {
        self.created && self.status == PartyStatus::Active
    }

    /// Check this party can appear on a new document as `expected`.
    pub fn ensure_can_transact_as(&self, expected: PartyKind) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(expected.as_str()));
        }
        if self.kind != expected {
            return Err(DomainError::validation(format!(
                "party {} is not a {}",
                self.id,
                expected.as_str()
            )));
        }
        if self.status == PartyStatus::Suspended {
            return Err(DomainError::invariant(format!(
                "{} {} is suspended",
                expected.as_str(),
                self.id
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for Party {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new contact info (if None, keep existing).
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReactivateParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateParty {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyCommand {
    RegisterParty(RegisterParty),
    UpdateDetails(UpdateDetails),
    SuspendParty(SuspendParty),
    ReactivateParty(ReactivateParty),
}

/// Event: PartyRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRegistered {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartyUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyUpdated {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartySuspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySuspended {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartyReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyReactivated {
    pub tenant_id: TenantId,
    pub party_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyEvent {
    PartyRegistered(PartyRegistered),
    PartyUpdated(PartyUpdated),
    PartySuspended(PartySuspended),
    PartyReactivated(PartyReactivated),
}

impl Event for PartyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PartyEvent::PartyRegistered(_) => "parties.party.registered",
            PartyEvent::PartyUpdated(_) => "parties.party.updated",
            PartyEvent::PartySuspended(_) => "parties.party.suspended",
            PartyEvent::PartyReactivated(_) => "parties.party.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PartyEvent::PartyRegistered(e) => e.occurred_at,
            PartyEvent::PartyUpdated(e) => e.occurred_at,
            PartyEvent::PartySuspended(e) => e.occurred_at,
            PartyEvent::PartyReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Party {
    type Command = PartyCommand;
    type Event = PartyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PartyEvent::PartyRegistered(e) => {
                self.id = e.party_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.status = PartyStatus::Active;
                self.created = true;
            }
            PartyEvent::PartyUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
            }
            PartyEvent::PartySuspended(_) => {
                self.status = PartyStatus::Suspended;
            }
            PartyEvent::PartyReactivated(_) => {
                self.status = PartyStatus::Active;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PartyCommand::RegisterParty(cmd) => self.handle_register(cmd),
            PartyCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            PartyCommand::SuspendParty(cmd) => self.handle_suspend(cmd),
            PartyCommand::ReactivateParty(cmd) => self.handle_reactivate(cmd),
        }
    }
}

impl Party {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, party_id: PartyId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("party"));
        }
        self.ensure_tenant(tenant_id)?;
        if self.id != party_id {
            return Err(DomainError::invariant("party_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterParty) -> Result<Vec<PartyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("party already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![PartyEvent::PartyRegistered(PartyRegistered {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            kind: cmd.kind,
            name: cmd.name.trim().to_string(),
            contact: cmd.contact.clone().unwrap_or_default(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;

        let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let contact = cmd.contact.clone().unwrap_or_else(|| self.contact.clone());
        if name.trim() == self.name && contact == self.contact {
            return Ok(vec![]);
        }

        Ok(vec![PartyEvent::PartyUpdated(PartyUpdated {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            name: name.trim().to_string(),
            contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendParty) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;
        if self.status == PartyStatus::Suspended {
            return Err(DomainError::conflict("party is already suspended"));
        }

        Ok(vec![PartyEvent::PartySuspended(PartySuspended {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateParty) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.party_id)?;
        if self.status == PartyStatus::Active {
            return Err(DomainError::conflict("party is already active"));
        }

        Ok(vec![PartyEvent::PartyReactivated(PartyReactivated {
            tenant_id: cmd.tenant_id,
            party_id: cmd.party_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_party_id() -> PartyId {
        PartyId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered(tenant_id: TenantId, kind: PartyKind) -> Party {
        let party_id = test_party_id();
        let mut party = Party::empty(party_id);
        let events = party
            .handle(&PartyCommand::RegisterParty(RegisterParty {
                tenant_id,
                party_id,
                kind,
                name: "Acme Trading".to_string(),
                contact: Some(ContactInfo {
                    email: Some("ap@acme.test".to_string()),
                    ..ContactInfo::default()
                }),
                occurred_at: test_time(),
            }))
            .unwrap();
        party.apply(&events[0]);
        party
    }

    #[test]
    fn register_party_emits_party_registered_event() {
        let tenant_id = test_tenant_id();
        let party = registered(tenant_id, PartyKind::Customer);
        assert_eq!(party.tenant_id(), Some(tenant_id));
        assert_eq!(party.kind(), PartyKind::Customer);
        assert_eq!(party.name(), "Acme Trading");
        assert_eq!(party.contact().email.as_deref(), Some("ap@acme.test"));
        assert_eq!(party.version(), 1);
    }

    #[test]
    fn register_party_rejects_empty_name_and_duplicates() {
        let party_id = test_party_id();
        let party = Party::empty(party_id);
        let mut cmd = RegisterParty {
            tenant_id: test_tenant_id(),
            party_id,
            kind: PartyKind::Supplier,
            name: "   ".to_string(),
            contact: None,
            occurred_at: test_time(),
        };
        let err = party.handle(&PartyCommand::RegisterParty(cmd.clone())).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let existing = registered(cmd.tenant_id, PartyKind::Supplier);
        cmd.name = "Other".into();
        cmd.party_id = existing.id_typed();
        let err = existing.handle(&PartyCommand::RegisterParty(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn update_details_keeps_unspecified_fields() {
        let tenant_id = test_tenant_id();
        let mut party = registered(tenant_id, PartyKind::Customer);
        let events = party
            .handle(&PartyCommand::UpdateDetails(UpdateDetails {
                tenant_id,
                party_id: party.id_typed(),
                name: Some("Acme Holdings".to_string()),
                contact: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        party.apply(&events[0]);
        assert_eq!(party.name(), "Acme Holdings");
        assert_eq!(party.contact().email.as_deref(), Some("ap@acme.test"));
    }

    #[test]
    fn suspended_party_cannot_transact_until_reactivated() {
        let tenant_id = test_tenant_id();
        let mut party = registered(tenant_id, PartyKind::Customer);
        assert!(party.ensure_can_transact_as(PartyKind::Customer).is_ok());

        let events = party
            .handle(&PartyCommand::SuspendParty(SuspendParty {
                tenant_id,
                party_id: party.id_typed(),
                reason: Some("credit hold".into()),
                occurred_at: test_time(),
            }))
            .unwrap();
        party.apply(&events[0]);
        assert!(!party.can_transact());
        let err = party.ensure_can_transact_as(PartyKind::Customer).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let err = party
            .handle(&PartyCommand::SuspendParty(SuspendParty {
                tenant_id,
                party_id: party.id_typed(),
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let events = party
            .handle(&PartyCommand::ReactivateParty(ReactivateParty {
                tenant_id,
                party_id: party.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        party.apply(&events[0]);
        assert!(party.can_transact());
    }

    #[test]
    fn supplier_cannot_be_used_as_customer() {
        let party = registered(test_tenant_id(), PartyKind::Supplier);
        let err = party.ensure_can_transact_as(PartyKind::Customer).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn commands_on_missing_or_foreign_party_fail() {
        let party = Party::empty(test_party_id());
        let err = party
            .handle(&PartyCommand::SuspendParty(SuspendParty {
                tenant_id: test_tenant_id(),
                party_id: party.id_typed(),
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));

        let party = registered(test_tenant_id(), PartyKind::Customer);
        let err = party
            .handle(&PartyCommand::SuspendParty(SuspendParty {
                tenant_id: test_tenant_id(),
                party_id: party.id_typed(),
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Suspend/reactivate toggles never skip a version and always end consistent.
            #[test]
            fn status_toggles_track_versions(toggles in prop::collection::vec(any::<bool>(), 0..20)) {
                let tenant_id = test_tenant_id();
                let mut party = registered(tenant_id, PartyKind::Customer);
                for suspend in toggles {
                    let cmd = if suspend {
                        PartyCommand::SuspendParty(SuspendParty {
                            tenant_id,
                            party_id: party.id_typed(),
                            reason: None,
                            occurred_at: test_time(),
                        })
                    } else {
                        PartyCommand::ReactivateParty(ReactivateParty {
                            tenant_id,
                            party_id: party.id_typed(),
                            occurred_at: test_time(),
                        })
                    };
                    let before = party.version();
                    match party.handle(&cmd) {
                        Ok(events) => {
                            for e in &events {
                                party.apply(e);
                            }
                            prop_assert_eq!(party.version(), before + 1);
                            prop_assert_eq!(party.can_transact(), !suspend);
                        }
                        Err(_) => prop_assert_eq!(party.version(), before),
                    }
                }
            }
        }
    }
}
