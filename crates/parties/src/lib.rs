//! Parties domain module (event-sourced).
//!
//! Customers and suppliers, the tenant's own company profile, and the credit
//! notes owed between them. Pure domain logic (no IO, no HTTP, no storage).

pub mod company;
pub mod credit_note;
pub mod party;

pub use company::{
    Company, CompanyCommand, CompanyEvent, CompanyId, CompanyProfile, CompanyProfileUpdated,
    CompanyRegistered, DocumentDefaults, SaveCompanyProfile,
};
pub use credit_note::{
    ApplyCreditNote, CreditApplication, CreditNote, CreditNoteApplied, CreditNoteCommand,
    CreditNoteEvent, CreditNoteId, CreditNoteIssued, CreditNoteKind, CreditNoteStatus,
    CreditNoteVoided, IssueCreditNote, VoidCreditNote,
};
pub use party::{
    ContactInfo, Party, PartyCommand, PartyEvent, PartyId, PartyKind, PartyReactivated,
    PartyRegistered, PartyStatus, PartySuspended, PartyUpdated, ReactivateParty, RegisterParty,
    SuspendParty, UpdateDetails,
};
