//! Accounting module: chart of accounts and the double-entry ledger (event-sourced).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod chart;
pub mod ledger;

pub use chart::{
    Account, AccountKind, AccountSubType, AddAccount, ChartCommand, ChartEvent, ChartId,
    ChartOfAccounts, DeactivateAccount, PostingRole, SeedStandardChart, resolve_account,
    standard_chart,
};
pub use ledger::{
    DocumentKind, JournalCommand, JournalEntryLine, JournalEntryPosted, JournalEntryReversed,
    Ledger, LedgerEvent, LedgerId, PostJournalEntry, PostedEntry, ReverseJournalEntry,
    SourceDocument, validate_balanced,
};
