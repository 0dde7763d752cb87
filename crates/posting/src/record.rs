//! What is currently posted for a source document.
//!
//! An edit reverses the active posting (journal entry and stock movements),
//! clears the record, then records the new posting. The record is the only
//! place that links a document to its ledger and stock effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerdesk_accounting::SourceDocument;
use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ledgerdesk_events::Event;
use ledgerdesk_inventory::{StockItemId, WarehouseId};
use ledgerdesk_products::ProductId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostingRecordId(pub AggregateId);

impl PostingRecordId {
    pub fn for_source(tenant_id: TenantId, source: SourceDocument) -> Self {
        let key = format!("{}/{}", source.kind.as_str(), source.id);
        Self(AggregateId::derived(tenant_id, "posting.record", &key))
    }
}

impl core::fmt::Display for PostingRecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedMovement {
    pub stock_item_id: StockItemId,
    pub movement_id: Uuid,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePosting {
    pub revision: u32,
    pub entry_id: Option<Uuid>,
    pub movements: Vec<PostedMovement>,
}

/// Aggregate root: PostingRecord.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingRecord {
    id: PostingRecordId,
    tenant_id: Option<TenantId>,
    source: Option<SourceDocument>,
    active: Option<ActivePosting>,
    revisions: u32,
    version: u64,
    created: bool,
}

impl PostingRecord {
    pub fn empty(id: PostingRecordId) -> Self {
        Self {
            id,
            tenant_id: None,
            source: None,
            active: None,
            revisions: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PostingRecordId {
        self.id
    }

    pub fn source(&self) -> Option<SourceDocument> {
        self.source
    }

    pub fn active(&self) -> Option<&ActivePosting> {
        self.active.as_ref()
    }

    /// How many postings were recorded over the document's life.
    pub fn revisions(&self) -> u32 {
        self.revisions
    }
}

impl AggregateRoot for PostingRecord {
    type Id = PostingRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPosting {
    pub tenant_id: TenantId,
    pub record_id: PostingRecordId,
    pub source: SourceDocument,
    pub entry_id: Option<Uuid>,
    pub movements: Vec<PostedMovement>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearPosting {
    pub tenant_id: TenantId,
    pub record_id: PostingRecordId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingRecordCommand {
    RecordPosting(RecordPosting),
    ClearPosting(ClearPosting),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRecorded {
    pub tenant_id: TenantId,
    pub record_id: PostingRecordId,
    pub source: SourceDocument,
    pub revision: u32,
    pub entry_id: Option<Uuid>,
    pub movements: Vec<PostedMovement>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingCleared {
    pub tenant_id: TenantId,
    pub record_id: PostingRecordId,
    pub revision: u32,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingRecordEvent {
    PostingRecorded(PostingRecorded),
    PostingCleared(PostingCleared),
}

impl Event for PostingRecordEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PostingRecordEvent::PostingRecorded(_) => "posting.record.recorded",
            PostingRecordEvent::PostingCleared(_) => "posting.record.cleared",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PostingRecordEvent::PostingRecorded(e) => e.occurred_at,
            PostingRecordEvent::PostingCleared(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PostingRecord {
    type Command = PostingRecordCommand;
    type Event = PostingRecordEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PostingRecordEvent::PostingRecorded(e) => {
                if !self.created {
                    self.id = e.record_id;
                    self.tenant_id = Some(e.tenant_id);
                    self.source = Some(e.source);
                    self.created = true;
                }
                self.revisions = e.revision;
                self.active = Some(ActivePosting {
                    revision: e.revision,
                    entry_id: e.entry_id,
                    movements: e.movements.clone(),
                });
            }
            PostingRecordEvent::PostingCleared(_) => {
                self.active = None;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PostingRecordCommand::RecordPosting(cmd) => self.handle_record(cmd),
            PostingRecordCommand::ClearPosting(cmd) => self.handle_clear(cmd),
        }
    }
}

impl PostingRecord {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordPosting) -> Result<Vec<PostingRecordEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        if cmd.record_id != PostingRecordId::for_source(cmd.tenant_id, cmd.source) {
            return Err(DomainError::invariant("record_id does not match source"));
        }
        if self.active.is_some() {
            return Err(DomainError::conflict(
                "document already has an active posting; reverse it first",
            ));
        }
        if cmd.entry_id.is_none() && cmd.movements.is_empty() {
            return Err(DomainError::validation("nothing to record"));
        }

        Ok(vec![PostingRecordEvent::PostingRecorded(PostingRecorded {
            tenant_id: cmd.tenant_id,
            record_id: cmd.record_id,
            source: cmd.source,
            revision: self.revisions + 1,
            entry_id: cmd.entry_id,
            movements: cmd.movements.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_clear(&self, cmd: &ClearPosting) -> Result<Vec<PostingRecordEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| DomainError::not_found("active posting"))?;

        Ok(vec![PostingRecordEvent::PostingCleared(PostingCleared {
            tenant_id: cmd.tenant_id,
            record_id: cmd.record_id,
            revision: active.revision,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdesk_accounting::DocumentKind;
    use ledgerdesk_events::execute;

    fn record_cmd(tenant_id: TenantId, source: SourceDocument) -> PostingRecordCommand {
        PostingRecordCommand::RecordPosting(RecordPosting {
            tenant_id,
            record_id: PostingRecordId::for_source(tenant_id, source),
            source,
            entry_id: Some(Uuid::now_v7()),
            movements: vec![],
            occurred_at: Utc::now(),
        })
    }

    fn clear_cmd(tenant_id: TenantId, source: SourceDocument) -> PostingRecordCommand {
        PostingRecordCommand::ClearPosting(ClearPosting {
            tenant_id,
            record_id: PostingRecordId::for_source(tenant_id, source),
            reason: "document edited".into(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn record_clear_record_bumps_revision() {
        let tenant_id = TenantId::new();
        let source = SourceDocument::new(DocumentKind::Invoice, AggregateId::new());
        let mut record = PostingRecord::empty(PostingRecordId::for_source(tenant_id, source));

        execute(&mut record, &record_cmd(tenant_id, source)).unwrap();
        assert_eq!(record.active().unwrap().revision, 1);

        let err = record.handle(&record_cmd(tenant_id, source)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        execute(&mut record, &clear_cmd(tenant_id, source)).unwrap();
        assert!(record.active().is_none());

        execute(&mut record, &record_cmd(tenant_id, source)).unwrap();
        assert_eq!(record.active().unwrap().revision, 2);
        assert_eq!(record.revisions(), 2);
    }

    #[test]
    fn clearing_without_active_posting_fails() {
        let tenant_id = TenantId::new();
        let source = SourceDocument::new(DocumentKind::Bill, AggregateId::new());
        let record = PostingRecord::empty(PostingRecordId::for_source(tenant_id, source));
        let err = record.handle(&clear_cmd(tenant_id, source)).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn record_id_must_match_source() {
        let tenant_id = TenantId::new();
        let source = SourceDocument::new(DocumentKind::Bill, AggregateId::new());
        let other = SourceDocument::new(DocumentKind::Bill, AggregateId::new());
        let record = PostingRecord::empty(PostingRecordId::for_source(tenant_id, source));
        let cmd = PostingRecordCommand::RecordPosting(RecordPosting {
            tenant_id,
            record_id: PostingRecordId::for_source(tenant_id, source),
            source: other,
            entry_id: Some(Uuid::now_v7()),
            movements: vec![],
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            record.handle(&cmd),
            Err(DomainError::InvariantViolation(_))
        ));
    }
}
