//! Audit log: one entry per committed event.
//!
//! Document events carry a field-level diff of the rendered view before and
//! after the event. Ledger, stock and posting events are logged without one.
//! Redeliveries are dropped against a per-stream sequence cursor, so the
//! dedup state holds one number per stream rather than one id per event.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use ledgerdesk_core::{AggregateId, TenantId, UserId};
use ledgerdesk_events::EventEnvelope;

use super::cursor::StreamCursors;
use super::documents::DocumentChange;
use crate::event_store::Pagination;
use crate::lifecycle::streams::{CHART, LEDGER, POSTING_RECORD, STOCK_ITEM};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub from: JsonValue,
    pub to: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub entity_type: String,
    pub entity_id: AggregateId,
    /// Last segment of the event type, e.g. `issued`.
    pub action: String,
    pub event_type: String,
    pub actor: Option<UserId>,
    pub at: DateTime<Utc>,
    pub changes: BTreeMap<String, FieldChange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<AggregateId>,
    pub action: Option<String>,
    pub actor: Option<UserId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.entity_type.as_deref().is_none_or(|t| t == entry.entity_type)
            && self.entity_id.is_none_or(|id| id == entry.entity_id)
            && self.action.as_deref().is_none_or(|a| a == entry.action)
            && self.actor.is_none_or(|a| Some(a) == entry.actor)
            && self.from.is_none_or(|t| entry.at >= t)
            && self.to.is_none_or(|t| entry.at <= t)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

/// Field-level diff between two rendered views. Fields absent on one side
/// compare as `null`.
pub fn diff(before: Option<&JsonValue>, after: &JsonValue) -> BTreeMap<String, FieldChange> {
    let empty = serde_json::Map::new();
    let old = before.and_then(JsonValue::as_object).unwrap_or(&empty);
    let new = after.as_object().unwrap_or(&empty);

    let mut changes = BTreeMap::new();
    for key in old.keys().chain(new.keys()) {
        if changes.contains_key(key) {
            continue;
        }
        let from = old.get(key).cloned().unwrap_or(JsonValue::Null);
        let to = new.get(key).cloned().unwrap_or(JsonValue::Null);
        if from != to {
            changes.insert(key.clone(), FieldChange { from, to });
        }
    }
    changes
}

fn entity_type_for_stream(aggregate_type: &str) -> String {
    match aggregate_type {
        LEDGER => "journal".to_string(),
        STOCK_ITEM => "stock_item".to_string(),
        POSTING_RECORD => "posting_record".to_string(),
        CHART => "chart_of_accounts".to_string(),
        other => other.rsplit('.').next().unwrap_or(other).to_string(),
    }
}

#[derive(Debug, Default)]
pub struct AuditLog {
    entries: RwLock<HashMap<TenantId, Vec<AuditEntry>>>,
    cursors: StreamCursors,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an envelope once. Anything at or behind its stream's last
    /// recorded sequence is a redelivery and is ignored.
    pub fn record(&self, envelope: &EventEnvelope<JsonValue>, change: Option<&DocumentChange>) {
        let (tenant_id, aggregate_id) = (envelope.tenant_id(), envelope.aggregate_id());
        let seq = envelope.sequence_number();
        if seq <= self.cursors.get(tenant_id, aggregate_id) {
            return;
        }

        let (entity_type, changes) = match change {
            Some(c) => (
                c.after.entity_type.to_string(),
                diff(c.before.as_ref().map(|b| &b.data), &c.after.data),
            ),
            None => (entity_type_for_stream(envelope.aggregate_type()), BTreeMap::new()),
        };
        let action = envelope
            .event_type()
            .rsplit('.')
            .next()
            .unwrap_or(envelope.event_type())
            .to_string();

        let entry = AuditEntry {
            entry_id: envelope.event_id(),
            entity_type,
            entity_id: envelope.aggregate_id(),
            action,
            event_type: envelope.event_type().to_string(),
            actor: envelope.actor(),
            at: envelope.occurred_at(),
            changes,
        };
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        // Re-check under the lock; a concurrent delivery may have won.
        if seq <= self.cursors.get(tenant_id, aggregate_id) {
            return;
        }
        self.cursors.advance(tenant_id, aggregate_id, seq);
        entries.entry(tenant_id).or_default().push(entry);
    }

    /// Newest first.
    pub fn query(&self, tenant_id: TenantId, filter: &AuditFilter, pagination: Pagination) -> AuditPage {
        let mut matching: Vec<AuditEntry> = match self.entries.read() {
            Ok(entries) => entries
                .get(&tenant_id)
                .map(|all| all.iter().filter(|e| filter.matches(e)).cloned().collect())
                .unwrap_or_default(),
            Err(_) => vec![],
        };
        matching.sort_by(|a, b| b.at.cmp(&a.at).then_with(|| b.entry_id.cmp(&a.entry_id)));

        let total = matching.len() as u64;
        let entries = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        AuditPage {
            entries,
            total,
            pagination,
            has_more: total > u64::from(pagination.offset) + u64::from(pagination.limit),
        }
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&tenant_id);
        }
        self.cursors.clear_tenant(tenant_id);
    }

    /// Streams with a recorded cursor.
    pub fn tracked_streams(&self) -> usize {
        self.cursors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_reports_changed_added_and_removed_fields() {
        let before = json!({"status": "draft", "total": 100, "note": "x"});
        let after = json!({"status": "issued", "total": 100, "number": "INV-1"});
        let changes = diff(Some(&before), &after);

        assert_eq!(changes.len(), 3);
        assert_eq!(changes["status"].from, json!("draft"));
        assert_eq!(changes["status"].to, json!("issued"));
        assert_eq!(changes["note"].to, JsonValue::Null);
        assert_eq!(changes["number"].from, JsonValue::Null);
        assert!(!changes.contains_key("total"));
    }

    #[test]
    fn creation_diffs_every_field_against_nothing() {
        let after = json!({"name": "Acme"});
        let changes = diff(None, &after);
        assert_eq!(changes["name"].from, JsonValue::Null);
        assert_eq!(changes["name"].to, json!("Acme"));
    }

    #[test]
    fn entries_are_tenant_scoped_filtered_and_deduplicated() {
        let log = AuditLog::new();
        let tenant = TenantId::new();
        let actor = UserId::new();
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            tenant,
            AggregateId::new(),
            LEDGER,
            1,
            "accounting.ledger.journal_entry_posted",
            Utc::now(),
            json!({}),
        )
        .with_actor(Some(actor));

        log.record(&env, None);
        log.record(&env, None);

        let page = log.query(tenant, &AuditFilter::default(), Pagination::default());
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].entity_type, "journal");
        assert_eq!(page.entries[0].action, "journal_entry_posted");
        assert_eq!(page.entries[0].actor, Some(actor));

        let by_other_actor = AuditFilter {
            actor: Some(UserId::new()),
            ..AuditFilter::default()
        };
        assert_eq!(log.query(tenant, &by_other_actor, Pagination::default()).total, 0);
        assert_eq!(
            log.query(TenantId::new(), &AuditFilter::default(), Pagination::default()).total,
            0
        );
    }

    fn posted(tenant: TenantId, stream: AggregateId, seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant,
            stream,
            LEDGER,
            seq,
            "accounting.ledger.journal_entry_posted",
            Utc::now(),
            json!({}),
        )
    }

    #[test]
    fn redelivery_is_detected_by_stream_sequence() {
        let log = AuditLog::new();
        let tenant = TenantId::new();
        let stream = AggregateId::new();

        for seq in 1..=50 {
            log.record(&posted(tenant, stream, seq), None);
        }
        // A re-published envelope gets a fresh event id but keeps its sequence.
        log.record(&posted(tenant, stream, 7), None);
        log.record(&posted(tenant, stream, 50), None);

        let all = Pagination { offset: 0, limit: 100 };
        assert_eq!(log.query(tenant, &AuditFilter::default(), all).total, 50);
        assert_eq!(log.tracked_streams(), 1);

        log.clear_tenant(tenant);
        assert_eq!(log.tracked_streams(), 0);
        log.record(&posted(tenant, stream, 1), None);
        assert_eq!(log.query(tenant, &AuditFilter::default(), all).total, 1);
    }
}
