//! Request bodies and query strings that are not lifecycle inputs already.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerdesk_core::{AggregateId, UserId};
use ledgerdesk_infra::event_store::Pagination;
use ledgerdesk_infra::projections::{AuditFilter, DocumentView};
use ledgerdesk_infra::lifecycle::LineInput;
use ledgerdesk_parties::{ContactInfo, PartyId};
use ledgerdesk_pricing::PricingSettings;
use ledgerdesk_products::ProductId;

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPartyRequest {
    #[serde(default)]
    pub party_id: Option<PartyId>,
    pub name: String,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePartyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceLinesRequest {
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub settings: Option<PricingSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StockQuery {
    #[serde(default)]
    pub product_id: Option<ProductId>,
}

/// `?status=paid&limit=20&offset=40`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DocumentPage {
    pub items: Vec<DocumentView>,
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl DocumentPage {
    pub fn from_views(views: Vec<DocumentView>, query: &ListQuery) -> Self {
        let matching: Vec<DocumentView> = views
            .into_iter()
            .filter(|v| {
                query
                    .status
                    .as_deref()
                    .is_none_or(|s| v.data.get("status").and_then(|x| x.as_str()) == Some(s))
            })
            .collect();
        let pagination = Pagination::new(query.limit, query.offset);
        let total = matching.len() as u64;
        let items: Vec<DocumentView> = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        Self {
            items,
            total,
            pagination,
            has_more: total > u64::from(pagination.offset) + u64::from(pagination.limit),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<AggregateId>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub actor: Option<UserId>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

impl AuditQuery {
    pub fn split(self) -> (AuditFilter, Pagination) {
        (
            AuditFilter {
                entity_type: self.entity_type,
                entity_id: self.entity_id,
                action: self.action,
                actor: self.actor,
                from: self.from,
                to: self.to,
            },
            Pagination::new(self.limit, self.offset),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view(status: &str) -> DocumentView {
        DocumentView {
            id: AggregateId::new(),
            entity_type: "invoice",
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            data: json!({ "status": status }),
        }
    }

    #[test]
    fn pages_filter_by_status_before_slicing() {
        let views = vec![view("paid"), view("issued"), view("paid"), view("paid")];
        let query = ListQuery {
            status: Some("paid".into()),
            limit: Some(2),
            offset: None,
        };
        let page = DocumentPage::from_views(views, &query);
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);
    }
}
