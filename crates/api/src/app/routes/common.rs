//! Helpers shared by the document routes.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use ledgerdesk_core::{AggregateId, TenantId};
use ledgerdesk_infra::Outcome;
use ledgerdesk_infra::projections::DocumentView;

use crate::app::dto::{DocumentPage, ListQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn parse_id(raw: &str, what: &'static str) -> Result<AggregateId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {what} id")))
}

pub fn created(outcome: Outcome) -> Response {
    (StatusCode::CREATED, Json(outcome)).into_response()
}

pub fn done(outcome: Outcome) -> Response {
    (StatusCode::OK, Json(outcome)).into_response()
}

pub async fn list_documents(
    services: &Arc<AppServices>,
    tenant_id: TenantId,
    entity_type: &str,
    query: &ListQuery,
) -> Result<Response, ApiError> {
    services.warm_tenant(tenant_id).await?;
    let views = services.read.documents.list(tenant_id, entity_type);
    Ok(Json(DocumentPage::from_views(views, query)).into_response())
}

/// One document by id; a document of another type is reported as missing.
pub async fn get_document(
    services: &Arc<AppServices>,
    tenant_id: TenantId,
    entity_type: &'static str,
    id: AggregateId,
) -> Result<Response, ApiError> {
    services.warm_tenant(tenant_id).await?;
    let view: DocumentView = services
        .read
        .documents
        .get(tenant_id, id)
        .filter(|v| v.entity_type == entity_type)
        .ok_or(ApiError::NotFound(entity_type))?;
    Ok(Json(view).into_response())
}
