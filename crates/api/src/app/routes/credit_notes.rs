use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
    Json, Router,
};

use ledgerdesk_auth::Permission;
use ledgerdesk_infra::lifecycle::{ApplyCreditInput, CreditTarget};
use ledgerdesk_parties::CreditNoteId;

use crate::app::dto::{ListQuery, ReasonRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::{done, get_document, list_documents, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_notes))
        .route("/:id", get(get_note))
        .route("/:id/apply", post(apply_note))
        .route("/:id/void", post(void_note))
}

/// Spend credit on an invoice (customer credit) or a bill (supplier
/// credit). Settling also needs the right to take payment on that document.
pub async fn apply_note(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ApplyCreditInput>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::CREDIT_NOTES_MANAGE)?;
    match body.target {
        CreditTarget::Invoice(_) => require(&principal, Permission::INVOICES_PAY)?,
        CreditTarget::Bill(_) => require(&principal, Permission::BILLS_PAY)?,
    }
    let credit_note_id = CreditNoteId(parse_id(&id, "credit note")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.apply_credit_note(&ctx, credit_note_id, body))
        .await?;
    Ok(done(outcome))
}

pub async fn void_note(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ReasonRequest>>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::CREDIT_NOTES_MANAGE)?;
    let credit_note_id = CreditNoteId(parse_id(&id, "credit note")?);
    let reason = body.and_then(|Json(b)| b.reason);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.void_credit_note(&ctx, credit_note_id, reason))
        .await?;
    Ok(done(outcome))
}

pub async fn get_note(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    let id = parse_id(&id, "credit note")?;
    get_document(&services, tenant.tenant_id(), "credit_note", id).await
}

pub async fn list_notes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    list_documents(&services, tenant.tenant_id(), "credit_note", &query).await
}
