//! Customers and suppliers share one set of handlers; the router fixes the
//! kind.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
    Json, Router,
};

use ledgerdesk_auth::Permission;
use ledgerdesk_parties::{PartyId, PartyKind};

use crate::app::dto::{ListQuery, ReasonRequest, RegisterPartyRequest, UpdatePartyRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::{created, done, get_document, list_documents, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router(kind: PartyKind) -> Router {
    Router::new()
        .route("/", post(register_party).get(list_parties))
        .route("/:id", get(get_party).patch(update_party))
        .route("/:id/suspend", post(suspend_party))
        .route("/:id/reactivate", post(reactivate_party))
        .layer(Extension(kind))
}

pub async fn register_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(kind): Extension<PartyKind>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<RegisterPartyRequest>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PARTIES_WRITE)?;
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.register_party(&ctx, body.party_id, kind, body.name, body.contact))
        .await?;
    Ok(created(outcome))
}

pub async fn update_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(kind): Extension<PartyKind>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdatePartyRequest>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PARTIES_WRITE)?;
    let party_id = PartyId(parse_id(&id, kind.as_str())?);
    ensure_kind(&services, &tenant, kind, party_id).await?;
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.update_party(&ctx, party_id, body.name, body.contact))
        .await?;
    Ok(done(outcome))
}

pub async fn suspend_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(kind): Extension<PartyKind>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ReasonRequest>>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PARTIES_WRITE)?;
    let party_id = PartyId(parse_id(&id, kind.as_str())?);
    ensure_kind(&services, &tenant, kind, party_id).await?;
    let reason = body.and_then(|Json(b)| b.reason);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.suspend_party(&ctx, party_id, reason))
        .await?;
    Ok(done(outcome))
}

pub async fn reactivate_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(kind): Extension<PartyKind>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PARTIES_WRITE)?;
    let party_id = PartyId(parse_id(&id, kind.as_str())?);
    ensure_kind(&services, &tenant, kind, party_id).await?;
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.reactivate_party(&ctx, party_id))
        .await?;
    Ok(done(outcome))
}

pub async fn get_party(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(kind): Extension<PartyKind>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    let id = parse_id(&id, kind.as_str())?;
    get_document(&services, tenant.tenant_id(), kind.as_str(), id).await
}

pub async fn list_parties(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(kind): Extension<PartyKind>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    list_documents(&services, tenant.tenant_id(), kind.as_str(), &query).await
}

/// `/api/customers/:id` must not reach a supplier.
async fn ensure_kind(
    services: &Arc<AppServices>,
    tenant: &TenantContext,
    kind: PartyKind,
    party_id: PartyId,
) -> Result<(), ApiError> {
    let tenant_id = tenant.tenant_id();
    let party = services
        .run(move |lc| lc.load_existing::<ledgerdesk_parties::Party>(tenant_id, party_id.0, "party"))
        .await?;
    if party.kind() == kind {
        Ok(())
    } else {
        Err(ApiError::NotFound(kind.as_str()))
    }
}
