//! Purchase returns. A return shipped from a warehouse other than the bill's
//! waits for someone holding `purchase_returns.approve`.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
    Json, Router,
};

use ledgerdesk_auth::Permission;
use ledgerdesk_infra::lifecycle::NewPurchaseReturn;
use ledgerdesk_purchasing::PurchaseReturnId;

use crate::app::dto::{DecisionRequest, ListQuery};
use crate::app::errors::ApiError;
use crate::app::routes::common::{created, done, get_document, list_documents, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_return).get(list_returns))
        .route("/:id", get(get_return))
        .route("/:id/approve", post(approve_return))
        .route("/:id/reject", post(reject_return))
        .route("/:id/complete", post(complete_return))
        .route("/:id/cancel", post(cancel_return))
}

pub async fn create_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewPurchaseReturn>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::RETURNS_WRITE)?;
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.create_purchase_return(&ctx, body))
        .await?;
    Ok(created(outcome))
}

pub async fn approve_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Response, ApiError> {
    decide(services, tenant, principal, id, true, body).await
}

pub async fn reject_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Response, ApiError> {
    decide(services, tenant, principal, id, false, body).await
}

async fn decide(
    services: Arc<AppServices>,
    tenant: TenantContext,
    principal: PrincipalContext,
    id: String,
    approve: bool,
    body: Option<Json<DecisionRequest>>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PURCHASE_RETURNS_APPROVE)?;
    let return_id = PurchaseReturnId(parse_id(&id, "purchase return")?);
    let note = body.and_then(|Json(b)| b.note);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.decide_purchase_return(&ctx, return_id, approve, note))
        .await?;
    Ok(done(outcome))
}

pub async fn complete_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::RETURNS_WRITE)?;
    let return_id = PurchaseReturnId(parse_id(&id, "purchase return")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.complete_purchase_return(&ctx, return_id))
        .await?;
    Ok(done(outcome))
}

pub async fn cancel_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::RETURNS_WRITE)?;
    let return_id = PurchaseReturnId(parse_id(&id, "purchase return")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.cancel_purchase_return(&ctx, return_id))
        .await?;
    Ok(done(outcome))
}

pub async fn get_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    let id = parse_id(&id, "purchase return")?;
    get_document(&services, tenant.tenant_id(), "purchase_return", id).await
}

pub async fn list_returns(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    list_documents(&services, tenant.tenant_id(), "purchase_return", &query).await
}
