use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
    Json, Router,
};

use ledgerdesk_auth::Permission;
use ledgerdesk_infra::lifecycle::NewPurchaseOrder;
use ledgerdesk_purchasing::PurchaseOrderId;

use crate::app::dto::{ListQuery, ReasonRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::{created, done, get_document, list_documents, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/approve", post(approve_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/close", post(close_order))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewPurchaseOrder>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PURCHASING_WRITE)?;
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.create_purchase_order(&ctx, body))
        .await?;
    Ok(created(outcome))
}

pub async fn approve_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PURCHASING_WRITE)?;
    let order_id = PurchaseOrderId(parse_id(&id, "purchase order")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.approve_purchase_order(&ctx, order_id))
        .await?;
    Ok(done(outcome))
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ReasonRequest>>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PURCHASING_WRITE)?;
    let order_id = PurchaseOrderId(parse_id(&id, "purchase order")?);
    let reason = body.and_then(|Json(b)| b.reason);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.cancel_purchase_order(&ctx, order_id, reason))
        .await?;
    Ok(done(outcome))
}

pub async fn close_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PURCHASING_WRITE)?;
    let order_id = PurchaseOrderId(parse_id(&id, "purchase order")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.close_purchase_order(&ctx, order_id))
        .await?;
    Ok(done(outcome))
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    let id = parse_id(&id, "purchase order")?;
    get_document(&services, tenant.tenant_id(), "purchase_order", id).await
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    list_documents(&services, tenant.tenant_id(), "purchase_order", &query).await
}
