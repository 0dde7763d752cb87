use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};

use ledgerdesk_auth::Permission;
use ledgerdesk_infra::lifecycle::{ConvertOrderInput, NewSalesOrder};
use ledgerdesk_sales::SalesOrderId;

use crate::app::dto::{ListQuery, ReasonRequest, ReplaceLinesRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::{created, done, get_document, list_documents, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/lines", put(replace_lines))
        .route("/:id/confirm", post(confirm_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/convert", post(convert_order))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewSalesOrder>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::SALES_WRITE)?;
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.create_sales_order(&ctx, body))
        .await?;
    Ok(created(outcome))
}

pub async fn replace_lines(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ReplaceLinesRequest>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::SALES_WRITE)?;
    let order_id = SalesOrderId(parse_id(&id, "sales order")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.replace_sales_order_lines(&ctx, order_id, body.lines, body.settings))
        .await?;
    Ok(done(outcome))
}

pub async fn confirm_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::SALES_WRITE)?;
    let order_id = SalesOrderId(parse_id(&id, "sales order")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.confirm_sales_order(&ctx, order_id))
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
    require(&principal, Permission::SALES_WRITE)?;
    let order_id = SalesOrderId(parse_id(&id, "sales order")?);
    let reason = body.and_then(|Json(b)| b.reason);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.cancel_sales_order(&ctx, order_id, reason))
        .await?;
    Ok(done(outcome))
}

/// Turn a confirmed order into an invoice. Writing invoices is what this
/// needs on top of the order permission.
pub async fn convert_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ConvertOrderInput>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::SALES_WRITE)?;
    require(&principal, Permission::INVOICES_WRITE)?;
    let order_id = SalesOrderId(parse_id(&id, "sales order")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.convert_sales_order_to_invoice(&ctx, order_id, body))
        .await?;
    Ok(created(outcome))
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    let id = parse_id(&id, "sales order")?;
    get_document(&services, tenant.tenant_id(), "sales_order", id).await
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    list_documents(&services, tenant.tenant_id(), "sales_order", &query).await
}
