//! On-hand quantities per product and warehouse, and manual adjustments.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use ledgerdesk_auth::Permission;
use ledgerdesk_infra::lifecycle::StockAdjustment;

use crate::app::dto::StockQuery;
use crate::app::errors::ApiError;
use crate::app::routes::common::created;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_stock))
        .route("/adjustments", post(adjust_stock))
}

pub async fn list_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<StockQuery>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    let tenant_id = tenant.tenant_id();
    services.warm_tenant(tenant_id).await?;
    let levels = match query.product_id {
        Some(product_id) => services.read.stock.for_product(tenant_id, product_id),
        None => services.read.stock.list(tenant_id),
    };
    Ok(Json(levels).into_response())
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<StockAdjustment>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::STOCK_ADJUST)?;
    let ctx = principal.command_context(&tenant);
    let outcome = services.run(move |lc| lc.adjust_stock(&ctx, body)).await?;
    Ok(created(outcome))
}
