use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};

use ledgerdesk_auth::Permission;
use ledgerdesk_infra::lifecycle::NewProduct;
use ledgerdesk_products::{ProductId, ProductPricing};

use crate::app::dto::ListQuery;
use crate::app::errors::ApiError;
use crate::app::routes::common::{created, done, get_document, list_documents, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/pricing", put(update_pricing))
        .route("/:id/activate", post(activate_product))
        .route("/:id/archive", post(archive_product))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewProduct>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PRODUCTS_WRITE)?;
    let ctx = principal.command_context(&tenant);
    let outcome = services.run(move |lc| lc.create_product(&ctx, body)).await?;
    Ok(created(outcome))
}

pub async fn update_pricing(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(pricing): Json<ProductPricing>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PRODUCTS_WRITE)?;
    let product_id = ProductId(parse_id(&id, "product")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.update_product_pricing(&ctx, product_id, pricing))
        .await?;
    Ok(done(outcome))
}

pub async fn activate_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PRODUCTS_WRITE)?;
    let product_id = ProductId(parse_id(&id, "product")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.activate_product(&ctx, product_id))
        .await?;
    Ok(done(outcome))
}

pub async fn archive_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::PRODUCTS_WRITE)?;
    let product_id = ProductId(parse_id(&id, "product")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.archive_product(&ctx, product_id))
        .await?;
    Ok(done(outcome))
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    let id = parse_id(&id, "product")?;
    get_document(&services, tenant.tenant_id(), "product", id).await
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    list_documents(&services, tenant.tenant_id(), "product", &query).await
}
