use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
    Json, Router,
};

use ledgerdesk_auth::Permission;
use ledgerdesk_infra::lifecycle::NewSalesReturn;
use ledgerdesk_invoicing::SalesReturnId;

use crate::app::dto::ListQuery;
use crate::app::errors::ApiError;
use crate::app::routes::common::{created, done, get_document, list_documents, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_return).get(list_returns))
        .route("/:id", get(get_return))
        .route("/:id/complete", post(complete_return))
        .route("/:id/cancel", post(cancel_return))
}

pub async fn create_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewSalesReturn>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::RETURNS_WRITE)?;
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.create_sales_return(&ctx, body))
        .await?;
    Ok(created(outcome))
}

/// Also the retry path for a completion that stopped part way.
pub async fn complete_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::RETURNS_WRITE)?;
    let return_id = SalesReturnId(parse_id(&id, "sales return")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.complete_sales_return(&ctx, return_id))
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
    let return_id = SalesReturnId(parse_id(&id, "sales return")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.cancel_sales_return(&ctx, return_id))
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
    let id = parse_id(&id, "sales return")?;
    get_document(&services, tenant.tenant_id(), "sales_return", id).await
}

pub async fn list_returns(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    list_documents(&services, tenant.tenant_id(), "sales_return", &query).await
}
