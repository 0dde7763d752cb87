use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
    Json, Router,
};

use ledgerdesk_auth::Permission;
use ledgerdesk_infra::lifecycle::{BillChanges, NewBill, PaymentInput};
use ledgerdesk_purchasing::BillId;

use crate::app::dto::{ListQuery, ReasonRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::{created, done, get_document, list_documents, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_bill).get(list_bills))
        .route("/:id", get(get_bill).patch(update_bill))
        .route("/:id/open", post(open_bill))
        .route("/:id/payments", post(record_payment))
        .route("/:id/void", post(void_bill))
}

pub async fn create_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewBill>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::BILLS_WRITE)?;
    let ctx = principal.command_context(&tenant);
    let outcome = services.run(move |lc| lc.create_bill(&ctx, body)).await?;
    Ok(created(outcome))
}

pub async fn update_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(changes): Json<BillChanges>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::BILLS_WRITE)?;
    let bill_id = BillId(parse_id(&id, "bill")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.update_bill(&ctx, bill_id, changes))
        .await?;
    Ok(done(outcome))
}

pub async fn open_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::BILLS_WRITE)?;
    let bill_id = BillId(parse_id(&id, "bill")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services.run(move |lc| lc.open_bill(&ctx, bill_id)).await?;
    Ok(done(outcome))
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<PaymentInput>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::BILLS_PAY)?;
    let bill_id = BillId(parse_id(&id, "bill")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.record_bill_payment(&ctx, bill_id, body))
        .await?;
    Ok(done(outcome))
}

pub async fn void_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ReasonRequest>>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::BILLS_WRITE)?;
    let bill_id = BillId(parse_id(&id, "bill")?);
    let reason = body.and_then(|Json(b)| b.reason);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.void_bill(&ctx, bill_id, reason))
        .await?;
    Ok(done(outcome))
}

pub async fn get_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    let id = parse_id(&id, "bill")?;
    get_document(&services, tenant.tenant_id(), "bill", id).await
}

pub async fn list_bills(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    list_documents(&services, tenant.tenant_id(), "bill", &query).await
}
