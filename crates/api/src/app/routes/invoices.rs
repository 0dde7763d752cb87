use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
    Json, Router,
};

use ledgerdesk_auth::Permission;
use ledgerdesk_infra::lifecycle::{InvoiceChanges, NewInvoice, PaymentInput};
use ledgerdesk_invoicing::InvoiceId;

use crate::app::dto::{ListQuery, ReasonRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::{created, done, get_document, list_documents, parse_id};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/:id", get(get_invoice).patch(update_invoice))
        .route("/:id/issue", post(issue_invoice))
        .route("/:id/payments", post(record_payment))
        .route("/:id/void", post(void_invoice))
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewInvoice>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::INVOICES_WRITE)?;
    let ctx = principal.command_context(&tenant);
    let outcome = services.run(move |lc| lc.create_invoice(&ctx, body)).await?;
    Ok(created(outcome))
}

/// Edit a draft or issued invoice. An issued invoice is re-posted.
pub async fn update_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(changes): Json<InvoiceChanges>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::INVOICES_WRITE)?;
    let invoice_id = InvoiceId(parse_id(&id, "invoice")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.update_invoice(&ctx, invoice_id, changes))
        .await?;
    Ok(done(outcome))
}

pub async fn issue_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::INVOICES_WRITE)?;
    let invoice_id = InvoiceId(parse_id(&id, "invoice")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.issue_invoice(&ctx, invoice_id))
        .await?;
    Ok(done(outcome))
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<PaymentInput>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::INVOICES_PAY)?;
    let invoice_id = InvoiceId(parse_id(&id, "invoice")?);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.record_invoice_payment(&ctx, invoice_id, body))
        .await?;
    Ok(done(outcome))
}

pub async fn void_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ReasonRequest>>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::INVOICES_WRITE)?;
    let invoice_id = InvoiceId(parse_id(&id, "invoice")?);
    let reason = body.and_then(|Json(b)| b.reason);
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.void_invoice(&ctx, invoice_id, reason))
        .await?;
    Ok(done(outcome))
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    let id = parse_id(&id, "invoice")?;
    get_document(&services, tenant.tenant_id(), "invoice", id).await
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    list_documents(&services, tenant.tenant_id(), "invoice", &query).await
}
