//! `/api/my-company`: the tenant's company profile and document defaults.

use std::sync::Arc;

use axum::{extract::Extension, response::Response, routing::get, Json, Router};

use ledgerdesk_auth::Permission;
use ledgerdesk_parties::{CompanyId, CompanyProfile};

use crate::app::errors::ApiError;
use crate::app::routes::common::{done, get_document};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new().route("/", get(get_company).put(save_company))
}

pub async fn get_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::DOCUMENTS_READ)?;
    let id = CompanyId::for_tenant(tenant.tenant_id());
    get_document(&services, tenant.tenant_id(), "company", id.0).await
}

pub async fn save_company(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(profile): Json<CompanyProfile>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::COMPANY_MANAGE)?;
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.save_company_profile(&ctx, profile))
        .await?;
    Ok(done(outcome))
}
