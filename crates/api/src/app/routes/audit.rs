use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use ledgerdesk_auth::Permission;

use crate::app::dto::AuditQuery;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new().route("/", get(list_audit_logs))
}

/// Newest first. Filters: `entity_type`, `entity_id`, `action`, `actor`,
/// `from`, `to`; paging with `limit`/`offset`.
pub async fn list_audit_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<AuditQuery>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::AUDIT_READ)?;
    services.warm_tenant(tenant.tenant_id()).await?;
    let (filter, pagination) = query.split();
    let page = services.read.audit.query(tenant.tenant_id(), &filter, pagination);
    Ok(Json(page).into_response())
}
