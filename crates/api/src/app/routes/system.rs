use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "tenant_id": tenant.tenant_id().to_string(),
        "user_id": principal.user_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": principal
            .principal()
            .membership
            .permissions
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>(),
    }))
}
