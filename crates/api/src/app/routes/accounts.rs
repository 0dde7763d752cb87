//! Chart of accounts and the balances derived from the ledger.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use ledgerdesk_accounting::{Account, ChartId, ChartOfAccounts, standard_chart};
use ledgerdesk_auth::Permission;

use crate::app::errors::ApiError;
use crate::app::routes::common::{created, done};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_accounts).post(add_account))
        .route("/:code/deactivate", post(deactivate_account))
}

pub fn balances_router() -> Router {
    Router::new()
        .route("/", get(list_balances))
        .route("/:code", get(get_balance))
}

/// The tenant's chart. A tenant that has not posted anything yet sees the
/// standard chart it will be seeded with.
pub async fn list_accounts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::LEDGER_READ)?;
    let tenant_id = tenant.tenant_id();
    let chart = services
        .run(move |lc| lc.load::<ChartOfAccounts>(tenant_id, ChartId::for_tenant(tenant_id).0))
        .await?;
    let accounts: Vec<Account> = if chart.is_created() {
        chart.accounts().to_vec()
    } else {
        standard_chart()
    };
    Ok(Json(accounts).into_response())
}

pub async fn add_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(account): Json<Account>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::ACCOUNTS_MANAGE)?;
    let ctx = principal.command_context(&tenant);
    let outcome = services.run(move |lc| lc.add_account(&ctx, account)).await?;
    Ok(created(outcome))
}

pub async fn deactivate_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::ACCOUNTS_MANAGE)?;
    let ctx = principal.command_context(&tenant);
    let outcome = services
        .run(move |lc| lc.deactivate_account(&ctx, code))
        .await?;
    Ok(done(outcome))
}

pub async fn list_balances(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::LEDGER_READ)?;
    services.warm_tenant(tenant.tenant_id()).await?;
    let balances = services.read.balances.list(tenant.tenant_id());
    Ok(Json(balances).into_response())
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    require(&principal, Permission::LEDGER_READ)?;
    services.warm_tenant(tenant.tenant_id()).await?;
    match services.read.balances.get(tenant.tenant_id(), &code) {
        Some(balance) => Ok((StatusCode::OK, Json(balance)).into_response()),
        None => Err(ApiError::NotFound("account balance")),
    }
}
