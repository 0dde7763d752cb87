//! Axum router and service wiring.
//!
//! - `services.rs`: event store, bus, lifecycle coordinator, read models
//! - `routes/`: one file per resource
//! - `dto.rs`: request bodies and query strings
//! - `errors.rs`: JSON error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, StartupError};

/// Build the full router for a configuration.
pub async fn build_app(config: &ApiConfig) -> Result<(Router, Arc<AppServices>), StartupError> {
    let services = Arc::new(AppServices::build(&config.store).await?);
    Ok((router(&config.jwt_secret, services.clone()), services))
}

/// Router over already built services.
pub fn router(jwt_secret: &str, services: Arc<AppServices>) -> Router {
    let jwt = Arc::new(ledgerdesk_auth::Hs256JwtValidator::new(jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", protected)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::trace_requests)))
}
