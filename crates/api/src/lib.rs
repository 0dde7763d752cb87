//! HTTP API: configuration, authentication, routing and error mapping over
//! the lifecycle coordinator and read models.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;

pub use config::{ApiConfig, ConfigError, StoreConfig};
