//! Process configuration read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("USE_PERSISTENT_STORES is set but DATABASE_URL is missing")]
    MissingDatabaseUrl,

    #[error("persistent stores need the `postgres` feature")]
    PersistenceUnavailable,
}

/// Where events are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub store: StoreConfig,
}

impl ApiConfig {
    /// In-memory stores; used by tests and local runs.
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: jwt_secret.into(),
            store: StoreConfig::InMemory,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match var("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: raw,
            })?,
            None => 8080,
        };

        let jwt_secret = match var("JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let persistent = match var("USE_PERSISTENT_STORES") {
            Some(raw) => parse_flag(&raw).ok_or(ConfigError::Invalid {
                name: "USE_PERSISTENT_STORES",
                value: raw,
            })?,
            None => false,
        };
        let store = if persistent {
            if !cfg!(feature = "postgres") {
                return Err(ConfigError::PersistenceUnavailable);
            }
            let database_url = var("DATABASE_URL")
                .filter(|u| !u.is_empty())
                .ok_or(ConfigError::MissingDatabaseUrl)?;
            StoreConfig::Postgres { database_url }
        } else {
            StoreConfig::InMemory
        };

        Ok(Self {
            host,
            port,
            jwt_secret,
            store,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: "HOST",
                value: self.host.clone(),
            })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
