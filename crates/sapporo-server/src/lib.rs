//!
//! sapporo-web server - web front end for GA4GH WES services
//!
//! This crate exports all the components of the sapporo-web server.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use sapporo_core::Repositories;

/// Admin console models
pub mod admin;

/// HTTP routes and handlers
pub mod api;

/// Password hashing and validation
pub mod auth;

/// Configuration module
pub mod config;

/// CSRF protection
pub mod csrf;

/// Error module
pub mod error;

/// Server module
pub mod server;

/// Session store
pub mod session;

/// HTML templates
pub mod templates;

/// WES client
pub mod wes;

// Re-export key types
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::SapporoServer;
pub use wes::{ReqwestWesClient, WesClient};

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    init_logging(&config);

    let secret_key = config.load_secret_key()?;
    let repos = create_repositories(&config).await?;
    let wes = Arc::new(ReqwestWesClient::new(Duration::from_secs(config.wes_timeout_secs))?);

    let server = SapporoServer::new(config, repos, wes, &secret_key)?;
    server.run().await
}

/// Initialize logging
///
/// `RUST_LOG` wins over `LOG_LEVEL`. DEBUG mode logs human-readable lines,
/// otherwise one JSON object per line.
pub fn init_logging(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_directive()));

    let result = if config.debug {
        fmt().with_env_filter(filter).with_target(true).try_init()
    } else {
        fmt().json().with_env_filter(filter).with_target(true).try_init()
    };
    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

/// Create the repositories: in memory when DEBUG is set, PostgreSQL otherwise
pub async fn create_repositories(config: &ServerConfig) -> ServerResult<Repositories> {
    if config.debug {
        info!("Using in-memory state store");
        return Ok(sapporo_state_inmemory::create_repositories());
    }

    info!(
        database = %config.postgres.redacted_connection_string(),
        "Using PostgreSQL state store"
    );
    Ok(sapporo_state_postgres::create_repositories(&config.postgres).await?)
}
