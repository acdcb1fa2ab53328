//! PostgreSQL state store implementation for sapporo-web
//!
//! This crate provides a PostgreSQL implementation of the repository
//! interfaces defined in the sapporo-core crate. It is used whenever the
//! server runs with `DEBUG=false`.

use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use sapporo_core::{CoreError, Repositories};

pub mod migrations;
pub mod repositories;

pub use repositories::PostgresStore;

/// Configuration for PostgreSQL connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Timeout for acquiring a connection from the pool (in seconds)
    pub acquire_timeout_secs: u64,

    /// Whether to run migrations on startup
    pub run_migrations: bool,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "sapporo-web-database".to_string(),
            port: 5432,
            database: "sapporo-web".to_string(),
            user: "sapporo-web-user".to_string(),
            password: "sapporo-web-passwd".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 30,
            run_migrations: true,
        }
    }
}

impl PostgresConfig {
    /// Connection URL built from the individual settings
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }

    /// Same as [`connection_string`](Self::connection_string) with the password hidden
    pub fn redacted_connection_string(&self) -> String {
        format!(
            "postgres://{}:***@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
    }
}

/// PostgreSQL connection wrapper
#[derive(Debug, Clone)]
pub struct PostgresConnection {
    pool: PgPool,
}

impl PostgresConnection {
    /// Connect to PostgreSQL, running migrations when the config asks for it
    pub async fn new(config: &PostgresConfig) -> Result<Self, CoreError> {
        let pool = config
            .pool_options()
            .connect(&config.connection_string())
            .await
            .map_err(|e| CoreError::StateStoreError(format!("Failed to connect to PostgreSQL: {}", e)))?;
        debug!(url = %config.redacted_connection_string(), "Connected to PostgreSQL database");

        let conn = Self { pool };
        if config.run_migrations {
            conn.run_migrations().await?;
        }
        Ok(conn)
    }

    /// Build a pool that only connects on first use
    pub fn lazy(config: &PostgresConfig) -> Result<Self, CoreError> {
        let pool = config
            .pool_options()
            .connect_lazy(&config.connection_string())
            .map_err(|e| CoreError::ConfigurationError(format!("Invalid PostgreSQL settings: {}", e)))?;
        Ok(Self { pool })
    }

    /// Apply every migration that has not been recorded yet
    pub async fn run_migrations(&self) -> Result<Vec<&'static str>, CoreError> {
        debug!("Running PostgreSQL migrations...");
        sqlx::raw_sql(migrations::MIGRATIONS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StateStoreError(format!("Failed to prepare migrations table: {}", e)))?;

        let mut applied = Vec::new();
        for (migration_name, migration_sql) in migrations::generate_migrations() {
            let done: Option<(String,)> =
                sqlx::query_as("SELECT name FROM sapporo_migrations WHERE name = $1")
                    .bind(migration_name)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| CoreError::StateStoreError(e.to_string()))?;
            if done.is_some() {
                continue;
            }

            debug!("Applying migration: {}", migration_name);
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| CoreError::StateStoreError(e.to_string()))?;
            sqlx::raw_sql(migration_sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    CoreError::StateStoreError(format!("Migration '{}' failed: {}", migration_name, e))
                })?;
            sqlx::query("INSERT INTO sapporo_migrations (name) VALUES ($1)")
                .bind(migration_name)
                .execute(&mut *tx)
                .await
                .map_err(|e| CoreError::StateStoreError(e.to_string()))?;
            tx.commit()
                .await
                .map_err(|e| CoreError::StateStoreError(e.to_string()))?;
            applied.push(migration_name);
        }

        info!(applied = applied.len(), "PostgreSQL migrations completed successfully");
        Ok(applied)
    }

    /// Get the database connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Connect and hand out the repository bundle backed by PostgreSQL
pub async fn create_repositories(config: &PostgresConfig) -> Result<Repositories, CoreError> {
    let conn = PostgresConnection::new(config).await?;
    Ok(Repositories::from_store(Arc::new(PostgresStore::new(conn))))
}
