use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, Executor, PgPool};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::database::isolation::is_valid_setting_name;

/// Schema applied by `tag-service migrate`
const SCHEMA: &str = include_str!("../../sql/schema.sql");

/// Isolation variable the bundled row-level security policies are written against
const SCHEMA_ISOLATION_VARIABLE: &str = "app.current_tenant_id";

/// Errors from the storage collaborators
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid setting name: {0}")]
    InvalidSettingName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::Unavailable(err.to_string())
            }
            // unique_violation
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                DatabaseError::Duplicate(db.message().to_string())
            }
            _ => DatabaseError::Sqlx(err),
        }
    }
}

/// Owns the shared connection pool
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// Build the pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = config
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let mut options = PgConnectOptions::from_str(url)?;
        if !config.enable_query_logging {
            options = options.disable_statement_logging();
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await?;

        info!("Created database pool (max {} connections)", config.max_connections);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Apply the bundled schema (idempotent), with its policies reading `isolation_variable`
    pub async fn migrate(&self, isolation_variable: &str) -> Result<(), DatabaseError> {
        let schema = render_schema(isolation_variable)?;
        self.pool.execute(schema.as_str()).await?;
        info!("Applied database schema (isolation variable {})", isolation_variable);
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}

/// The bundled schema with its policies reading `isolation_variable`
pub fn render_schema(isolation_variable: &str) -> Result<String, DatabaseError> {
    if !is_valid_setting_name(isolation_variable) {
        return Err(DatabaseError::InvalidSettingName(isolation_variable.to_string()));
    }
    Ok(SCHEMA.replace(SCHEMA_ISOLATION_VARIABLE, isolation_variable))
}
