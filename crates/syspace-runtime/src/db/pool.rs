use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use tracing::debug;

use syspace_core::config::DatabaseConfig;
use syspace_core::error::{Result, SyspaceError};

/// Database connection wrapper providing connection pooling.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    config: DatabaseConfig,
}

impl Database {
    /// Create a new database connection from configuration.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(SyspaceError::Config("database url is empty".into()));
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| SyspaceError::Database(format!("Failed to connect: {}", e)))?;

        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check out a dedicated session.
    ///
    /// Advisory locks and transactions are session-scoped, so a migration run
    /// keeps one connection for its whole duration.
    pub async fn session(&self) -> Result<PoolConnection<Postgres>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| SyspaceError::Database(format!("Failed to acquire connection: {}", e)))?;

        if let Some(secs) = self.config.statement_timeout_secs {
            debug!("Setting statement_timeout to {}s", secs);
            sqlx::query(&format!("SET statement_timeout = '{}s'", secs))
                .execute(&mut *conn)
                .await?;
        }

        Ok(conn)
    }
}
