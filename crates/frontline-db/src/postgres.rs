//! `PostgreSQL` connection pool.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time checked)
//! so that building the crate never needs a live database. Pool size and
//! acquire timeout come from [`StorageConfig`]; idle connections are
//! recycled after [`IDLE_TIMEOUT`].

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use frontline_core::config::StorageConfig;

use crate::error::DbError;

/// How long an unused pooled connection is kept open.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection pool handle to `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

/// Pool options derived from the storage settings.
fn pool_options(config: &StorageConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout())
        .idle_timeout(IDLE_TIMEOUT)
}

impl PostgresPool {
    /// Connect to `storage.postgres_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Postgres`] if the connection fails.
    pub async fn connect(config: &StorageConfig) -> Result<Self, DbError> {
        let connect_options: PgConnectOptions = config
            .postgres_url
            .parse()
            .map_err(|e: sqlx::Error| DbError::Config(format!("Invalid database URL: {e}")))?;

        let pool = pool_options(config).connect_with(connect_options).await?;

        tracing::info!(
            max_connections = config.max_connections,
            connect_timeout_ms = config.connect_timeout_ms,
            "Connected to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Run all pending migrations from the `migrations/` directory.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Migration`] if any migration fails.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// The underlying [`PgPool`].
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close all connections in the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }

    /// Whether [`PostgresPool::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_options_follow_storage_config() {
        let config = StorageConfig {
            max_connections: 9,
            connect_timeout_ms: 1_500,
            ..StorageConfig::default()
        };
        let options = pool_options(&config);
        assert_eq!(options.get_max_connections(), 9);
        assert_eq!(options.get_acquire_timeout(), Duration::from_millis(1_500));
        assert_eq!(options.get_idle_timeout(), Some(IDLE_TIMEOUT));
    }

    #[tokio::test]
    async fn unparseable_url_is_a_config_error() {
        let config = StorageConfig {
            postgres_url: String::from("not a url"),
            ..StorageConfig::default()
        };
        assert!(matches!(
            PostgresPool::connect(&config).await,
            Err(DbError::Config(_))
        ));
    }
}
