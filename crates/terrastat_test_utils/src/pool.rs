//! PostgreSQL test pool factory.

use anyhow::{Context, Result};
use sqlx::PgPool;
use terrastat_db::{create_pool, DbConfig};
use tracing::info;

use crate::config::TestDbConfig;

/// A PostgreSQL connection pool for testing.
#[derive(Debug, Clone)]
pub struct TestPgPool {
    /// The underlying sqlx pool
    pub pool: PgPool,
    /// Configuration the pool was created from
    pub config: DbConfig,
}

impl TestPgPool {
    /// Connect to the server named by `TERRASTAT_TEST_DATABASE_URL`.
    pub async fn from_env() -> Result<Self> {
        let config = TestDbConfig::from_env().db_config();
        info!(max_connections = config.max_connections, "Creating PostgreSQL test pool");

        let pool = create_pool(&config)
            .await
            .context("Failed to connect to test database; is TERRASTAT_TEST_DATABASE_URL set?")?;
        Ok(Self { pool, config })
    }
}
