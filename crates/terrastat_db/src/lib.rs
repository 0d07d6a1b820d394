//! Project-scoped store for zonal statistics.
//!
//! Every project lives in its own PostgreSQL schema (`project_<folded name>`)
//! holding two dimension tables (`zone_fields`, `zones`) and one fact table
//! (`zonal_stats`). Writers on different hosts coordinate only through
//! SERIALIZABLE transactions; conflicts are retried per [`RetryPolicy`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use terrastat_db::{DbConfig, ProjectDb, ZonalStatRecord};
//!
//! let config = DbConfig::new("postgres://localhost/terrastat");
//! let mut db = ProjectDb::connect(&config, "ga_aea").await?;
//!
//! // Administrative, destroys existing data
//! db.recreate_schema().await?;
//!
//! // Dimensions are created on first reference
//! let zone_id = db.upsert_zonal_stat(&record).await?;
//! ```
//!
//! A `ProjectDb` owns a single connection and all of its methods take
//! `&mut self`. Concurrent units of work each open their own.

mod dimension;
mod error;
mod fact;
mod pool;
mod provision;
mod schema_name;
mod tx;
mod types;

pub use error::{DbError, Result, DEADLOCK_DETECTED, SERIALIZATION_FAILURE};
pub use pool::{create_pool, DbConfig};
pub use schema_name::{fold_identifier, SchemaName, MAX_IDENTIFIER_LEN, SCHEMA_PREFIX};
pub use tx::{run_serializable, RetryPolicy, SerializableWork};
pub use types::*;

use sqlx::postgres::{PgConnection, PgPool};
use sqlx::Connection;
use tracing::debug;

/// Handle to one project's schema over a dedicated connection.
pub struct ProjectDb {
    conn: PgConnection,
    schema: SchemaName,
    retry: RetryPolicy,
}

impl ProjectDb {
    /// Open a fresh connection for a project.
    pub async fn connect(config: &DbConfig, project: &str) -> Result<Self> {
        let conn = config.connect().await?;
        Ok(Self::from_connection(conn, project, config.retry))
    }

    /// Detach a connection from a pool for a project.
    ///
    /// The connection leaves the pool for good; it closes when the
    /// `ProjectDb` is dropped or [`close`](Self::close)d.
    pub async fn from_pool(pool: &PgPool, project: &str, retry: RetryPolicy) -> Result<Self> {
        let conn = pool.acquire().await?.detach();
        Ok(Self::from_connection(conn, project, retry))
    }

    /// Wrap an already open connection.
    pub fn from_connection(conn: PgConnection, project: &str, retry: RetryPolicy) -> Self {
        let schema = SchemaName::for_project(project);
        debug!(project, schema = %schema, "Project store ready");
        Self {
            conn,
            schema,
            retry,
        }
    }

    /// Schema this handle reads and writes.
    pub fn schema(&self) -> &SchemaName {
        &self.schema
    }

    /// Close the underlying connection gracefully.
    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}
