//! Per-test project isolation.

use anyhow::Result;
use sqlx::postgres::PgConnection;
use sqlx::{Connection, PgPool};
use terrastat_db::{ProjectDb, SchemaName};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::test_retry_policy;
use crate::pool::TestPgPool;

/// RAII guard for a throwaway project.
///
/// Picks a unique project name, provisions its schema with
/// [`ProjectDb::recreate_schema`] and drops the schema again, either through
/// [`cleanup`](Self::cleanup) or on Drop.
pub struct ProjectSchemaGuard {
    pool: PgPool,
    url: String,
    project: String,
    schema: SchemaName,
    dropped: bool,
}

impl ProjectSchemaGuard {
    /// Provision a fresh project with a unique name.
    pub async fn new(pool: &TestPgPool) -> Result<Self> {
        let project = format!("Test {}", Uuid::new_v4().simple());
        Self::with_project(pool, &project).await
    }

    /// Provision a project with a given name, replacing any existing schema.
    pub async fn with_project(pool: &TestPgPool, project: &str) -> Result<Self> {
        let schema = SchemaName::for_project(project);
        debug!(project, schema = %schema, "Creating test project schema");

        let mut db = ProjectDb::from_pool(&pool.pool, project, test_retry_policy()).await?;
        db.recreate_schema().await?;
        db.close().await?;

        Ok(Self {
            pool: pool.pool.clone(),
            url: pool.config.url.clone(),
            project: project.to_string(),
            schema,
            dropped: false,
        })
    }

    /// Open a new store handle on its own connection.
    pub async fn open(&self) -> Result<ProjectDb> {
        let db = ProjectDb::from_pool(&self.pool, &self.project, test_retry_policy()).await?;
        Ok(db)
    }

    /// Project name, as passed to the store.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Derived schema name.
    pub fn schema(&self) -> &SchemaName {
        &self.schema
    }

    /// Drop the schema now and report failures.
    pub async fn cleanup(mut self) -> Result<()> {
        debug!(schema = %self.schema, "Dropping test project schema");
        sqlx::query(&drop_statement(&self.schema))
            .execute(&self.pool)
            .await?;
        self.dropped = true;
        Ok(())
    }
}

fn drop_statement(schema: &SchemaName) -> String {
    format!("DROP SCHEMA IF EXISTS {} CASCADE", schema)
}

impl Drop for ProjectSchemaGuard {
    fn drop(&mut self) {
        if self.dropped {
            return;
        }
        let url = self.url.clone();
        let schema = self.schema.clone();

        // The test's runtime stops right after its body, so anything spawned
        // on it may never run. Drop on a private runtime and wait for it.
        let outcome = std::thread::spawn(move || -> Result<()> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async {
                let mut conn = PgConnection::connect(&url).await?;
                sqlx::query(&drop_statement(&schema))
                    .execute(&mut conn)
                    .await?;
                conn.close().await?;
                Ok(())
            })
        })
        .join();

        match outcome {
            Ok(Ok(())) => debug!("Dropped test schema: {}", self.schema),
            Ok(Err(e)) => warn!("Failed to drop test schema {}: {:#}", self.schema, e),
            Err(_) => warn!("Schema cleanup thread panicked: {}", self.schema),
        }
    }
}
