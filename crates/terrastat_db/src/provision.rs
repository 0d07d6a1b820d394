//! Project schema provisioning.
//!
//! Administrative only: recreating a schema destroys every row in it and must
//! not run while tasks write to the same project.

use sqlx::Connection;
use tracing::{info, warn};

use crate::error::Result;
use crate::schema_name::SchemaName;
use crate::ProjectDb;

impl ProjectDb {
    /// Drop the project schema (if any) and create it empty.
    ///
    /// Runs in one transaction; on failure the previous schema is left intact.
    pub async fn recreate_schema(&mut self) -> Result<()> {
        warn!(schema = %self.schema, "Recreating project schema, existing data will be dropped");

        let mut tx = self.conn.begin().await?;
        for statement in schema_statements(&self.schema) {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!(schema = %self.schema, "Project schema created");
        Ok(())
    }

    /// Whether the project schema exists.
    pub async fn schema_exists(&mut self) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
        )
        .bind(self.schema.as_str())
        .fetch_one(&mut self.conn)
        .await?;
        Ok(exists)
    }
}

/// DDL for a fresh project schema, in execution order.
fn schema_statements(schema: &SchemaName) -> Vec<String> {
    let zone_fields = schema.qualify("zone_fields");
    let zones = schema.qualify("zones");
    let zonal_stats = schema.qualify("zonal_stats");

    vec![
        format!("DROP SCHEMA IF EXISTS {} CASCADE", schema),
        format!("CREATE SCHEMA {}", schema),
        format!(
            r#"
            CREATE TABLE {zone_fields} (
                zone_field_id INTEGER PRIMARY KEY,
                shapefile TEXT NOT NULL,
                field TEXT NOT NULL,
                UNIQUE (shapefile, field)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE {zones} (
                zone_id INTEGER PRIMARY KEY,
                zone_field_id INTEGER NOT NULL REFERENCES {zone_fields} (zone_field_id),
                name TEXT NOT NULL,
                UNIQUE (zone_field_id, name)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE {zonal_stats} (
                index_code INTEGER NOT NULL,
                year INTEGER NOT NULL,
                day INTEGER NOT NULL,
                zone_id INTEGER NOT NULL REFERENCES {zones} (zone_id),
                count DOUBLE PRECISION NOT NULL,
                sum DOUBLE PRECISION NOT NULL,
                mean DOUBLE PRECISION NOT NULL,
                stdev DOUBLE PRECISION NOT NULL,
                PRIMARY KEY (index_code, year, day, zone_id)
            )
            "#
        ),
        format!("CREATE INDEX ix_zones_zone_field_id ON {zones} (zone_field_id)"),
        format!("CREATE INDEX ix_zonal_stats_zone_id ON {zonal_stats} (zone_id)"),
    ]
}
