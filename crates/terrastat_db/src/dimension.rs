//! Zone field and zone dimensions (get-or-create).
//!
//! Ids are `MAX(id) + 1`, or 0 for an empty table. Lookup, id allocation and
//! insert run in one SERIALIZABLE transaction so two callers racing on the
//! same new key cannot both insert; the loser retries and finds the winner's row.

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use tracing::debug;

use crate::error::Result;
use crate::schema_name::SchemaName;
use crate::tx::{run_serializable, SerializableWork};
use crate::types::{ZoneFieldId, ZoneFieldKey, ZoneId, ZoneKey};
use crate::ProjectDb;

impl ProjectDb {
    // ========================================================================
    // Zone fields
    // ========================================================================

    /// Look up the id of a (shapefile, field) pair without creating it.
    pub async fn lookup_zone_field(&mut self, key: &ZoneFieldKey) -> Result<Option<ZoneFieldId>> {
        lookup_zone_field_in(&mut self.conn, &self.schema, key).await
    }

    /// Id of a (shapefile, field) pair, created on first reference.
    pub async fn get_or_create_zone_field(&mut self, key: &ZoneFieldKey) -> Result<ZoneFieldId> {
        let work = ZoneFieldWork {
            schema: &self.schema,
            key,
        };
        run_serializable(&mut self.conn, &self.retry, &work).await
    }

    // ========================================================================
    // Zones
    // ========================================================================

    /// Look up the id of a (zone field, name) pair without creating it.
    pub async fn lookup_zone(&mut self, key: &ZoneKey) -> Result<Option<ZoneId>> {
        lookup_zone_in(&mut self.conn, &self.schema, key).await
    }

    /// Id of a (zone field, name) pair, created on first reference.
    pub async fn get_or_create_zone(&mut self, key: &ZoneKey) -> Result<ZoneId> {
        let work = ZoneWork {
            schema: &self.schema,
            key,
        };
        run_serializable(&mut self.conn, &self.retry, &work).await
    }

    /// Number of zone field rows. Mostly useful to tests and diagnostics.
    pub async fn count_zone_fields(&mut self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.schema.qualify("zone_fields"));
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(count)
    }

    /// Number of zone rows.
    pub async fn count_zones(&mut self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.schema.qualify("zones"));
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(count)
    }
}

struct ZoneFieldWork<'a> {
    schema: &'a SchemaName,
    key: &'a ZoneFieldKey,
}

#[async_trait]
impl SerializableWork for ZoneFieldWork<'_> {
    type Output = ZoneFieldId;

    fn label(&self) -> &'static str {
        "zone_field.get_or_create"
    }

    async fn apply(&self, conn: &mut PgConnection) -> Result<ZoneFieldId> {
        zone_field_id_in(conn, self.schema, self.key).await
    }
}

struct ZoneWork<'a> {
    schema: &'a SchemaName,
    key: &'a ZoneKey,
}

#[async_trait]
impl SerializableWork for ZoneWork<'_> {
    type Output = ZoneId;

    fn label(&self) -> &'static str {
        "zone.get_or_create"
    }

    async fn apply(&self, conn: &mut PgConnection) -> Result<ZoneId> {
        zone_id_in(conn, self.schema, self.key).await
    }
}

// ============================================================================
// Statement helpers (caller owns the transaction)
// ============================================================================

async fn lookup_zone_field_in(
    conn: &mut PgConnection,
    schema: &SchemaName,
    key: &ZoneFieldKey,
) -> Result<Option<ZoneFieldId>> {
    let sql = format!(
        "SELECT zone_field_id FROM {} WHERE shapefile = $1 AND field = $2",
        schema.qualify("zone_fields")
    );
    let id = sqlx::query_scalar::<_, i32>(&sql)
        .bind(&key.shapefile)
        .bind(&key.field)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id.map(ZoneFieldId))
}

/// Get-or-create a zone field inside the caller's transaction.
pub(crate) async fn zone_field_id_in(
    conn: &mut PgConnection,
    schema: &SchemaName,
    key: &ZoneFieldKey,
) -> Result<ZoneFieldId> {
    if let Some(id) = lookup_zone_field_in(conn, schema, key).await? {
        return Ok(id);
    }

    let table = schema.qualify("zone_fields");
    let next = next_id(conn, &table, "zone_field_id").await?;
    let sql = format!(
        "INSERT INTO {} (zone_field_id, shapefile, field) VALUES ($1, $2, $3)",
        table
    );
    sqlx::query(&sql)
        .bind(next)
        .bind(&key.shapefile)
        .bind(&key.field)
        .execute(&mut *conn)
        .await?;

    debug!(
        schema = %schema,
        shapefile = %key.shapefile,
        field = %key.field,
        zone_field_id = next,
        "Created zone field"
    );
    Ok(ZoneFieldId(next))
}

async fn lookup_zone_in(
    conn: &mut PgConnection,
    schema: &SchemaName,
    key: &ZoneKey,
) -> Result<Option<ZoneId>> {
    let sql = format!(
        "SELECT zone_id FROM {} WHERE zone_field_id = $1 AND name = $2",
        schema.qualify("zones")
    );
    let id = sqlx::query_scalar::<_, i32>(&sql)
        .bind(key.zone_field_id.0)
        .bind(&key.name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id.map(ZoneId))
}

/// Get-or-create a zone inside the caller's transaction.
pub(crate) async fn zone_id_in(
    conn: &mut PgConnection,
    schema: &SchemaName,
    key: &ZoneKey,
) -> Result<ZoneId> {
    if let Some(id) = lookup_zone_in(conn, schema, key).await? {
        return Ok(id);
    }

    let table = schema.qualify("zones");
    let next = next_id(conn, &table, "zone_id").await?;
    let sql = format!(
        "INSERT INTO {} (zone_id, zone_field_id, name) VALUES ($1, $2, $3)",
        table
    );
    sqlx::query(&sql)
        .bind(next)
        .bind(key.zone_field_id.0)
        .bind(&key.name)
        .execute(&mut *conn)
        .await?;

    debug!(
        schema = %schema,
        zone_field_id = key.zone_field_id.0,
        zone = %key.name,
        zone_id = next,
        "Created zone"
    );
    Ok(ZoneId(next))
}

async fn next_id(conn: &mut PgConnection, table: &str, column: &str) -> Result<i32> {
    let sql = format!("SELECT MAX({}) FROM {}", column, table);
    let max = sqlx::query_scalar::<_, Option<i32>>(&sql)
        .fetch_one(&mut *conn)
        .await?;
    Ok(next_after(max))
}

fn next_after(max: Option<i32>) -> i32 {
    max.map_or(0, |current| current + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_after_empty_is_zero() {
        assert_eq!(next_after(None), 0);
    }

    #[test]
    fn test_next_after_existing_max() {
        assert_eq!(next_after(Some(0)), 1);
        assert_eq!(next_after(Some(41)), 42);
    }
}
