//! Zonal statistics facts (insert-or-update).

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::Row;
use tracing::debug;

use crate::dimension::{zone_field_id_in, zone_id_in};
use crate::error::{DbError, Result};
use crate::schema_name::SchemaName;
use crate::tx::{run_serializable, SerializableWork};
use crate::types::{FactKey, ZonalStatRecord, ZonalStats, ZoneId, ZoneKey};
use crate::ProjectDb;

impl ProjectDb {
    /// Record one statistic, creating its zone field and zone on first use.
    ///
    /// Dimension resolution and the fact write share one SERIALIZABLE
    /// transaction: either everything becomes visible or nothing does.
    /// An existing fact with the same key is overwritten in place.
    pub async fn upsert_zonal_stat(&mut self, record: &ZonalStatRecord) -> Result<ZoneId> {
        validate_record(record)?;
        let work = UpsertWork {
            schema: &self.schema,
            record,
        };
        run_serializable(&mut self.conn, &self.retry, &work).await
    }

    /// Read back a statistic by zone and key.
    pub async fn fetch_zonal_stat(
        &mut self,
        zone_id: ZoneId,
        key: &FactKey,
    ) -> Result<Option<ZonalStats>> {
        let sql = format!(
            "SELECT count, sum, mean, stdev FROM {} \
             WHERE index_code = $1 AND year = $2 AND day = $3 AND zone_id = $4",
            self.schema.qualify("zonal_stats")
        );
        let row = sqlx::query(&sql)
            .bind(key.index.code())
            .bind(key.year)
            .bind(key.day)
            .bind(zone_id.0)
            .fetch_optional(&mut self.conn)
            .await?;

        match row {
            Some(row) => Ok(Some(ZonalStats {
                count: row.try_get("count")?,
                sum: row.try_get("sum")?,
                mean: row.try_get("mean")?,
                stdev: row.try_get("stdev")?,
            })),
            None => Ok(None),
        }
    }

    /// Number of fact rows.
    pub async fn count_zonal_stats(&mut self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.schema.qualify("zonal_stats"));
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(count)
    }
}

fn validate_record(record: &ZonalStatRecord) -> Result<()> {
    if !(1..=366).contains(&record.key.day) {
        return Err(DbError::invalid_input(format!(
            "day of year out of range: {}",
            record.key.day
        )));
    }
    Ok(())
}

struct UpsertWork<'a> {
    schema: &'a SchemaName,
    record: &'a ZonalStatRecord,
}

#[async_trait]
impl SerializableWork for UpsertWork<'_> {
    type Output = ZoneId;

    fn label(&self) -> &'static str {
        "zonal_stat.upsert"
    }

    async fn apply(&self, conn: &mut PgConnection) -> Result<ZoneId> {
        let record = self.record;
        let zone_field_id = zone_field_id_in(conn, self.schema, &record.zone_field).await?;
        let zone_id = zone_id_in(
            conn,
            self.schema,
            &ZoneKey::new(zone_field_id, record.zone.clone()),
        )
        .await?;

        let table = self.schema.qualify("zonal_stats");
        let exists_sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} \
             WHERE index_code = $1 AND year = $2 AND day = $3 AND zone_id = $4)",
            table
        );
        let exists = sqlx::query_scalar::<_, bool>(&exists_sql)
            .bind(record.key.index.code())
            .bind(record.key.year)
            .bind(record.key.day)
            .bind(zone_id.0)
            .fetch_one(&mut *conn)
            .await?;

        let stats = &record.stats;
        if exists {
            let sql = format!(
                "UPDATE {} SET count = $1, sum = $2, mean = $3, stdev = $4 \
                 WHERE index_code = $5 AND year = $6 AND day = $7 AND zone_id = $8",
                table
            );
            sqlx::query(&sql)
                .bind(stats.count)
                .bind(stats.sum)
                .bind(stats.mean)
                .bind(stats.stdev)
                .bind(record.key.index.code())
                .bind(record.key.year)
                .bind(record.key.day)
                .bind(zone_id.0)
                .execute(&mut *conn)
                .await?;
        } else {
            let sql = format!(
                "INSERT INTO {} (index_code, year, day, zone_id, count, sum, mean, stdev) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                table
            );
            sqlx::query(&sql)
                .bind(record.key.index.code())
                .bind(record.key.year)
                .bind(record.key.day)
                .bind(zone_id.0)
                .bind(stats.count)
                .bind(stats.sum)
                .bind(stats.mean)
                .bind(stats.stdev)
                .execute(&mut *conn)
                .await?;
        }

        debug!(
            schema = %self.schema,
            index = %record.key.index,
            year = record.key.year,
            day = record.key.day,
            zone_id = zone_id.0,
            updated = exists,
            "Recorded zonal stat"
        );
        Ok(zone_id)
    }
}
