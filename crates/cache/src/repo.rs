//! Repository implementing the [`GeoCache`] capability over SQLite.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::model::{EntryBinds, EntryRow, STATUS_FAILED};
use async_trait::async_trait;
use exn::ResultExt;
use snapsort_geo::error::ErrorKind as GeoErrorKind;
use snapsort_geo::{CacheValue, GeoCache, QuantizedKey};
use sqlx::SqlitePool;
use time::UtcDateTime;
use tracing::debug;

/// Aggregate counts over the cache table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total: u64,
    pub resolved: u64,
    pub failed: u64,
}

/// Persistent geocode cache repository.
///
/// Writes are idempotent upserts; all resolutions for the same quantization
/// cell are equivalent, so last-write-wins between concurrent workers is
/// fine. The expiry check for failure entries lives in the resolver — this
/// repository returns rows as stored.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn lookup_inner(&self, key: QuantizedKey) -> Result<Option<CacheValue>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/lookup.sql"))
            .bind(i64::from(key.lat_q))
            .bind(i64::from(key.lon_q))
            .bind(i64::from(key.precision))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(CacheValue::try_from).transpose()
    }

    async fn store_inner(&self, key: QuantizedKey, value: CacheValue) -> Result<()> {
        let binds = EntryBinds::new(key, value);
        sqlx::query(include_str!("../queries/upsert.sql"))
            .bind(binds.lat_q)
            .bind(binds.lon_q)
            .bind(binds.precision)
            .bind(binds.status)
            .bind(binds.name)
            .bind(binds.granularity)
            .bind(binds.country)
            .bind(binds.state)
            .bind(binds.city)
            .bind(binds.park)
            .bind(binds.retry_after)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Aggregate counts, for the end-of-run summary and maintenance tooling.
    pub async fn stats(&self) -> Result<CacheStats> {
        let (total, resolved, failed): (i64, i64, i64) = sqlx::query_as(include_str!("../queries/stats.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(CacheStats {
            total: total.max(0) as u64,
            resolved: resolved.max(0) as u64,
            failed: failed.max(0) as u64,
        })
    }

    /// Delete failure entries whose retry-after embargo has elapsed. They
    /// read as misses anyway; this just keeps the table from accumulating
    /// dead rows across runs.
    pub async fn prune_failures(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM geocode_cache WHERE status = ? AND retry_after < ?")
            .bind(STATUS_FAILED)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        debug!(pruned = result.rows_affected(), "pruned failed geocode entries");
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl GeoCache for Repository {
    async fn lookup(&self, key: QuantizedKey) -> snapsort_geo::error::Result<Option<CacheValue>> {
        self.lookup_inner(key).await.or_raise(|| GeoErrorKind::Cache)
    }

    async fn store(&self, key: QuantizedKey, value: CacheValue) -> snapsort_geo::error::Result<()> {
        self.store_inner(key, value).await.or_raise(|| GeoErrorKind::Cache)
    }
}
