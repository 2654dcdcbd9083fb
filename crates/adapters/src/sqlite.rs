//! SQLite-backed chrono and quota statistics store.
//!
//! Timestamps are stored as Unix seconds, calendar days as `YYYY-MM-DD`. Both
//! upsert paths add into existing rows; the year table is replaced wholesale.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use stratus_domain::{OperationKey, YearVerbStats};
use stratus_ports::{
    BoxFuture, ChronoBucketRow, ChronoStorePort, DayRowQuery, QuotaDayRow, QuotaStorePort,
    QuotaYearRow, ServiceId, Verb, VerbMap,
};
use stratus_shared::{ErrorEnvelope, RequestContext, Result};
use tokio::task::spawn_blocking;

/// Version stamped into `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Statistics store over a single SQLite connection.
pub struct SqliteStatsStore {
    conn: Arc<Mutex<Connection>>,
    location: Box<str>,
}

impl std::fmt::Debug for SqliteStatsStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SqliteStatsStore")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl SqliteStatsStore {
    /// Open (or create) the database at `path`.
    ///
    /// A database stamped with another schema version is moved aside as
    /// `<name>.legacy.v<version>` and a fresh one is created.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_connection(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: path.display().to_string().into_boxed_str(),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|error| sqlite_error("open", &error.to_string()))?;
        init_schema(&conn)?;
        stamp_version(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: ":memory:".into(),
        })
    }

    /// Database path, or `:memory:`.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    async fn with_conn<T, F>(&self, ctx: &RequestContext, operation: &'static str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        ctx.ensure_not_cancelled(operation)?;
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            work(&guard)
        })
        .await
        .map_err(|error| sqlite_error(operation, &format!("task failed: {error}")))?
    }
}

fn sqlite_error(operation: &str, message: &str) -> ErrorEnvelope {
    ErrorEnvelope::storage("sqlite", format!("sqlite {operation} failed: {message}"))
        .with_metadata("operation", operation)
}

fn count_column(verb: Verb) -> String {
    format!("{}_count", verb.column())
}

fn year_columns(verb: Verb) -> [String; 4] {
    let column = verb.column();
    [
        format!("{column}_sum"),
        format!("{column}_rate"),
        format!("{column}_count_quota"),
        format!("{column}_rate_quota"),
    ]
}

fn integer(value: u64) -> SqlValue {
    SqlValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
}

fn timestamp(value: DateTime<Utc>) -> SqlValue {
    SqlValue::Integer(value.timestamp())
}

fn day_text(day: NaiveDate) -> SqlValue {
    SqlValue::Text(day.format(DAY_FORMAT).to_string())
}

fn from_timestamp(seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| sqlite_error("decode", &format!("timestamp {seconds} out of range")))
}

fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|error| sqlite_error("mkdir", &error.to_string()))?;
        }
    }

    let conn = open_file(path)?;
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|error| sqlite_error("version", &error.to_string()))?;

    if version != 0 && version != SCHEMA_VERSION {
        drop(conn);
        rotate_legacy(path, version)?;
        let fresh = open_file(path)?;
        init_schema(&fresh)?;
        stamp_version(&fresh)?;
        return Ok(fresh);
    }
    init_schema(&conn)?;
    if version == 0 {
        stamp_version(&conn)?;
    }
    Ok(conn)
}

fn open_file(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|error| sqlite_error("open", &error.to_string()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .map_err(|error| sqlite_error("pragma", &error.to_string()))?;
    Ok(conn)
}

fn stamp_version(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))
        .map_err(|error| sqlite_error("version set", &error.to_string()))
}

fn init_schema(conn: &Connection) -> Result<()> {
    let day_columns: Vec<String> = Verb::ALL
        .into_iter()
        .map(|verb| format!("{} INTEGER NOT NULL DEFAULT 0", count_column(verb)))
        .collect();
    let year_columns: Vec<String> = Verb::ALL
        .into_iter()
        .flat_map(year_columns)
        .map(|column| format!("{column} INTEGER NOT NULL DEFAULT 0"))
        .collect();

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS chrono_buckets (
            bucket INTEGER NOT NULL,
            operation TEXT NOT NULL,
            count INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            PRIMARY KEY (bucket, operation)
         );
         CREATE TABLE IF NOT EXISTS quota_day (
            bucket INTEGER NOT NULL,
            service TEXT NOT NULL,
            {day},
            PRIMARY KEY (bucket, service)
         );
         CREATE TABLE IF NOT EXISTS quota_year (
            day TEXT NOT NULL,
            service TEXT NOT NULL,
            {year},
            PRIMARY KEY (day, service)
         );",
        day = day_columns.join(",\n            "),
        year = year_columns.join(",\n            "),
    ))
    .map_err(|error| sqlite_error("schema", &error.to_string()))
}

fn rotate_legacy(path: &Path, version: i64) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| sqlite_error("rotate", "path has no file name"))?
        .to_string_lossy()
        .into_owned();
    for suffix in ["", "-wal", "-shm"] {
        let current: PathBuf = path.with_file_name(format!("{file_name}{suffix}"));
        if current.exists() {
            let legacy = path.with_file_name(format!("{file_name}{suffix}.legacy.v{version}"));
            std::fs::rename(&current, &legacy)
                .map_err(|error| sqlite_error("rotate", &error.to_string()))?;
        }
    }
    Ok(())
}

fn day_upsert_sql() -> String {
    let columns: Vec<String> = Verb::ALL.into_iter().map(count_column).collect();
    let placeholders: Vec<String> = (3..3 + columns.len()).map(|index| format!("?{index}")).collect();
    let updates: Vec<String> = columns
        .iter()
        .map(|column| format!("{column} = {column} + excluded.{column}"))
        .collect();
    format!(
        "INSERT INTO quota_day (bucket, service, {}) VALUES (?1, ?2, {})
         ON CONFLICT(bucket, service) DO UPDATE SET {}",
        columns.join(", "),
        placeholders.join(", "),
        updates.join(", "),
    )
}

fn year_replace_sql() -> String {
    let columns: Vec<String> = Verb::ALL.into_iter().flat_map(year_columns).collect();
    let placeholders: Vec<String> = (3..3 + columns.len()).map(|index| format!("?{index}")).collect();
    format!(
        "INSERT OR REPLACE INTO quota_year (day, service, {}) VALUES (?1, ?2, {})",
        columns.join(", "),
        placeholders.join(", "),
    )
}

fn read_u64(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(index)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(index, value))
}

fn read_counts(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<VerbMap<u64>> {
    let mut counts = VerbMap::<u64>::default();
    for (index, verb) in Verb::ALL.into_iter().enumerate() {
        *counts.get_mut(verb) = read_u64(row, offset + index)?;
    }
    Ok(counts)
}

fn read_year_stats(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<VerbMap<YearVerbStats>> {
    let mut stats = VerbMap::<YearVerbStats>::default();
    for (index, verb) in Verb::ALL.into_iter().enumerate() {
        let base = offset + index * 4;
        *stats.get_mut(verb) = YearVerbStats {
            sum: read_u64(row, base)?,
            rate: read_u64(row, base + 1)?,
            count_quota: read_u64(row, base + 2)?,
            rate_quota: read_u64(row, base + 3)?,
        };
    }
    Ok(stats)
}

fn parse_service(raw: &str) -> Result<ServiceId> {
    ServiceId::parse(raw).map_err(|error| sqlite_error("decode", &error.to_string()))
}

impl ChronoStorePort for SqliteStatsStore {
    fn upsert_add(&self, ctx: &RequestContext, row: ChronoBucketRow) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.with_conn(&ctx, "chrono upsert", move |conn| {
                conn.execute(
                    "INSERT INTO chrono_buckets (bucket, operation, count, duration_ms)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(bucket, operation) DO UPDATE SET
                        count = count + excluded.count,
                        duration_ms = duration_ms + excluded.duration_ms",
                    params_from_iter([
                        timestamp(row.bucket),
                        SqlValue::Text(row.operation.as_str().to_owned()),
                        integer(row.count),
                        integer(row.duration_ms),
                    ]),
                )
                .map_err(|error| sqlite_error("chrono upsert", &error.to_string()))?;
                Ok(())
            })
            .await
        })
    }

    fn rows_since(
        &self,
        ctx: &RequestContext,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<ChronoBucketRow>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let raw = self
                .with_conn(&ctx, "chrono query", move |conn| {
                    let mut statement = conn
                        .prepare(
                            "SELECT bucket, operation, count, duration_ms FROM chrono_buckets
                             WHERE bucket >= ?1 ORDER BY bucket, operation",
                        )
                        .map_err(|error| sqlite_error("chrono query", &error.to_string()))?;
                    let rows = statement
                        .query_map([since.timestamp()], |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, String>(1)?,
                                read_u64(row, 2)?,
                                read_u64(row, 3)?,
                            ))
                        })
                        .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
                        .map_err(|error| sqlite_error("chrono query", &error.to_string()))?;
                    Ok(rows)
                })
                .await?;

            raw.into_iter()
                .map(|(bucket, operation, count, duration_ms)| {
                    Ok(ChronoBucketRow {
                        bucket: from_timestamp(bucket)?,
                        operation: OperationKey::parse(&operation)
                            .map_err(|error| sqlite_error("decode", &error.to_string()))?,
                        count,
                        duration_ms,
                    })
                })
                .collect()
        })
    }

    fn delete_before(
        &self,
        ctx: &RequestContext,
        before: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.with_conn(&ctx, "chrono delete", move |conn| {
                let removed = conn
                    .execute(
                        "DELETE FROM chrono_buckets WHERE bucket < ?1",
                        [before.timestamp()],
                    )
                    .map_err(|error| sqlite_error("chrono delete", &error.to_string()))?;
                Ok(removed as u64)
            })
            .await
        })
    }
}

impl QuotaStorePort for SqliteStatsStore {
    fn upsert_add_day(&self, ctx: &RequestContext, row: QuotaDayRow) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.with_conn(&ctx, "day upsert", move |conn| {
                let mut values = vec![
                    timestamp(row.bucket),
                    SqlValue::Text(row.service.as_str().to_owned()),
                ];
                values.extend(row.counts.iter().map(|(_, count)| integer(*count)));
                conn.execute(&day_upsert_sql(), params_from_iter(values))
                    .map_err(|error| sqlite_error("day upsert", &error.to_string()))?;
                Ok(())
            })
            .await
        })
    }

    fn day_rows(
        &self,
        ctx: &RequestContext,
        query: DayRowQuery,
    ) -> BoxFuture<'_, Result<Vec<QuotaDayRow>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let raw = self
                .with_conn(&ctx, "day query", move |conn| {
                    let columns: Vec<String> = Verb::ALL.into_iter().map(count_column).collect();
                    let mut sql = format!(
                        "SELECT bucket, service, {} FROM quota_day WHERE bucket >= ?1",
                        columns.join(", ")
                    );
                    let mut values = vec![timestamp(query.since)];
                    if let Some(until) = query.until {
                        values.push(timestamp(until));
                        sql.push_str(&format!(" AND bucket < ?{}", values.len()));
                    }
                    if let Some(service) = query.service.as_ref() {
                        values.push(SqlValue::Text(service.as_str().to_owned()));
                        sql.push_str(&format!(" AND service = ?{}", values.len()));
                    }
                    sql.push_str(" ORDER BY bucket, service");

                    let mut statement = conn
                        .prepare(&sql)
                        .map_err(|error| sqlite_error("day query", &error.to_string()))?;
                    let rows = statement
                        .query_map(params_from_iter(values), |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, String>(1)?,
                                read_counts(row, 2)?,
                            ))
                        })
                        .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
                        .map_err(|error| sqlite_error("day query", &error.to_string()))?;
                    Ok(rows)
                })
                .await?;

            raw.into_iter()
                .map(|(bucket, service, counts)| {
                    Ok(QuotaDayRow {
                        bucket: from_timestamp(bucket)?,
                        service: parse_service(&service)?,
                        counts,
                    })
                })
                .collect()
        })
    }

    fn replace_year(&self, ctx: &RequestContext, row: QuotaYearRow) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.with_conn(&ctx, "year replace", move |conn| {
                let mut values = vec![
                    day_text(row.day),
                    SqlValue::Text(row.service.as_str().to_owned()),
                ];
                for (_, stats) in row.stats.iter() {
                    values.extend([
                        integer(stats.sum),
                        integer(stats.rate),
                        integer(stats.count_quota),
                        integer(stats.rate_quota),
                    ]);
                }
                conn.execute(&year_replace_sql(), params_from_iter(values))
                    .map_err(|error| sqlite_error("year replace", &error.to_string()))?;
                Ok(())
            })
            .await
        })
    }

    fn year_rows(
        &self,
        ctx: &RequestContext,
        service: Option<ServiceId>,
        since: NaiveDate,
    ) -> BoxFuture<'_, Result<Vec<QuotaYearRow>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let raw = self
                .with_conn(&ctx, "year query", move |conn| {
                    let columns: Vec<String> =
                        Verb::ALL.into_iter().flat_map(year_columns).collect();
                    let mut sql = format!(
                        "SELECT day, service, {} FROM quota_year WHERE day >= ?1",
                        columns.join(", ")
                    );
                    let mut values = vec![day_text(since)];
                    if let Some(service) = service.as_ref() {
                        values.push(SqlValue::Text(service.as_str().to_owned()));
                        sql.push_str(" AND service = ?2");
                    }
                    sql.push_str(" ORDER BY day, service");

                    let mut statement = conn
                        .prepare(&sql)
                        .map_err(|error| sqlite_error("year query", &error.to_string()))?;
                    let rows = statement
                        .query_map(params_from_iter(values), |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                read_year_stats(row, 2)?,
                            ))
                        })
                        .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
                        .map_err(|error| sqlite_error("year query", &error.to_string()))?;
                    Ok(rows)
                })
                .await?;

            raw.into_iter()
                .map(|(day, service, stats)| {
                    Ok(QuotaYearRow {
                        day: NaiveDate::parse_from_str(&day, DAY_FORMAT)
                            .map_err(|error| sqlite_error("decode", &error.to_string()))?,
                        service: parse_service(&service)?,
                        stats,
                    })
                })
                .collect()
        })
    }

    fn delete_day_before(
        &self,
        ctx: &RequestContext,
        before: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.with_conn(&ctx, "day delete", move |conn| {
                let removed = conn
                    .execute("DELETE FROM quota_day WHERE bucket < ?1", [before.timestamp()])
                    .map_err(|error| sqlite_error("day delete", &error.to_string()))?;
                Ok(removed as u64)
            })
            .await
        })
    }

    fn delete_year_before(
        &self,
        ctx: &RequestContext,
        before: NaiveDate,
    ) -> BoxFuture<'_, Result<u64>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.with_conn(&ctx, "year delete", move |conn| {
                let removed = conn
                    .execute(
                        "DELETE FROM quota_year WHERE day < ?1",
                        params_from_iter([day_text(before)]),
                    )
                    .map_err(|error| sqlite_error("year delete", &error.to_string()))?;
                Ok(removed as u64)
            })
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_sql_covers_every_verb() {
        let upsert = day_upsert_sql();
        assert!(upsert.contains("delete_count = delete_count + excluded.delete_count"));
        assert!(upsert.contains("?7"));
        let replace = year_replace_sql();
        assert!(replace.contains("patch_rate_quota"));
        assert!(replace.contains("?22"));
    }

    #[tokio::test]
    async fn in_memory_store_starts_empty() -> Result<()> {
        let ctx = RequestContext::new_tick();
        let store = SqliteStatsStore::open_in_memory()?;
        assert_eq!(store.location(), ":memory:");
        let rows = store
            .rows_since(&ctx, DateTime::<Utc>::UNIX_EPOCH)
            .await?;
        assert!(rows.is_empty());
        Ok(())
    }
}
