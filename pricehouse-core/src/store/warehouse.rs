//! The warehouse handle: one SQLite connection with an explicit lifecycle.
//!
//! Built from configuration, passed to every operation and closed at
//! shutdown. Appends run in a single transaction; the views are plain SQL
//! views recomputed on every read.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::sql;
use crate::config::StoreConfig;
use crate::domain::observation::from_millis;
use crate::domain::{AnalyticsRow, CleanObservation, Observation, RawObservation};
use crate::error::PipelineError;

/// Metadata recorded in `ingest_log` alongside an appended batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMeta {
    pub provider: String,
    pub instruments: Vec<String>,
    pub period: String,
    pub interval: String,
    pub warnings: Vec<String>,
    /// BLAKE3 hex digest of the normalized rows.
    pub fingerprint: String,
}

/// One `ingest_log` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestBatch {
    pub batch_id: i64,
    pub rows_appended: u64,
    pub ingested_at: DateTime<Utc>,
    #[serde(flatten)]
    pub meta: BatchMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentStatus {
    pub instrument: String,
    pub raw_rows: u64,
    pub clean_rows: u64,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

/// Store-wide counts for `pricehouse status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStatus {
    pub location: String,
    pub raw_table: bool,
    pub views: bool,
    pub materialized: bool,
    pub raw_rows: u64,
    pub clean_rows: u64,
    pub materialized_rows: u64,
    pub batches: u64,
    pub last_ingest: Option<DateTime<Utc>>,
    pub instruments: Vec<InstrumentStatus>,
}

impl StoreStatus {
    /// Raw rows that the dedup view collapses away.
    pub fn duplicate_rows(&self) -> u64 {
        self.raw_rows.saturating_sub(self.clean_rows)
    }
}

pub struct Warehouse {
    conn: Connection,
    location: String,
}

impl std::fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warehouse")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl Warehouse {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::Connectivity(format!("create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(|e| unreachable_store(path, e))?;
        Self::configure(conn, path.display().to_string())
    }

    /// Open an existing database without creating it.
    pub fn open_existing(path: &Path) -> Result<Self, PipelineError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn =
            Connection::open_with_flags(path, flags).map_err(|e| unreachable_store(path, e))?;
        Self::configure(conn, path.display().to_string())
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, PipelineError> {
        Self::open(&config.path)
    }

    pub fn open_in_memory() -> Result<Self, PipelineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PipelineError::Connectivity(format!("open in-memory store: {e}")))?;
        Ok(Self {
            conn,
            location: ":memory:".to_string(),
        })
    }

    fn configure(conn: Connection, location: String) -> Result<Self, PipelineError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(location = %location, journal_mode = %mode, "store opened");
        Ok(Self { conn, location })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Close the connection, surfacing any error from the final flush.
    pub fn close(self) -> Result<(), PipelineError> {
        let location = self.location;
        self.conn.close().map_err(|(_, e)| PipelineError::Store(e))?;
        tracing::debug!(location = %location, "store closed");
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Create the raw table, the views and the materialization tables.
    ///
    /// Idempotent: existing objects are left as they are.
    pub fn setup(&mut self) -> Result<(), PipelineError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(sql::CREATE_RAW)?;
        tx.execute_batch(sql::CREATE_VIEWS)?;
        tx.execute_batch(sql::CREATE_MATERIALIZED)?;
        tx.commit()?;
        tracing::info!(location = %self.location, "store schema ready");
        Ok(())
    }

    /// Drop every store object, dependents first, in one transaction.
    ///
    /// Destructive: all ingested history is gone afterwards.
    pub fn reset(&mut self) -> Result<(), PipelineError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(sql::RESET)?;
        tx.commit()?;
        tracing::warn!(location = %self.location, dropped = ?sql::RESET_ORDER, "store reset");
        Ok(())
    }

    pub fn object_exists(&self, name: &str) -> Result<bool, PipelineError> {
        Ok(self
            .conn
            .query_row(sql::SELECT_OBJECTS, [name], |_| Ok(()))
            .optional()?
            .is_some())
    }

    pub fn views_present(&self) -> Result<bool, PipelineError> {
        Ok(self.object_exists("v_clean_data")? && self.object_exists("v_market_analysis")?)
    }

    // ── Writes ──────────────────────────────────────────────────────

    /// Append a normalized batch and its log entry in one transaction.
    ///
    /// No deduplication happens here. Returns the new batch id.
    pub fn append_batch(
        &mut self,
        meta: &BatchMeta,
        observations: &[Observation],
    ) -> Result<i64, PipelineError> {
        let instruments = to_json(&meta.instruments)?;
        let warnings = to_json(&meta.warnings)?;

        let tx = self.conn.transaction()?;
        tx.execute_batch(sql::CREATE_RAW)?;
        tx.execute(
            sql::INSERT_BATCH,
            params![
                meta.provider,
                instruments,
                meta.period,
                meta.interval,
                observations.len() as i64,
                warnings,
                meta.fingerprint,
                Utc::now().timestamp_millis(),
            ],
        )?;
        let batch_id = tx.last_insert_rowid();
        {
            let mut insert = tx.prepare_cached(sql::INSERT_RAW)?;
            for obs in observations {
                insert.execute(params![
                    batch_id,
                    obs.timestamp_millis(),
                    obs.instrument_id,
                    obs.open,
                    obs.high,
                    obs.low,
                    obs.close,
                    obs.volume,
                ])?;
            }
        }
        tx.commit()?;

        tracing::info!(batch_id, rows = observations.len(), "batch appended");
        Ok(batch_id)
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// Every raw row in ingestion order.
    pub fn raw_observations(&self) -> Result<Vec<RawObservation>, PipelineError> {
        let mut stmt = self.conn.prepare(sql::SELECT_RAW).map_err(schema_aware)?;
        let rows = stmt.query_map([], |row| {
            Ok(RawObservation {
                seq: row.get(0)?,
                batch_id: row.get(1)?,
                observation: observation_from_row(row, 2)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// The dedup view, optionally for one instrument.
    pub fn clean_observations(
        &self,
        instrument: Option<&str>,
    ) -> Result<Vec<CleanObservation>, PipelineError> {
        let rows = match instrument {
            Some(instrument) => {
                let mut stmt = self.conn.prepare(sql::SELECT_CLEAN_FOR).map_err(schema_aware)?;
                let rows = stmt.query_map([instrument], |row| observation_from_row(row, 0))?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(sql::SELECT_CLEAN).map_err(schema_aware)?;
                let rows = stmt.query_map([], |row| observation_from_row(row, 0))?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    }

    pub(crate) fn clean_after(
        &self,
        instrument: &str,
        after_millis: i64,
    ) -> Result<Vec<CleanObservation>, PipelineError> {
        let mut stmt = self.conn.prepare(sql::SELECT_CLEAN_AFTER).map_err(schema_aware)?;
        let rows = stmt.query_map(params![instrument, after_millis], |row| {
            observation_from_row(row, 0)
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// The analytics view for one instrument, timestamp ascending.
    pub fn analytics(&self, instrument: &str) -> Result<Vec<AnalyticsRow>, PipelineError> {
        self.analytics_from(sql::SELECT_ANALYTICS_FOR, instrument)
    }

    /// The materialized analytics for one instrument, timestamp ascending.
    pub fn materialized_analytics(
        &self,
        instrument: &str,
    ) -> Result<Vec<AnalyticsRow>, PipelineError> {
        self.analytics_from(sql::SELECT_MATERIALIZED_FOR, instrument)
    }

    fn analytics_from(
        &self,
        query: &str,
        instrument: &str,
    ) -> Result<Vec<AnalyticsRow>, PipelineError> {
        let mut stmt = self.conn.prepare(query).map_err(schema_aware)?;
        let rows = stmt.query_map([instrument], |row| {
            Ok(AnalyticsRow {
                timestamp: timestamp_at(row, 0)?,
                instrument_id: row.get(1)?,
                close: row.get(2)?,
                moving_avg_7: row.get(3)?,
                prior_close: row.get(4)?,
                fractional_change: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Distinct instruments in the analytics view.
    pub fn instruments(&self) -> Result<Vec<String>, PipelineError> {
        let mut stmt = self.conn.prepare(sql::SELECT_INSTRUMENTS).map_err(schema_aware)?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Most recent ingest batches, newest first.
    pub fn recent_batches(&self, limit: usize) -> Result<Vec<IngestBatch>, PipelineError> {
        let mut stmt = self.conn.prepare(sql::SELECT_BATCHES).map_err(schema_aware)?;
        let rows = stmt.query_map([limit as i64], |row| {
            let instruments: String = row.get(2)?;
            let warnings: String = row.get(6)?;
            Ok(IngestBatch {
                batch_id: row.get(0)?,
                rows_appended: row.get::<_, i64>(5)?.max(0) as u64,
                ingested_at: timestamp_at(row, 8)?,
                meta: BatchMeta {
                    provider: row.get(1)?,
                    instruments: from_json(&instruments, 2)?,
                    period: row.get(3)?,
                    interval: row.get(4)?,
                    warnings: from_json(&warnings, 6)?,
                    fingerprint: row.get(7)?,
                },
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Counts per instrument plus which store objects exist.
    pub fn status(&self) -> Result<StoreStatus, PipelineError> {
        let raw_table = self.object_exists("raw_stock_data")?;
        let views = self.views_present()?;
        let materialized = self.object_exists("mv_market_analysis")?;

        let mut status = StoreStatus {
            location: self.location.clone(),
            raw_table,
            views,
            materialized,
            raw_rows: 0,
            clean_rows: 0,
            materialized_rows: 0,
            batches: 0,
            last_ingest: None,
            instruments: Vec::new(),
        };
        if !raw_table {
            return Ok(status);
        }

        let mut stmt = self.conn.prepare(sql::SELECT_RAW_COUNTS)?;
        let per_instrument = stmt.query_map([], |row| {
            Ok(InstrumentStatus {
                instrument: row.get(0)?,
                raw_rows: row.get::<_, i64>(1)?.max(0) as u64,
                clean_rows: 0,
                first: row.get::<_, Option<i64>>(2)?.and_then(from_millis),
                last: row.get::<_, Option<i64>>(3)?.and_then(from_millis),
            })
        })?;
        status.instruments = per_instrument.collect::<Result<_, _>>()?;

        if views {
            let mut stmt = self.conn.prepare(sql::SELECT_CLEAN_COUNTS)?;
            let counts = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for count in counts {
                let (instrument, clean) = count?;
                if let Some(entry) = status
                    .instruments
                    .iter_mut()
                    .find(|s| s.instrument == instrument)
                {
                    entry.clean_rows = clean.max(0) as u64;
                }
            }
        }
        if materialized {
            let rows: i64 = self.conn.query_row(sql::COUNT_MATERIALIZED, [], |row| row.get(0))?;
            status.materialized_rows = rows.max(0) as u64;
        }

        status.raw_rows = status.instruments.iter().map(|s| s.raw_rows).sum();
        status.clean_rows = status.instruments.iter().map(|s| s.clean_rows).sum();

        if self.object_exists("ingest_log")? {
            let (batches, last): (i64, Option<i64>) = self.conn.query_row(
                "SELECT COUNT(*), MAX(ingested_at) FROM ingest_log",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            status.batches = batches.max(0) as u64;
            status.last_ingest = last.and_then(from_millis);
        }
        Ok(status)
    }
}

fn unreachable_store(path: &Path, e: rusqlite::Error) -> PipelineError {
    PipelineError::Connectivity(format!("cannot open store {}: {e}", path.display()))
}

/// Map "no such table" (a missing view or table) to a schema error.
pub(crate) fn schema_aware(e: rusqlite::Error) -> PipelineError {
    let message = e.to_string();
    if message.contains("no such table") {
        PipelineError::Schema(format!("{message} (run `pricehouse setup` first)"))
    } else {
        PipelineError::Store(e)
    }
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    from_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

/// Read `Datetime, Ticker, Open, High, Low, Close, Volume` starting at `start`.
fn observation_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<Observation> {
    Ok(Observation {
        timestamp: timestamp_at(row, start)?,
        instrument_id: row.get(start + 1)?,
        open: row.get(start + 2)?,
        high: row.get(start + 3)?,
        low: row.get(start + 4)?,
        close: row.get(start + 5)?,
        volume: row.get(start + 6)?,
    })
}

fn to_json(values: &[String]) -> Result<String, PipelineError> {
    serde_json::to_string(values)
        .map_err(|e| PipelineError::Store(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))
}

fn from_json(text: &str, idx: usize) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta(instruments: &[&str]) -> BatchMeta {
        BatchMeta {
            provider: "test".into(),
            instruments: instruments.iter().map(|s| s.to_string()).collect(),
            period: "1d".into(),
            interval: "1h".into(),
            warnings: Vec::new(),
            fingerprint: "abc".into(),
        }
    }

    fn obs(ticker: &str, hour: u32, close: f64) -> Observation {
        Observation::close_only(
            ticker,
            Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            close,
        )
    }

    #[test]
    fn append_assigns_increasing_sequence() {
        let mut store = Warehouse::open_in_memory().unwrap();
        store.setup().unwrap();
        let b1 = store.append_batch(&meta(&["X"]), &[obs("X", 9, 1.0)]).unwrap();
        let b2 = store
            .append_batch(&meta(&["X"]), &[obs("X", 9, 1.0), obs("X", 10, 2.0)])
            .unwrap();
        assert!(b2 > b1);

        let raw = store.raw_observations().unwrap();
        assert_eq!(raw.len(), 3);
        assert!(raw.windows(2).all(|w| w[0].seq < w[1].seq));
        assert_eq!(raw[2].batch_id, b2);
    }

    #[test]
    fn append_works_before_setup() {
        let mut store = Warehouse::open_in_memory().unwrap();
        store.append_batch(&meta(&["X"]), &[obs("X", 9, 1.0)]).unwrap();
        assert_eq!(store.raw_observations().unwrap().len(), 1);
        assert!(!store.views_present().unwrap());
    }

    #[test]
    fn missing_views_are_schema_errors() {
        let store = Warehouse::open_in_memory().unwrap();
        let err = store.analytics("X").unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)), "{err}");
        assert!(matches!(store.instruments(), Err(PipelineError::Schema(_))));
    }

    #[test]
    fn reset_drops_everything() {
        let mut store = Warehouse::open_in_memory().unwrap();
        store.setup().unwrap();
        store.append_batch(&meta(&["X"]), &[obs("X", 9, 1.0)]).unwrap();
        store.reset().unwrap();

        for name in sql::RESET_ORDER {
            assert!(!store.object_exists(name).unwrap(), "{name} survived reset");
        }
        let status = store.status().unwrap();
        assert!(!status.raw_table && !status.views);
        assert_eq!(status.raw_rows, 0);
    }

    #[test]
    fn status_counts_duplicates() {
        let mut store = Warehouse::open_in_memory().unwrap();
        store.setup().unwrap();
        store
            .append_batch(&meta(&["X", "Y"]), &[obs("X", 9, 1.0), obs("Y", 9, 5.0)])
            .unwrap();
        store.append_batch(&meta(&["X"]), &[obs("X", 9, 1.0)]).unwrap();

        let status = store.status().unwrap();
        assert_eq!(status.raw_rows, 3);
        assert_eq!(status.clean_rows, 2);
        assert_eq!(status.duplicate_rows(), 1);
        assert_eq!(status.batches, 2);
        assert_eq!(status.instruments.len(), 2);
        assert!(status.last_ingest.is_some());

        let batches = store.recent_batches(10).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].rows_appended, 1);
        assert_eq!(batches[1].meta.instruments, vec!["X", "Y"]);
    }

    #[test]
    fn file_store_reopens_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prices.db");
        let mut store = Warehouse::open(&path).unwrap();
        store.setup().unwrap();
        store.append_batch(&meta(&["X"]), &[obs("X", 9, 1.0)]).unwrap();
        store.close().unwrap();

        let store = Warehouse::open_existing(&path).unwrap();
        assert_eq!(store.raw_observations().unwrap().len(), 1);
        assert_eq!(store.location(), path.display().to_string());
    }

    #[test]
    fn open_existing_refuses_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Warehouse::open_existing(&dir.path().join("absent.db")).unwrap_err();
        assert!(err.is_connectivity());
    }
}
