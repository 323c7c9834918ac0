//! Store DDL and queries.
//!
//! `Datetime` is stored as INTEGER epoch milliseconds; prices as REAL.
//! Every per-instrument query binds the instrument as `?1`.

/// Append-only raw table plus the batch log. Idempotent.
pub const CREATE_RAW: &str = r#"
CREATE TABLE IF NOT EXISTS raw_stock_data (
    obs_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id   INTEGER NOT NULL,
    "Datetime" INTEGER NOT NULL,
    "Ticker"   TEXT    NOT NULL,
    "Open"     REAL,
    "High"     REAL,
    "Low"      REAL,
    "Close"    REAL,
    "Volume"   REAL
);
CREATE INDEX IF NOT EXISTS idx_raw_ticker_datetime
    ON raw_stock_data ("Ticker", "Datetime");

CREATE TABLE IF NOT EXISTS ingest_log (
    batch_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    provider      TEXT    NOT NULL,
    instruments   TEXT    NOT NULL,
    period        TEXT    NOT NULL,
    interval      TEXT    NOT NULL,
    rows_appended INTEGER NOT NULL,
    warnings      TEXT    NOT NULL,
    fingerprint   TEXT    NOT NULL,
    ingested_at   INTEGER NOT NULL
);
"#;

/// Deduplication and analytics views. Idempotent.
///
/// Duplicates of a (Ticker, Datetime) key resolve to the last write:
/// the highest `obs_id`.
pub const CREATE_VIEWS: &str = r#"
CREATE VIEW IF NOT EXISTS v_clean_data AS
SELECT obs_id, batch_id, "Datetime", "Ticker", "Open", "High", "Low", "Close", "Volume"
FROM (
    SELECT *,
           ROW_NUMBER() OVER (
               PARTITION BY "Ticker", "Datetime"
               ORDER BY obs_id DESC
           ) AS row_num
    FROM raw_stock_data
)
WHERE row_num = 1;

CREATE VIEW IF NOT EXISTS v_market_analysis AS
SELECT
    "Datetime",
    "Ticker",
    "Close",
    AVG("Close") OVER (
        PARTITION BY "Ticker"
        ORDER BY "Datetime"
        ROWS BETWEEN 6 PRECEDING AND CURRENT ROW
    ) AS ma_7,
    LAG("Close", 1) OVER (PARTITION BY "Ticker" ORDER BY "Datetime") AS prev_close,
    ("Close" - LAG("Close", 1) OVER (PARTITION BY "Ticker" ORDER BY "Datetime"))
        / NULLIF(LAG("Close", 1) OVER (PARTITION BY "Ticker" ORDER BY "Datetime"), 0)
        AS daily_return
FROM v_clean_data;
"#;

/// Materialized copy of the analytics view and its per-instrument watermark.
pub const CREATE_MATERIALIZED: &str = r#"
CREATE TABLE IF NOT EXISTS mv_market_analysis (
    "Datetime"   INTEGER NOT NULL,
    "Ticker"     TEXT    NOT NULL,
    "Close"      REAL,
    ma_7         REAL,
    prev_close   REAL,
    daily_return REAL,
    PRIMARY KEY ("Ticker", "Datetime")
);

CREATE TABLE IF NOT EXISTS mv_watermark (
    "Ticker"      TEXT PRIMARY KEY,
    last_datetime INTEGER NOT NULL,
    last_obs_id   INTEGER NOT NULL,
    refreshed_at  INTEGER NOT NULL
);
"#;

/// Full wipe, dependents first.
pub const RESET: &str = r#"
DROP TABLE IF EXISTS mv_market_analysis;
DROP TABLE IF EXISTS mv_watermark;
DROP VIEW IF EXISTS v_market_analysis;
DROP VIEW IF EXISTS v_clean_data;
DROP TABLE IF EXISTS raw_stock_data;
DROP TABLE IF EXISTS ingest_log;
"#;

/// Objects `reset` removes, in drop order.
pub const RESET_ORDER: [&str; 6] = [
    "mv_market_analysis",
    "mv_watermark",
    "v_market_analysis",
    "v_clean_data",
    "raw_stock_data",
    "ingest_log",
];

pub const INSERT_BATCH: &str = r#"
INSERT INTO ingest_log
    (provider, instruments, period, interval, rows_appended, warnings, fingerprint, ingested_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
"#;

pub const INSERT_RAW: &str = r#"
INSERT INTO raw_stock_data
    (batch_id, "Datetime", "Ticker", "Open", "High", "Low", "Close", "Volume")
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
"#;

pub const SELECT_RAW: &str = r#"
SELECT obs_id, batch_id, "Datetime", "Ticker", "Open", "High", "Low", "Close", "Volume"
FROM raw_stock_data
ORDER BY obs_id
"#;

pub const SELECT_CLEAN: &str = r#"
SELECT "Datetime", "Ticker", "Open", "High", "Low", "Close", "Volume"
FROM v_clean_data
ORDER BY "Ticker", "Datetime"
"#;

pub const SELECT_CLEAN_FOR: &str = r#"
SELECT "Datetime", "Ticker", "Open", "High", "Low", "Close", "Volume"
FROM v_clean_data
WHERE "Ticker" = ?1
ORDER BY "Datetime"
"#;

pub const SELECT_CLEAN_AFTER: &str = r#"
SELECT "Datetime", "Ticker", "Open", "High", "Low", "Close", "Volume"
FROM v_clean_data
WHERE "Ticker" = ?1 AND "Datetime" > ?2
ORDER BY "Datetime"
"#;

pub const SELECT_ANALYTICS_FOR: &str = r#"
SELECT "Datetime", "Ticker", "Close", ma_7, prev_close, daily_return
FROM v_market_analysis
WHERE "Ticker" = ?1
ORDER BY "Datetime" ASC
"#;

pub const SELECT_MATERIALIZED_FOR: &str = r#"
SELECT "Datetime", "Ticker", "Close", ma_7, prev_close, daily_return
FROM mv_market_analysis
WHERE "Ticker" = ?1
ORDER BY "Datetime" ASC
"#;

pub const SELECT_INSTRUMENTS: &str = r#"
SELECT DISTINCT "Ticker" FROM v_market_analysis ORDER BY "Ticker"
"#;

pub const SELECT_OBJECTS: &str = r#"
SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1
"#;

pub const SELECT_BATCHES: &str = r#"
SELECT batch_id, provider, instruments, period, interval, rows_appended, warnings,
       fingerprint, ingested_at
FROM ingest_log
ORDER BY batch_id DESC
LIMIT ?1
"#;

pub const SELECT_RAW_COUNTS: &str = r#"
SELECT "Ticker", COUNT(*), MIN("Datetime"), MAX("Datetime")
FROM raw_stock_data
GROUP BY "Ticker"
ORDER BY "Ticker"
"#;

pub const SELECT_CLEAN_COUNTS: &str = r#"
SELECT "Ticker", COUNT(*) FROM v_clean_data GROUP BY "Ticker"
"#;

pub const SELECT_RAW_TICKERS: &str = r#"
SELECT DISTINCT "Ticker" FROM raw_stock_data ORDER BY "Ticker"
"#;

/// New raw rows for an instrument since a watermark: (count, min Datetime, max obs_id).
pub const SELECT_RAW_SINCE: &str = r#"
SELECT COUNT(*), MIN("Datetime"), MAX(obs_id)
FROM raw_stock_data
WHERE "Ticker" = ?1 AND obs_id > ?2
"#;

pub const SELECT_WATERMARK: &str = r#"
SELECT last_datetime, last_obs_id FROM mv_watermark WHERE "Ticker" = ?1
"#;

pub const UPSERT_WATERMARK: &str = r#"
INSERT INTO mv_watermark ("Ticker", last_datetime, last_obs_id, refreshed_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT ("Ticker") DO UPDATE SET
    last_datetime = excluded.last_datetime,
    last_obs_id   = excluded.last_obs_id,
    refreshed_at  = excluded.refreshed_at
"#;

/// Latest materialized rows, newest first.
pub const SELECT_MATERIALIZED_TAIL: &str = r#"
SELECT "Datetime", "Close" FROM mv_market_analysis
WHERE "Ticker" = ?1
ORDER BY "Datetime" DESC
LIMIT ?2
"#;

pub const DELETE_MATERIALIZED_FOR: &str = r#"
DELETE FROM mv_market_analysis WHERE "Ticker" = ?1
"#;

pub const INSERT_MATERIALIZED: &str = r#"
INSERT INTO mv_market_analysis ("Datetime", "Ticker", "Close", ma_7, prev_close, daily_return)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

pub const COUNT_MATERIALIZED: &str = r#"
SELECT COUNT(*) FROM mv_market_analysis
"#;
