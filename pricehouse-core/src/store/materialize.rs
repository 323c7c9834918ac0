//! Incremental refresh of `mv_market_analysis`.
//!
//! Each instrument carries a watermark: the last materialized `Datetime` and
//! the highest raw `obs_id` seen. Raw rows past the watermark that all lie
//! after the last materialized timestamp are appended through
//! [`RollingAnalytics`], resumed from the stored tail. A new row at or
//! before that timestamp (late or revised data) invalidates the stored
//! rows, and the instrument is recomputed from the clean view.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use serde::Serialize;

use super::sql;
use super::warehouse::{schema_aware, Warehouse};
use crate::analytics::{RollingAnalytics, MA_WINDOW};
use crate::domain::observation::from_millis;
use crate::domain::{AnalyticsRow, CleanObservation};
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    UpToDate,
    Incremental,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentRefresh {
    pub instrument: String,
    pub mode: RefreshMode,
    pub rows_written: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeReport {
    pub instruments: Vec<InstrumentRefresh>,
}

impl MaterializeReport {
    pub fn rows_written(&self) -> usize {
        self.instruments.iter().map(|i| i.rows_written).sum()
    }
}

#[derive(Debug, Clone, Copy)]
struct Watermark {
    last_datetime: i64,
    last_obs_id: i64,
}

/// Bring the materialized analytics up to date with the raw table.
///
/// Runs in one transaction; readers never see a half-refreshed instrument.
pub fn materialize(store: &mut Warehouse) -> Result<MaterializeReport, PipelineError> {
    if !store.views_present()? {
        return Err(PipelineError::Schema(
            "views v_clean_data / v_market_analysis are missing (run `pricehouse setup` first)"
                .into(),
        ));
    }

    let instruments: Vec<String> = {
        let mut stmt = store.conn().prepare(sql::SELECT_RAW_TICKERS).map_err(schema_aware)?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<_, _>>()?
    };

    // Clean rows are read through the warehouse before the write transaction
    // opens; the plan is then applied atomically.
    let mut plans = Vec::with_capacity(instruments.len());
    for instrument in instruments {
        plans.push(plan(store, instrument)?);
    }

    let conn = store.conn_mut();
    let tx = conn.transaction()?;
    tx.execute_batch(sql::CREATE_MATERIALIZED)?;
    let mut report = MaterializeReport::default();
    for plan in plans {
        report.instruments.push(apply(&tx, plan)?);
    }
    tx.commit()?;

    tracing::info!(
        instruments = report.instruments.len(),
        rows = report.rows_written(),
        "materialized analytics refreshed"
    );
    Ok(report)
}

/// What to do for one instrument.
struct Plan {
    instrument: String,
    mode: RefreshMode,
    rows: Vec<AnalyticsRow>,
    /// New watermark; `None` leaves it untouched.
    watermark: Option<Watermark>,
}

fn plan(store: &Warehouse, instrument: String) -> Result<Plan, PipelineError> {
    let conn = store.conn();
    let watermark = if store.object_exists("mv_watermark")? {
        conn.query_row(sql::SELECT_WATERMARK, [&instrument], |row| {
            Ok(Watermark {
                last_datetime: row.get(0)?,
                last_obs_id: row.get(1)?,
            })
        })
        .optional()?
    } else {
        None
    };

    let since = watermark.map_or(0, |w| w.last_obs_id);
    let (new_rows, min_datetime, max_obs_id): (i64, Option<i64>, Option<i64>) = conn.query_row(
        sql::SELECT_RAW_SINCE,
        params![instrument, since],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let (Some(min_datetime), Some(max_obs_id)) = (min_datetime, max_obs_id) else {
        return Ok(Plan {
            instrument,
            mode: RefreshMode::UpToDate,
            rows: Vec::new(),
            watermark: None,
        });
    };

    let (mode, rows) = match watermark {
        Some(w) if min_datetime > w.last_datetime => {
            let tail = materialized_tail(store, &instrument)?;
            let mut engine = RollingAnalytics::resume(instrument.clone(), tail);
            let clean = store.clean_after(&instrument, w.last_datetime)?;
            (RefreshMode::Incremental, run(&mut engine, &clean)?)
        }
        previous => {
            if previous.is_some() {
                tracing::info!(
                    instrument = %instrument,
                    new_rows,
                    "late or revised rows, recomputing"
                );
            }
            let mut engine = RollingAnalytics::new(instrument.clone());
            let clean = store.clean_observations(Some(&instrument))?;
            (RefreshMode::Full, run(&mut engine, &clean)?)
        }
    };

    let last_datetime = rows
        .last()
        .map(|r| r.timestamp.timestamp_millis())
        .or(watermark.map(|w| w.last_datetime))
        .unwrap_or(min_datetime);

    Ok(Plan {
        instrument,
        mode,
        rows,
        watermark: Some(Watermark {
            last_datetime,
            last_obs_id: max_obs_id,
        }),
    })
}

fn materialized_tail(
    store: &Warehouse,
    instrument: &str,
) -> Result<Vec<(DateTime<Utc>, Option<f64>)>, PipelineError> {
    let mut stmt = store.conn().prepare(sql::SELECT_MATERIALIZED_TAIL)?;
    let rows = stmt.query_map(params![instrument, MA_WINDOW as i64], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, Option<f64>>(1)?))
    })?;
    let mut tail = Vec::with_capacity(MA_WINDOW);
    for row in rows {
        let (ms, close) = row?;
        if let Some(ts) = from_millis(ms) {
            tail.push((ts, close));
        }
    }
    tail.reverse();
    Ok(tail)
}

fn run(
    engine: &mut RollingAnalytics,
    clean: &[CleanObservation],
) -> Result<Vec<AnalyticsRow>, PipelineError> {
    clean
        .iter()
        .map(|obs| engine.push(obs).map_err(PipelineError::from))
        .collect()
}

fn apply(tx: &Transaction<'_>, plan: Plan) -> Result<InstrumentRefresh, PipelineError> {
    if plan.mode == RefreshMode::Full {
        tx.execute(sql::DELETE_MATERIALIZED_FOR, [&plan.instrument])?;
    }
    {
        let mut insert = tx.prepare_cached(sql::INSERT_MATERIALIZED)?;
        for row in &plan.rows {
            insert.execute(params![
                row.timestamp.timestamp_millis(),
                row.instrument_id,
                row.close,
                row.moving_avg_7,
                row.prior_close,
                row.fractional_change,
            ])?;
        }
    }
    if let Some(w) = plan.watermark {
        tx.execute(
            sql::UPSERT_WATERMARK,
            params![
                plan.instrument,
                w.last_datetime,
                w.last_obs_id,
                Utc::now().timestamp_millis()
            ],
        )?;
    }

    tracing::debug!(
        instrument = %plan.instrument,
        mode = ?plan.mode,
        rows = plan.rows.len(),
        "instrument refreshed"
    );
    Ok(InstrumentRefresh {
        instrument: plan.instrument,
        mode: plan.mode,
        rows_written: plan.rows.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use crate::store::BatchMeta;
    use chrono::{Duration, TimeZone};

    fn meta() -> BatchMeta {
        BatchMeta {
            provider: "test".into(),
            instruments: vec!["X".into()],
            period: "1d".into(),
            interval: "1h".into(),
            warnings: Vec::new(),
            fingerprint: String::new(),
        }
    }

    fn obs(hour: i64, close: f64) -> Observation {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        Observation::close_only("X", t0 + Duration::hours(hour), close)
    }

    fn store() -> Warehouse {
        let mut store = Warehouse::open_in_memory().unwrap();
        store.setup().unwrap();
        store
    }

    #[test]
    fn first_run_is_full_then_up_to_date() {
        let mut store = store();
        store.append_batch(&meta(), &[obs(0, 1.0), obs(1, 2.0)]).unwrap();

        let report = materialize(&mut store).unwrap();
        assert_eq!(report.instruments[0].mode, RefreshMode::Full);
        assert_eq!(report.rows_written(), 2);

        let report = materialize(&mut store).unwrap();
        assert_eq!(report.instruments[0].mode, RefreshMode::UpToDate);
        assert_eq!(report.rows_written(), 0);
    }

    #[test]
    fn tail_rows_extend_incrementally() {
        let mut store = store();
        store.append_batch(&meta(), &[obs(0, 1.0), obs(1, 2.0)]).unwrap();
        materialize(&mut store).unwrap();

        store.append_batch(&meta(), &[obs(2, 3.0), obs(3, 4.0)]).unwrap();
        let report = materialize(&mut store).unwrap();
        assert_eq!(report.instruments[0].mode, RefreshMode::Incremental);
        assert_eq!(report.rows_written(), 2);

        let rows = store.materialized_analytics("X").unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2].prior_close, Some(2.0));
        assert_eq!(rows[3].moving_avg_7, Some(2.5));
    }

    #[test]
    fn overlapping_window_forces_full_recompute() {
        let mut store = store();
        store.append_batch(&meta(), &[obs(0, 1.0), obs(1, 2.0)]).unwrap();
        materialize(&mut store).unwrap();

        // Re-ingesting an overlapping window repeats hour 1.
        store.append_batch(&meta(), &[obs(1, 2.0), obs(2, 3.0)]).unwrap();
        let report = materialize(&mut store).unwrap();
        assert_eq!(report.instruments[0].mode, RefreshMode::Full);
        assert_eq!(store.materialized_analytics("X").unwrap().len(), 3);
    }

    #[test]
    fn requires_views() {
        let mut store = Warehouse::open_in_memory().unwrap();
        store.append_batch(&meta(), &[obs(0, 1.0)]).unwrap();
        assert!(matches!(materialize(&mut store), Err(PipelineError::Schema(_))));
    }
}
