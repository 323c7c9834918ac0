//! Parquet export of one instrument's analytics series.
//!
//! Writes are atomic: write to `.tmp`, then rename into place.

use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::Serialize;

use super::warehouse::Warehouse;
use crate::data::schema::{AnalyticsSchema, CLOSE, DATETIME, TICKER};
use crate::domain::AnalyticsRow;
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub instrument: String,
    pub rows: usize,
    pub path: PathBuf,
}

/// Export the analytics view for `instrument` to a Parquet file.
pub fn export_parquet(
    store: &Warehouse,
    instrument: &str,
    out: &Path,
) -> Result<ExportReport, PipelineError> {
    let rows = store.analytics(instrument)?;
    if rows.is_empty() {
        return Err(PipelineError::EmptySeries {
            instrument: instrument.to_string(),
            rows: 0,
        });
    }

    let mut df = analytics_frame(&rows)?;
    AnalyticsSchema::validate(&df).map_err(|e| PipelineError::Export(e.to_string()))?;

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = out.with_extension("parquet.tmp");
    write_parquet(&mut df, &tmp_path)?;
    fs::rename(&tmp_path, out).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        PipelineError::Export(format!("atomic rename failed: {e}"))
    })?;

    tracing::info!(instrument, rows = rows.len(), path = %out.display(), "exported analytics");
    Ok(ExportReport {
        instrument: instrument.to_string(),
        rows: rows.len(),
        path: out.to_path_buf(),
    })
}

/// Build a frame in the analytics view's column layout.
pub fn analytics_frame(rows: &[AnalyticsRow]) -> Result<DataFrame, PipelineError> {
    let map_err = |e: PolarsError| PipelineError::Export(format!("dataframe creation: {e}"));

    let datetimes: Vec<i64> = rows.iter().map(|r| r.timestamp.timestamp_millis()).collect();
    let tickers: Vec<&str> = rows.iter().map(|r| r.instrument_id.as_str()).collect();
    let closes: Vec<Option<f64>> = rows.iter().map(|r| r.close).collect();
    let ma: Vec<Option<f64>> = rows.iter().map(|r| r.moving_avg_7).collect();
    let prev: Vec<Option<f64>> = rows.iter().map(|r| r.prior_close).collect();
    let ret: Vec<Option<f64>> = rows.iter().map(|r| r.fractional_change).collect();

    DataFrame::new(vec![
        Column::new(DATETIME.into(), datetimes)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(map_err)?,
        Column::new(TICKER.into(), tickers),
        Column::new(CLOSE.into(), closes),
        Column::new("ma_7".into(), ma),
        Column::new("prev_close".into(), prev),
        Column::new("daily_return".into(), ret),
    ])
    .map_err(map_err)
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), PipelineError> {
    let file = fs::File::create(path)
        .map_err(|e| PipelineError::Export(format!("create {}: {e}", path.display())))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| PipelineError::Export(format!("write parquet: {e}")))?;
    Ok(())
}
