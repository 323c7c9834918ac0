//! Reference analytics: full recompute of the analytics view.
//!
//! Per instrument, ordered by timestamp ascending:
//! - `ma_7`: mean close over the row and up to 6 preceding rows (nulls skipped)
//! - `prev_close`: close of the preceding row
//! - `daily_return`: `(close - prev_close) / prev_close`, null on a zero prior

use std::collections::BTreeMap;

use crate::domain::{AnalyticsRow, CleanObservation};

/// Rows in the moving-average window, current row included.
pub const MA_WINDOW: usize = 7;

/// Fractional change from `prior` to `close`.
///
/// `None` when either side is missing or the prior is exactly zero.
pub fn fractional_change(close: Option<f64>, prior: Option<f64>) -> Option<f64> {
    match (close, prior) {
        (Some(close), Some(prior)) if prior != 0.0 => Some((close - prior) / prior),
        _ => None,
    }
}

/// Mean of the non-null values; `None` if there are none.
pub(crate) fn mean_present(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Compute analytics rows for a set of clean observations.
///
/// Input order does not matter and instruments may be interleaved; each
/// instrument is computed in isolation. Output is ordered by instrument,
/// then timestamp.
pub fn analyze(clean: &[CleanObservation]) -> Vec<AnalyticsRow> {
    let mut partitions: BTreeMap<&str, Vec<&CleanObservation>> = BTreeMap::new();
    for obs in clean {
        partitions
            .entry(obs.instrument_id.as_str())
            .or_default()
            .push(obs);
    }

    let mut out = Vec::with_capacity(clean.len());
    for (_, mut series) in partitions {
        series.sort_by_key(|obs| obs.timestamp);
        let closes: Vec<Option<f64>> = series.iter().map(|obs| obs.close).collect();

        for (i, obs) in series.iter().enumerate() {
            let start = i.saturating_sub(MA_WINDOW - 1);
            let prior_close = i.checked_sub(1).and_then(|p| closes[p]);
            out.push(AnalyticsRow {
                instrument_id: obs.instrument_id.clone(),
                timestamp: obs.timestamp,
                close: obs.close,
                moving_avg_7: mean_present(closes[start..=i].iter().copied()),
                prior_close,
                fractional_change: fractional_change(obs.close, prior_close),
            });
        }
    }
    out
}
