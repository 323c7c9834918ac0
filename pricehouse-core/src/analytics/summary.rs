//! Series summary for the dashboard: headline metrics and the return histogram.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::AnalyticsRow;
use crate::error::PipelineError;

/// Headline metrics for one instrument's analytics series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub instrument: String,
    pub rows: usize,
    pub first_timestamp: DateTime<Utc>,
    pub latest_timestamp: DateTime<Utc>,
    pub latest_close: Option<f64>,
    pub latest_change: Option<f64>,
    pub latest_moving_avg: Option<f64>,
    /// Sample standard deviation of the non-null fractional changes.
    pub return_std_dev: Option<f64>,
    /// Non-null fractional changes, in time order.
    pub returns: Vec<f64>,
}

impl SeriesSummary {
    /// Summarize a series ordered by timestamp ascending.
    ///
    /// Fewer than two rows leaves prior-row metrics undefined, so this fails
    /// with [`PipelineError::EmptySeries`] rather than reporting partial values.
    pub fn from_rows(instrument: &str, rows: &[AnalyticsRow]) -> Result<Self, PipelineError> {
        let (first, latest) = match rows {
            [first, .., latest] => (first, latest),
            _ => {
                return Err(PipelineError::EmptySeries {
                    instrument: instrument.to_string(),
                    rows: rows.len(),
                })
            }
        };

        let returns: Vec<f64> = rows.iter().filter_map(|r| r.fractional_change).collect();

        Ok(Self {
            instrument: instrument.to_string(),
            rows: rows.len(),
            first_timestamp: first.timestamp,
            latest_timestamp: latest.timestamp,
            latest_close: latest.close,
            latest_change: latest.fractional_change,
            latest_moving_avg: latest.moving_avg_7,
            return_std_dev: sample_std_dev(&returns),
            returns,
        })
    }

    pub fn histogram(&self, bins: usize) -> Histogram {
        Histogram::new(&self.returns, bins)
    }
}

/// Sample standard deviation (n - 1 denominator); `None` below two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((ss / (n - 1.0)).sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Equal-width histogram over `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub bins: Vec<HistogramBin>,
}

impl Histogram {
    pub fn new(values: &[f64], bins: usize) -> Self {
        let bins = bins.max(1);
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self { bins: Vec::new() };
        }

        let mut lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let mut hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if hi <= lo {
            // All values equal: give the single spike some width.
            let pad = (lo.abs() * 1e-3).max(1e-6);
            lo -= pad;
            hi += pad;
        }
        let width = (hi - lo) / bins as f64;

        let mut out: Vec<HistogramBin> = (0..bins)
            .map(|i| HistogramBin {
                lower: lo + width * i as f64,
                upper: lo + width * (i + 1) as f64,
                count: 0,
            })
            .collect();
        for v in finite {
            let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
            out[idx].count += 1;
        }
        Self { bins: out }
    }

    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }

    pub fn max_count(&self) -> usize {
        self.bins.iter().map(|b| b.count).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}
