//! AnalyticsRow: one row of the analytics view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-instrument windowed aggregates for one clean observation.
///
/// Column names in the store: `Close`, `ma_7`, `prev_close`, `daily_return`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRow {
    pub instrument_id: String,
    pub timestamp: DateTime<Utc>,
    pub close: Option<f64>,
    /// Mean close over this row and up to six preceding rows.
    pub moving_avg_7: Option<f64>,
    /// Close of the preceding row; `None` on the first row of a series.
    pub prior_close: Option<f64>,
    /// `(close - prior_close) / prior_close`; `None` when the prior is missing or zero.
    pub fractional_change: Option<f64>,
}
