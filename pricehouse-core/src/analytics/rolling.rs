//! Incremental analytics for one instrument.
//!
//! Keeps the trailing window of closes so each appended clean row costs
//! O(window) instead of a recompute of the whole series.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::window::{fractional_change, mean_present, MA_WINDOW};
use crate::domain::{AnalyticsRow, CleanObservation};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RollingError {
    #[error("observation for '{got}' pushed into the '{expected}' series")]
    WrongInstrument { expected: String, got: String },

    #[error("'{instrument}' observation at {got} is not after {last}")]
    OutOfOrder {
        instrument: String,
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct RollingAnalytics {
    instrument: String,
    closes: VecDeque<Option<f64>>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl RollingAnalytics {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            closes: VecDeque::with_capacity(MA_WINDOW),
            last_timestamp: None,
        }
    }

    /// Resume after already-processed rows.
    ///
    /// `tail` holds the latest rows in timestamp order; only the last
    /// `MA_WINDOW` matter.
    pub fn resume(
        instrument: impl Into<String>,
        tail: impl IntoIterator<Item = (DateTime<Utc>, Option<f64>)>,
    ) -> Self {
        let mut engine = Self::new(instrument);
        for (timestamp, close) in tail {
            engine.advance(timestamp, close);
        }
        engine
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    /// Append the next clean observation and return its analytics row.
    pub fn push(&mut self, obs: &CleanObservation) -> Result<AnalyticsRow, RollingError> {
        if obs.instrument_id != self.instrument {
            return Err(RollingError::WrongInstrument {
                expected: self.instrument.clone(),
                got: obs.instrument_id.clone(),
            });
        }
        if let Some(last) = self.last_timestamp {
            if obs.timestamp <= last {
                return Err(RollingError::OutOfOrder {
                    instrument: self.instrument.clone(),
                    last,
                    got: obs.timestamp,
                });
            }
        }

        let prior_close = self.closes.back().copied().flatten();
        self.advance(obs.timestamp, obs.close);

        Ok(AnalyticsRow {
            instrument_id: obs.instrument_id.clone(),
            timestamp: obs.timestamp,
            close: obs.close,
            moving_avg_7: mean_present(self.closes.iter().copied()),
            prior_close,
            fractional_change: fractional_change(obs.close, prior_close),
        })
    }

    fn advance(&mut self, timestamp: DateTime<Utc>, close: Option<f64>) {
        if self.closes.len() == MA_WINDOW {
            self.closes.pop_front();
        }
        self.closes.push_back(close);
        self.last_timestamp = Some(timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::analyze;
    use crate::domain::Observation;
    use chrono::{Duration, TimeZone};

    fn obs(ticker: &str, i: i64, close: Option<f64>) -> CleanObservation {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        Observation {
            close,
            ..Observation::close_only(ticker, t0 + Duration::hours(i), 0.0)
        }
    }

    #[test]
    fn matches_reference_row_by_row() {
        let series: Vec<_> = (0..20)
            .map(|i| obs("X", i, (i % 5 != 3).then(|| 100.0 + (i * 7 % 11) as f64)))
            .collect();

        let mut engine = RollingAnalytics::new("X");
        let incremental: Vec<_> = series.iter().map(|o| engine.push(o).unwrap()).collect();
        let reference = analyze(&series);

        for (a, b) in incremental.iter().zip(&reference) {
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.prior_close, b.prior_close);
            match (a.moving_avg_7, b.moving_avg_7) {
                (Some(x), Some(y)) => assert!((x - y).abs() < 1e-9),
                (x, y) => assert_eq!(x, y),
            }
        }
    }

    #[test]
    fn resume_continues_the_window() {
        let series: Vec<_> = (0..12).map(|i| obs("X", i, Some(i as f64))).collect();
        let reference = analyze(&series);

        let tail = series[..9].iter().map(|o| (o.timestamp, o.close));
        let mut engine = RollingAnalytics::resume("X", tail);
        for (i, o) in series.iter().enumerate().skip(9) {
            let row = engine.push(o).unwrap();
            assert_eq!(row.prior_close, reference[i].prior_close);
            assert_eq!(row.moving_avg_7, reference[i].moving_avg_7);
        }
    }

    #[test]
    fn rejects_out_of_order_and_foreign_rows() {
        let mut engine = RollingAnalytics::new("X");
        engine.push(&obs("X", 5, Some(1.0))).unwrap();

        assert!(matches!(
            engine.push(&obs("X", 5, Some(1.0))),
            Err(RollingError::OutOfOrder { .. })
        ));
        assert!(matches!(
            engine.push(&obs("Y", 6, Some(1.0))),
            Err(RollingError::WrongInstrument { .. })
        ));
        assert_eq!(engine.last_timestamp(), Some(obs("X", 5, None).timestamp));
    }
}
