//! Observation: one timestamped price record for one instrument.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A normalized price observation, as produced by the ingestion adapter.
///
/// Only `instrument_id` and `timestamp` are guaranteed. `close` is optional
/// because normalization keeps rows even when the provider omitted the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub instrument_id: String,
    pub timestamp: DateTime<Utc>,
    pub close: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
}

impl Observation {
    /// Observation carrying only a close price.
    pub fn close_only(instrument_id: impl Into<String>, timestamp: DateTime<Utc>, close: f64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            timestamp,
            close: Some(close),
            open: None,
            high: None,
            low: None,
            volume: None,
        }
    }

    /// Epoch milliseconds, the store's timestamp representation.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// A row of the raw table: an observation plus its ingestion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    /// Strictly increasing ingestion sequence (`obs_id` in the store).
    pub seq: i64,
    /// Ingestion batch that appended the row.
    pub batch_id: i64,
    pub observation: Observation,
}

/// The deduplicated projection of the raw table: one per (instrument, timestamp).
pub type CleanObservation = Observation;

/// Convert store epoch milliseconds back to a UTC timestamp.
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
