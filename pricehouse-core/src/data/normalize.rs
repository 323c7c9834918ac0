//! Provider frame normalization.
//!
//! Providers do not agree on shape. Timestamp and instrument labels vary,
//! field names vary in case, and a multi-instrument response may come back
//! wide (one row per timestamp, one column per instrument) instead of long
//! (one row per instrument observation). The normalizer resolves all of that
//! into canonical [`Observation`]s.
//!
//! Missing required fields are reported as warnings and ingestion of the
//! fields that are present continues. The exception is a frame without a
//! timestamp or instrument: those rows cannot be keyed at all.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use polars::prelude::*;

use super::provider::ProviderError;
use super::schema::{ObservationSchema, CLOSE, DATETIME, FIELDS, REQUIRED, TICKER};
use crate::domain::Observation;

/// A required field that was absent after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationWarning {
    pub missing: String,
    pub observed: Vec<String>,
}

impl fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "column {} missing; columns are {:?}",
            self.missing, self.observed
        )
    }
}

/// Output of a normalization pass.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub observations: Vec<Observation>,
    pub warnings: Vec<NormalizationWarning>,
    /// Provider columns with no canonical counterpart.
    pub dropped_columns: Vec<String>,
}

/// How instrument identity is carried by the frame.
#[derive(Debug)]
enum Layout {
    /// An instrument column, one row per observation.
    Long { ticker_label: String },
    /// One column per (field, instrument); `instrument -> field -> label`.
    Wide(BTreeMap<String, BTreeMap<&'static str, String>>),
    /// No instrument column at all; a single-instrument request.
    Single(String),
}

/// Normalize a raw provider frame into canonical observations.
///
/// `requested` is the instrument set of the request; it labels frames that
/// carry no instrument column and recognises bare per-instrument columns
/// (a wide frame holding only closes).
pub fn normalize(
    frame: &DataFrame,
    requested: &BTreeSet<String>,
) -> Result<NormalizedBatch, ProviderError> {
    if frame.height() == 0 {
        return Err(ProviderError::EmptyPayload(join(requested)));
    }

    let observed: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    // Exact canonical labels win over aliases.
    let mut resolved: BTreeMap<&'static str, String> = BTreeMap::new();
    for label in &observed {
        if let Some(canonical) = ObservationSchema::canonical_label(label) {
            if label.as_str() == canonical {
                resolved.insert(canonical, label.clone());
            }
        }
    }
    for label in &observed {
        if let Some(canonical) = ObservationSchema::canonical_label(label) {
            resolved.entry(canonical).or_insert_with(|| label.clone());
        }
    }

    let mut wide: BTreeMap<String, BTreeMap<&'static str, String>> = BTreeMap::new();
    let mut dropped = Vec::new();
    for label in &observed {
        if resolved.values().any(|used| used == label) {
            continue;
        }
        if let Some((field, instrument)) = ObservationSchema::split_wide_label(label) {
            wide.entry(instrument.to_string())
                .or_default()
                .entry(field)
                .or_insert_with(|| label.clone());
        } else if requested.contains(label.trim()) {
            wide.entry(label.trim().to_string())
                .or_default()
                .entry(CLOSE)
                .or_insert_with(|| label.clone());
        } else {
            dropped.push(label.clone());
        }
    }

    let single = match requested.len() {
        1 => requested.iter().next().cloned(),
        _ => None,
    };
    let layout = match (resolved.get(TICKER), single) {
        (Some(label), _) => {
            // A long frame with stray wide columns: keep the long reading.
            dropped.extend(wide.values().flat_map(|fields| fields.values().cloned()));
            Layout::Long {
                ticker_label: label.clone(),
            }
        }
        (None, _) if !wide.is_empty() => Layout::Wide(wide),
        (None, Some(only)) => Layout::Single(only),
        (None, None) => {
            dropped.extend(wide.into_values().flat_map(|fields| fields.into_values()));
            Layout::Long {
                ticker_label: String::new(),
            }
        }
    };

    let warnings = missing_fields(&resolved, &layout, &observed);
    for warning in &warnings {
        tracing::warn!(missing = %warning.missing, observed = ?warning.observed, "normalization warning");
    }
    if !dropped.is_empty() {
        tracing::debug!(columns = ?dropped, "dropping provider columns with no canonical counterpart");
    }

    let keyless: Vec<&NormalizationWarning> = warnings
        .iter()
        .filter(|w| w.missing == DATETIME || w.missing == TICKER)
        .collect();
    if !keyless.is_empty() {
        let missing: Vec<&str> = keyless.iter().map(|w| w.missing.as_str()).collect();
        return Err(ProviderError::MalformedPayload(format!(
            "cannot key observations without {}; columns are {:?}",
            missing.join(", "),
            observed
        )));
    }

    let datetime_label = resolved
        .get(DATETIME)
        .ok_or_else(|| ProviderError::MalformedPayload("no timestamp column".into()))?;
    let timestamps = timestamp_column(column(frame, datetime_label)?)?;

    let observations = match &layout {
        Layout::Long { ticker_label } => {
            let tickers = string_column(column(frame, ticker_label)?)?;
            let fields = field_columns(frame, |field| resolved.get(field))?;
            long_rows(&timestamps, &tickers, &fields)
        }
        Layout::Single(instrument) => {
            let tickers = vec![Some(instrument.clone()); frame.height()];
            let fields = field_columns(frame, |field| resolved.get(field))?;
            long_rows(&timestamps, &tickers, &fields)
        }
        Layout::Wide(groups) => {
            let mut rows = Vec::new();
            for (instrument, labels) in groups {
                let fields = field_columns(frame, |field| labels.get(field))?;
                rows.extend(wide_rows(&timestamps, instrument, &fields));
            }
            rows
        }
    };

    if observations.is_empty() {
        return Err(ProviderError::EmptyPayload(join(requested)));
    }

    Ok(NormalizedBatch {
        observations,
        warnings,
        dropped_columns: dropped,
    })
}

fn missing_fields(
    resolved: &BTreeMap<&'static str, String>,
    layout: &Layout,
    observed: &[String],
) -> Vec<NormalizationWarning> {
    let mut missing = Vec::new();
    for required in REQUIRED {
        let present = match (required, layout) {
            (TICKER, Layout::Long { ticker_label }) => !ticker_label.is_empty(),
            (TICKER, _) => true,
            (CLOSE, Layout::Wide(groups)) => {
                for (instrument, fields) in groups {
                    if !fields.contains_key(CLOSE) {
                        missing.push(format!("{CLOSE}|{instrument}"));
                    }
                }
                true
            }
            (field, _) => resolved.contains_key(field),
        };
        if !present {
            missing.push(required.to_string());
        }
    }
    missing
        .into_iter()
        .map(|missing| NormalizationWarning {
            missing,
            observed: observed.to_vec(),
        })
        .collect()
}

/// Per-field values, in `FIELDS` order; `None` when the frame lacks the field.
type FieldColumns = Vec<Option<Vec<Option<f64>>>>;

fn field_columns<'a>(
    frame: &DataFrame,
    label_for: impl Fn(&'static str) -> Option<&'a String>,
) -> Result<FieldColumns, ProviderError> {
    FIELDS
        .iter()
        .map(|field| match label_for(field) {
            Some(label) => float_column(column(frame, label)?).map(Some),
            None => Ok(None),
        })
        .collect()
}

fn field_value(fields: &FieldColumns, index: usize, row: usize) -> Option<f64> {
    fields[index].as_ref().and_then(|values| values[row])
}

fn build_observation(
    instrument: &str,
    timestamp: DateTime<Utc>,
    fields: &FieldColumns,
    row: usize,
) -> Observation {
    Observation {
        instrument_id: instrument.to_string(),
        timestamp,
        open: field_value(fields, 0, row),
        high: field_value(fields, 1, row),
        low: field_value(fields, 2, row),
        close: field_value(fields, 3, row),
        volume: field_value(fields, 4, row),
    }
}

fn long_rows(
    timestamps: &[Option<DateTime<Utc>>],
    tickers: &[Option<String>],
    fields: &FieldColumns,
) -> Vec<Observation> {
    let mut rows = Vec::with_capacity(timestamps.len());
    let mut unkeyed = 0usize;
    for (row, (ts, ticker)) in timestamps.iter().zip(tickers).enumerate() {
        match (ts, ticker.as_deref().map(str::trim)) {
            (Some(ts), Some(ticker)) if !ticker.is_empty() => {
                rows.push(build_observation(ticker, *ts, fields, row));
            }
            _ => unkeyed += 1,
        }
    }
    if unkeyed > 0 {
        tracing::warn!(rows = unkeyed, "skipping rows without timestamp or instrument");
    }
    rows
}

/// Reshape one instrument's columns of a wide frame into long rows.
///
/// Rows where every field of the instrument is empty are dropped: in a wide
/// frame they mean "no bar for this instrument at this timestamp" (e.g. an
/// equity outside trading hours next to a crypto pair).
fn wide_rows(
    timestamps: &[Option<DateTime<Utc>>],
    instrument: &str,
    fields: &FieldColumns,
) -> Vec<Observation> {
    timestamps
        .iter()
        .enumerate()
        .filter_map(|(row, ts)| {
            let ts = (*ts)?;
            let any_value = (0..FIELDS.len()).any(|i| field_value(fields, i, row).is_some());
            any_value.then(|| build_observation(instrument, ts, fields, row))
        })
        .collect()
}

fn column<'a>(frame: &'a DataFrame, label: &str) -> Result<&'a Column, ProviderError> {
    frame
        .column(label)
        .map_err(|e| ProviderError::MalformedPayload(format!("column {label}: {e}")))
}

fn format_err(label: &str, e: PolarsError) -> ProviderError {
    ProviderError::ResponseFormatChanged(format!("column {label}: {e}"))
}

fn float_column(col: &Column) -> Result<Vec<Option<f64>>, ProviderError> {
    let label = col.name().to_string();
    let cast = col
        .cast(&DataType::Float64)
        .map_err(|e| format_err(&label, e))?;
    let values = cast.f64().map_err(|e| format_err(&label, e))?;
    Ok(values
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

fn string_column(col: &Column) -> Result<Vec<Option<String>>, ProviderError> {
    let label = col.name().to_string();
    let cast = col
        .cast(&DataType::String)
        .map_err(|e| format_err(&label, e))?;
    let values = cast.str().map_err(|e| format_err(&label, e))?;
    Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Integers below this magnitude are read as epoch seconds, above as milliseconds.
const EPOCH_SECONDS_CUTOFF: i64 = 100_000_000_000;

/// Read a timestamp column of any supported representation as UTC instants.
fn timestamp_column(col: &Column) -> Result<Vec<Option<DateTime<Utc>>>, ProviderError> {
    let label = col.name().to_string();
    let to_i64 = |col: &Column| -> Result<Vec<Option<i64>>, ProviderError> {
        let cast = col.cast(&DataType::Int64).map_err(|e| format_err(&label, e))?;
        let values = cast.i64().map_err(|e| format_err(&label, e))?;
        Ok(values.into_iter().collect())
    };

    match col.dtype() {
        DataType::Datetime(unit, _) => {
            let per_milli = match unit {
                TimeUnit::Nanoseconds => 1_000_000,
                TimeUnit::Microseconds => 1_000,
                TimeUnit::Milliseconds => 1,
            };
            Ok(to_i64(col)?
                .into_iter()
                .map(|v| v.and_then(|raw| millis(raw.div_euclid(per_milli))))
                .collect())
        }
        DataType::Date => {
            let days = col.cast(&DataType::Int32).map_err(|e| format_err(&label, e))?;
            let values = days.i32().map_err(|e| format_err(&label, e))?;
            Ok(values
                .into_iter()
                .map(|v| v.and_then(|d| millis(i64::from(d) * 86_400_000)))
                .collect())
        }
        dtype if dtype.is_integer() => Ok(to_i64(col)?
            .into_iter()
            .map(|v| {
                v.and_then(|raw| {
                    if raw.abs() < EPOCH_SECONDS_CUTOFF {
                        millis(raw * 1_000)
                    } else {
                        millis(raw)
                    }
                })
            })
            .collect()),
        DataType::String => Ok(string_column(col)?
            .into_iter()
            .map(|v| {
                v.and_then(|s| parse_timestamp(&s))
                    .and_then(|dt| millis(dt.timestamp_millis()))
            })
            .collect()),
        other => Err(ProviderError::ResponseFormatChanged(format!(
            "column {label}: unsupported timestamp type {other:?}"
        ))),
    }
}

fn millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn join(instruments: &BTreeSet<String>) -> String {
    instruments.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requested(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn datetime_column(label: &str, hours: &[u32]) -> Column {
        let ms: Vec<i64> = hours.iter().map(|h| ts(*h).timestamp_millis()).collect();
        Column::new(label.into(), ms)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap()
    }

    #[test]
    fn long_frame_with_aliased_labels() {
        let df = DataFrame::new(vec![
            datetime_column("Date", &[10, 11]),
            Column::new("level_1".into(), &["AAPL", "AAPL"]),
            Column::new("close".into(), &[190.0, 191.5]),
            Column::new("Volume".into(), &[1000i64, 1200]),
        ])
        .unwrap();

        let batch = normalize(&df, &requested(&["AAPL"])).unwrap();
        assert!(batch.warnings.is_empty());
        assert_eq!(batch.observations.len(), 2);
        assert_eq!(batch.observations[0].instrument_id, "AAPL");
        assert_eq!(batch.observations[0].timestamp, ts(10));
        assert_eq!(batch.observations[1].close, Some(191.5));
        assert_eq!(batch.observations[1].volume, Some(1200.0));
        assert_eq!(batch.observations[1].open, None);
    }

    #[test]
    fn wide_frame_is_reshaped_long() {
        let df = DataFrame::new(vec![
            datetime_column("Datetime", &[10, 11]),
            Column::new("Close|BTC-USD".into(), &[Some(60000.0), Some(60100.0)]),
            Column::new("Close|AAPL".into(), &[None, Some(190.0)]),
            Column::new("Volume|AAPL".into(), &[None, Some(500.0)]),
        ])
        .unwrap();

        let batch = normalize(&df, &requested(&["AAPL", "BTC-USD"])).unwrap();
        assert!(batch.warnings.is_empty());
        // AAPL has no bar at 10:00: the all-empty row is dropped.
        assert_eq!(batch.observations.len(), 3);
        let aapl: Vec<_> = batch
            .observations
            .iter()
            .filter(|o| o.instrument_id == "AAPL")
            .collect();
        assert_eq!(aapl.len(), 1);
        assert_eq!(aapl[0].timestamp, ts(11));
        assert_eq!(aapl[0].volume, Some(500.0));
    }

    #[test]
    fn bare_instrument_columns_are_read_as_closes() {
        let df = DataFrame::new(vec![
            datetime_column("index", &[9]),
            Column::new("ETH-USD".into(), &[3000.0]),
            Column::new("TSLA".into(), &[175.0]),
        ])
        .unwrap();

        let batch = normalize(&df, &requested(&["ETH-USD", "TSLA"])).unwrap();
        let closes: Vec<_> = batch
            .observations
            .iter()
            .map(|o| (o.instrument_id.as_str(), o.close))
            .collect();
        assert_eq!(closes, vec![("ETH-USD", Some(3000.0)), ("TSLA", Some(175.0))]);
    }

    #[test]
    fn single_instrument_frame_is_labelled_from_request() {
        let df = DataFrame::new(vec![
            datetime_column("Datetime", &[9, 10]),
            Column::new("Close".into(), &[10.0, 11.0]),
        ])
        .unwrap();

        let batch = normalize(&df, &requested(&["X"])).unwrap();
        assert!(batch.observations.iter().all(|o| o.instrument_id == "X"));
    }

    #[test]
    fn missing_close_warns_but_keeps_rows() {
        let df = DataFrame::new(vec![
            datetime_column("Datetime", &[9]),
            Column::new("Ticker".into(), &["X"]),
            Column::new("Open".into(), &[10.0]),
        ])
        .unwrap();

        let batch = normalize(&df, &requested(&["X"])).unwrap();
        assert_eq!(batch.warnings.len(), 1);
        assert_eq!(batch.warnings[0].missing, "Close");
        assert!(batch.warnings[0].observed.contains(&"Open".to_string()));
        assert_eq!(batch.observations.len(), 1);
        assert_eq!(batch.observations[0].close, None);
        assert_eq!(batch.observations[0].open, Some(10.0));
    }

    #[test]
    fn missing_timestamp_is_malformed() {
        let df = DataFrame::new(vec![
            Column::new("Ticker".into(), &["X"]),
            Column::new("Close".into(), &[10.0]),
        ])
        .unwrap();

        let err = normalize(&df, &requested(&["X"])).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedPayload(_)));
        assert!(err.to_string().contains("Datetime"));
    }

    #[test]
    fn ambiguous_multi_instrument_frame_without_ticker_is_malformed() {
        let df = DataFrame::new(vec![
            datetime_column("Datetime", &[9]),
            Column::new("Close".into(), &[10.0]),
        ])
        .unwrap();

        let err = normalize(&df, &requested(&["X", "Y"])).unwrap_err();
        assert!(err.to_string().contains("Ticker"));
    }

    #[test]
    fn empty_frame_is_empty_payload() {
        let df = DataFrame::new(vec![
            Column::new("Datetime".into(), Vec::<i64>::new()),
            Column::new("Close".into(), Vec::<f64>::new()),
        ])
        .unwrap();

        let err = normalize(&df, &requested(&["X"])).unwrap_err();
        assert!(matches!(err, ProviderError::EmptyPayload(_)));
    }

    #[test]
    fn string_timestamps_are_truncated_to_millis() {
        let df = DataFrame::new(vec![
            Column::new(
                "Datetime".into(),
                &["2024-05-01T12:00:00.0001Z", "2024-05-01T12:00:00.0009Z"],
            ),
            Column::new("Ticker".into(), &["X", "X"]),
            Column::new("Close".into(), &[1.0, 2.0]),
        ])
        .unwrap();
        let batch = normalize(&df, &requested(&["X"])).unwrap();
        assert_eq!(batch.observations.len(), 2);
        assert!(batch.observations.iter().all(|o| o.timestamp == ts(12)));
    }

    #[test]
    fn epoch_seconds_and_strings_are_accepted() {
        let secs = ts(12).timestamp();
        let df = DataFrame::new(vec![
            Column::new("timestamp".into(), &[secs, secs]),
            Column::new("symbol".into(), &["A", "B"]),
            Column::new("Close".into(), &[1.0, 2.0]),
        ])
        .unwrap();
        let batch = normalize(&df, &requested(&["A", "B"])).unwrap();
        assert!(batch.observations.iter().all(|o| o.timestamp == ts(12)));

        let df = DataFrame::new(vec![
            Column::new("Datetime".into(), &["2024-05-01T12:00:00Z", "2024-05-01 12:00:00"]),
            Column::new("Ticker".into(), &["A", "B"]),
            Column::new("Close".into(), &[1.0, 2.0]),
        ])
        .unwrap();
        let batch = normalize(&df, &requested(&["A", "B"])).unwrap();
        assert!(batch.observations.iter().all(|o| o.timestamp == ts(12)));
    }

    #[test]
    fn unknown_columns_are_dropped() {
        let df = DataFrame::new(vec![
            datetime_column("Datetime", &[9]),
            Column::new("Ticker".into(), &["X"]),
            Column::new("Close".into(), &[10.0]),
            Column::new("Adj Close".into(), &[9.9]),
        ])
        .unwrap();

        let batch = normalize(&df, &requested(&["X"])).unwrap();
        assert_eq!(batch.dropped_columns, vec!["Adj Close".to_string()]);
    }
}
