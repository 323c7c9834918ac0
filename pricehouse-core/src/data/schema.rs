use polars::prelude::*;

/// Canonical column labels shared by the normalizer and the store.
pub const DATETIME: &str = "Datetime";
pub const TICKER: &str = "Ticker";
pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const CLOSE: &str = "Close";
pub const VOLUME: &str = "Volume";

/// Price/volume fields that may appear per instrument in a wide frame.
pub const FIELDS: [&str; 5] = [OPEN, HIGH, LOW, CLOSE, VOLUME];

/// Columns every normalized observation must carry.
pub const REQUIRED: [&str; 3] = [DATETIME, TICKER, CLOSE];

/// Separator between field and instrument in wide column labels (`Close|AAPL`).
pub const WIDE_SEPARATOR: char = '|';

/// Canonical shape of a provider observation frame.
pub struct ObservationSchema;

impl ObservationSchema {
    /// Map a provider label onto its canonical column, if it has one.
    ///
    /// Timestamp and instrument labels vary by provider and by how a
    /// multi-instrument response was reshaped (`index`, `level_1`, ...).
    pub fn canonical_label(label: &str) -> Option<&'static str> {
        let label = label.trim();
        match label {
            "Datetime" | "Date" | "index" | "timestamp" | "time" | "date" | "datetime" => {
                return Some(DATETIME)
            }
            "Ticker" | "level_1" | "symbol" | "Symbol" | "ticker" => return Some(TICKER),
            _ => {}
        }
        FIELDS
            .iter()
            .copied()
            .find(|field| field.eq_ignore_ascii_case(label))
    }

    /// Split a wide label like `Close|AAPL` into (field, instrument).
    pub fn split_wide_label(label: &str) -> Option<(&'static str, &str)> {
        let (field, instrument) = label.split_once(WIDE_SEPARATOR)?;
        let instrument = instrument.trim();
        if instrument.is_empty() {
            return None;
        }
        let field = FIELDS
            .iter()
            .copied()
            .find(|f| f.eq_ignore_ascii_case(field.trim()))?;
        Some((field, instrument))
    }
}

/// Shape of an exported analytics frame.
pub struct AnalyticsSchema;

impl AnalyticsSchema {
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new(DATETIME.into(), DataType::Datetime(TimeUnit::Milliseconds, None)),
            Field::new(TICKER.into(), DataType::String),
            Field::new(CLOSE.into(), DataType::Float64),
            Field::new("ma_7".into(), DataType::Float64),
            Field::new("prev_close".into(), DataType::Float64),
            Field::new("daily_return".into(), DataType::Float64),
        ])
    }

    /// Validate a frame against the analytics schema.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_columns_are_canonical() {
        for col in REQUIRED {
            assert_eq!(ObservationSchema::canonical_label(col), Some(col));
        }
    }

    #[test]
    fn aliases_map_to_canonical_labels() {
        assert_eq!(ObservationSchema::canonical_label("Date"), Some(DATETIME));
        assert_eq!(ObservationSchema::canonical_label("index"), Some(DATETIME));
        assert_eq!(ObservationSchema::canonical_label("level_1"), Some(TICKER));
        assert_eq!(ObservationSchema::canonical_label("symbol"), Some(TICKER));
        assert_eq!(ObservationSchema::canonical_label("close"), Some(CLOSE));
        assert_eq!(ObservationSchema::canonical_label("VOLUME"), Some(VOLUME));
        assert_eq!(ObservationSchema::canonical_label("Adj Close"), None);
    }

    #[test]
    fn splits_wide_labels() {
        assert_eq!(
            ObservationSchema::split_wide_label("Close|BTC-USD"),
            Some((CLOSE, "BTC-USD"))
        );
        assert_eq!(
            ObservationSchema::split_wide_label("volume|AAPL"),
            Some((VOLUME, "AAPL"))
        );
        assert_eq!(ObservationSchema::split_wide_label("Close|"), None);
        assert_eq!(ObservationSchema::split_wide_label("Adj Close|AAPL"), None);
        assert_eq!(ObservationSchema::split_wide_label("AAPL"), None);
    }

    #[test]
    fn analytics_validate_rejects_missing_column() {
        let df = DataFrame::new(vec![Column::new("Ticker".into(), &["SPY"])]).unwrap();
        assert!(matches!(
            AnalyticsSchema::validate(&df),
            Err(SchemaError::MissingColumn(_))
        ));
    }
}
