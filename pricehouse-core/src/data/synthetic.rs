//! Offline synthetic provider.
//!
//! Every bar is a pure function of (instrument, timestamp): a BLAKE3 hash of
//! the pair seeds a `StdRng`, so re-fetching an overlapping window yields the
//! exact same values. That makes repeated ingestion produce true verbatim
//! duplicates, which is what the dedup view is there to absorb.
//!
//! The frame comes back wide (`Field|TICKER` columns), the awkward shape a
//! multi-instrument download typically has.

use chrono::{DateTime, DurationRound, Utc};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{
    DataSource, MarketDataProvider, ProviderError, ProviderFrame, ProviderRequest,
};
use super::schema::{CLOSE, DATETIME, FIELDS, HIGH, LOW, OPEN, VOLUME, WIDE_SEPARATOR};

#[derive(Debug, Clone, Default)]
pub struct SyntheticProvider {
    /// End of the generated window; `None` means "now".
    anchor: Option<DateTime<Utc>>,
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the end of the window, for reproducible runs.
    pub fn anchored_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor: Some(anchor),
        }
    }

    fn timestamps(&self, request: &ProviderRequest) -> Result<Vec<DateTime<Utc>>, ProviderError> {
        let interval = request.interval.duration();
        let anchor = self.anchor.unwrap_or_else(Utc::now);
        let end = anchor
            .duration_trunc(interval)
            .map_err(|e| ProviderError::Other(format!("interval {}: {e}", request.interval)))?;
        let start = end - request.period.duration();

        let mut out = Vec::new();
        let mut ts = start + interval;
        while ts <= end {
            out.push(ts);
            ts += interval;
        }
        Ok(out)
    }
}

/// A generated bar.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bar {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Bar {
    fn field(&self, field: &str) -> f64 {
        match field {
            OPEN => self.open,
            HIGH => self.high,
            LOW => self.low,
            VOLUME => self.volume,
            _ => self.close,
        }
    }
}

fn seed_for(instrument: &str, timestamp: DateTime<Utc>) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(instrument.as_bytes());
    hasher.update(&timestamp.timestamp_millis().to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// Price level for an instrument, stable across calls (10 to 510).
fn base_price(instrument: &str) -> f64 {
    let hash = blake3::hash(instrument.as_bytes());
    let mut rng = StdRng::from_seed(*hash.as_bytes());
    rng.gen_range(10.0..510.0)
}

fn bar_at(instrument: &str, timestamp: DateTime<Utc>) -> Bar {
    let base = base_price(instrument);
    let mut rng = StdRng::from_seed(seed_for(instrument, timestamp));

    // A slow daily cycle plus per-bar noise keeps the series plausible.
    let hours = timestamp.timestamp() as f64 / 3600.0;
    let cycle = (hours / 24.0 * std::f64::consts::TAU).sin() * 0.03;
    let noise: f64 = rng.gen_range(-0.01..0.01);
    let close = base * (1.0 + cycle + noise);

    let open = close * (1.0 + rng.gen_range(-0.005..0.005));
    let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.004));
    let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.004));
    let volume = rng.gen_range(1_000u32..100_000) as f64;

    Bar {
        open,
        high,
        low,
        close,
        volume,
    }
}

impl MarketDataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, request: &ProviderRequest) -> Result<ProviderFrame, ProviderError> {
        let timestamps = self.timestamps(request)?;
        if timestamps.is_empty() || request.instruments.is_empty() {
            let names: Vec<&str> = request.instruments.iter().map(String::as_str).collect();
            return Err(ProviderError::EmptyPayload(names.join(", ")));
        }

        let millis: Vec<i64> = timestamps.iter().map(|ts| ts.timestamp_millis()).collect();
        let index = Column::new(DATETIME.into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| ProviderError::Other(format!("frame assembly: {e}")))?;

        let mut columns = vec![index];
        for instrument in &request.instruments {
            let bars: Vec<Bar> = timestamps.iter().map(|ts| bar_at(instrument, *ts)).collect();
            for field in FIELDS {
                let values: Vec<f64> = bars.iter().map(|bar| bar.field(field)).collect();
                let label = format!("{field}{WIDE_SEPARATOR}{instrument}");
                columns.push(Column::new(label.into(), values));
            }
        }

        let frame = DataFrame::new(columns)
            .map_err(|e| ProviderError::Other(format!("frame assembly: {e}")))?;
        tracing::debug!(
            instruments = request.instruments.len(),
            bars = timestamps.len(),
            "generated synthetic frame"
        );

        Ok(ProviderFrame {
            frame,
            source: DataSource::Synthetic,
            skipped: Vec::new(),
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::Span;
    use chrono::{Duration, TimeZone};

    fn request(instruments: &[&str], period: &str, interval: &str) -> ProviderRequest {
        ProviderRequest {
            instruments: instruments.iter().map(|s| s.to_string()).collect(),
            period: Span::parse(period).unwrap(),
            interval: Span::parse(interval).unwrap(),
        }
    }

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 15, 20, 0).unwrap()
    }

    #[test]
    fn frame_is_wide_with_one_column_per_field_and_instrument() {
        let provider = SyntheticProvider::anchored_at(anchor());
        let out = provider.fetch(&request(&["AAPL", "BTC-USD"], "1d", "1h")).unwrap();

        assert_eq!(out.frame.height(), 24);
        assert_eq!(out.frame.width(), 1 + 2 * FIELDS.len());
        assert!(out.frame.column("Close|AAPL").is_ok());
        assert!(out.frame.column("Volume|BTC-USD").is_ok());
        assert_eq!(out.source, DataSource::Synthetic);
    }

    #[test]
    fn bars_are_deterministic_per_instrument_and_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(bar_at("AAPL", ts), bar_at("AAPL", ts));
        assert_ne!(bar_at("AAPL", ts), bar_at("TSLA", ts));

        let bar = bar_at("AAPL", ts);
        assert!(bar.low <= bar.open.min(bar.close));
        assert!(bar.high >= bar.open.max(bar.close));
    }

    #[test]
    fn overlapping_windows_repeat_values() {
        let first = SyntheticProvider::anchored_at(anchor())
            .fetch(&request(&["X"], "5h", "1h"))
            .unwrap();
        let later = SyntheticProvider::anchored_at(anchor() + Duration::hours(2))
            .fetch(&request(&["X"], "5h", "1h"))
            .unwrap();

        let a = first.frame.column("Close|X").unwrap().f64().unwrap().get(4);
        let b = later.frame.column("Close|X").unwrap().f64().unwrap().get(2);
        assert_eq!(a, b);
    }

    #[test]
    fn window_ends_on_interval_boundary() {
        let provider = SyntheticProvider::anchored_at(anchor());
        let stamps = provider.timestamps(&request(&["X"], "3h", "1h")).unwrap();
        assert_eq!(stamps.len(), 3);
        assert_eq!(
            stamps.last().copied(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 15, 0, 0).unwrap())
        );
    }
}
