//! End-to-end scenarios against a real SQLite store.
//!
//! provider → ingestion adapter → raw table → v_clean_data → v_market_analysis
//! → summary, plus materialization, export and reset.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use polars::prelude::*;
use pricehouse_core::analytics::{analyze, dedupe, SeriesSummary};
use pricehouse_core::config::IngestConfig;
use pricehouse_core::data::{
    normalize, DataSource, MarketDataProvider, ProviderError, ProviderFrame, ProviderRequest,
    SyntheticProvider,
};
use pricehouse_core::domain::{AnalyticsRow, Observation};
use pricehouse_core::ingest::IngestionAdapter;
use pricehouse_core::store::{materialize, BatchMeta, RefreshMode, Warehouse};
use pricehouse_core::PipelineError;
use proptest::prelude::*;

fn t(hour: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn store() -> Warehouse {
    let mut store = Warehouse::open_in_memory().unwrap();
    store.setup().unwrap();
    store
}

fn meta() -> BatchMeta {
    BatchMeta {
        provider: "test".into(),
        instruments: Vec::new(),
        period: "1d".into(),
        interval: "1h".into(),
        warnings: Vec::new(),
        fingerprint: String::new(),
    }
}

fn obs(ticker: &str, hour: i64, close: Option<f64>) -> Observation {
    Observation {
        instrument_id: ticker.to_string(),
        timestamp: t(hour),
        close,
        open: None,
        high: None,
        low: None,
        volume: None,
    }
}

fn assert_rows_match(actual: &[AnalyticsRow], expected: &[AnalyticsRow]) {
    assert_eq!(actual.len(), expected.len());
    let close = |a: Option<f64>, b: Option<f64>| match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0),
        (a, b) => a == b,
    };
    for (a, e) in actual.iter().zip(expected) {
        assert_eq!(a.instrument_id, e.instrument_id);
        assert_eq!(a.timestamp, e.timestamp);
        assert_eq!(a.close, e.close);
        assert_eq!(a.prior_close, e.prior_close, "prior_close at {}", a.timestamp);
        assert!(close(a.moving_avg_7, e.moving_avg_7), "ma_7 at {}: {a:?} vs {e:?}", a.timestamp);
        assert!(
            close(a.fractional_change, e.fractional_change),
            "daily_return at {}: {a:?} vs {e:?}",
            a.timestamp
        );
    }
}

/// Provider serving the frames queued by the test, one per fetch.
struct Scripted {
    frames: Mutex<Vec<DataFrame>>,
}

impl Scripted {
    fn closes(ticker: &str, points: &[(i64, f64)]) -> DataFrame {
        let ms: Vec<i64> = points.iter().map(|(h, _)| t(*h).timestamp_millis()).collect();
        let closes: Vec<f64> = points.iter().map(|(_, c)| *c).collect();
        DataFrame::new(vec![
            Column::new("Datetime".into(), ms),
            Column::new("Ticker".into(), vec![ticker; points.len()]),
            Column::new("Close".into(), closes),
        ])
        .unwrap()
    }

    fn adapter(frames: Vec<DataFrame>) -> IngestionAdapter {
        let mut frames = frames;
        frames.reverse();
        let provider = Arc::new(Scripted {
            frames: Mutex::new(frames),
        });
        IngestionAdapter::new(provider, &IngestConfig::default())
    }
}

impl MarketDataProvider for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch(&self, request: &ProviderRequest) -> Result<ProviderFrame, ProviderError> {
        let frame = self.frames.lock().unwrap().pop().ok_or_else(|| {
            ProviderError::EmptyPayload(
                request.instruments.iter().cloned().collect::<Vec<_>>().join(", "),
            )
        })?;
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

#[test]
fn three_closes_end_to_end() {
    let mut store = store();
    let adapter = Scripted::adapter(vec![Scripted::closes(
        "X",
        &[(1, 100.0), (2, 102.0), (3, 99.0)],
    )]);
    let report = adapter.ingest(&mut store, &set(&["X"])).unwrap();
    assert_eq!(report.rows_appended, 3);

    let rows = store.analytics("X").unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].prior_close, None);
    assert_eq!(rows[0].fractional_change, None);
    assert_eq!(rows[1].prior_close, Some(100.0));
    assert!((rows[1].fractional_change.unwrap() - 0.02).abs() < 1e-12);
    assert_eq!(rows[2].prior_close, Some(102.0));
    assert!((rows[2].fractional_change.unwrap() - (-0.0294)).abs() < 1e-4);

    let summary = SeriesSummary::from_rows("X", &rows).unwrap();
    assert_eq!(summary.latest_close, Some(99.0));
    assert!(summary.return_std_dev.is_some());
}

#[test]
fn sub_millisecond_timestamps_share_one_key_everywhere() {
    let frame = || {
        DataFrame::new(vec![
            Column::new(
                "Datetime".into(),
                &["2024-05-01T12:00:00.0001Z", "2024-05-01T12:00:00.0009Z"],
            ),
            Column::new("Ticker".into(), &["X", "X"]),
            Column::new("Close".into(), &[1.0, 2.0]),
        ])
        .unwrap()
    };

    let batch = normalize(&frame(), &set(&["X"])).unwrap();
    let keys: BTreeSet<_> = batch.observations.iter().map(|o| o.timestamp).collect();
    assert_eq!(keys.len(), 1);

    let mut store = store();
    let report = Scripted::adapter(vec![frame()])
        .ingest(&mut store, &set(&["X"]))
        .unwrap();
    assert_eq!(report.rows_appended, 2);

    let rows = store.analytics("X").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].close, Some(2.0));
    assert_eq!(keys.into_iter().next(), Some(rows[0].timestamp));
}

#[test]
fn zero_or_one_row_selection_is_empty_series() {
    let mut store = store();
    store.append_batch(&meta(), &[obs("ONE", 1, Some(10.0))]).unwrap();

    for (instrument, expected_rows) in [("ONE", 1), ("NONE", 0)] {
        let rows = store.analytics(instrument).unwrap();
        match SeriesSummary::from_rows(instrument, &rows) {
            Err(PipelineError::EmptySeries { rows, .. }) => assert_eq!(rows, expected_rows),
            other => panic!("expected EmptySeries for {instrument}, got {other:?}"),
        }
    }
}

#[test]
fn repeated_ingestion_is_absorbed_by_the_clean_view() {
    let mut store = store();
    let anchor = Utc.with_ymd_and_hms(2024, 5, 1, 15, 0, 0).unwrap();
    let provider = Arc::new(SyntheticProvider::anchored_at(anchor));
    let adapter = IngestionAdapter::new(provider, &IngestConfig::default());
    let instruments = set(&["AAPL", "BTC-USD"]);

    adapter.ingest(&mut store, &instruments).unwrap();
    let clean_once = store.clean_observations(None).unwrap();
    let analytics_once = store.analytics("AAPL").unwrap();

    adapter.ingest(&mut store, &instruments).unwrap();
    let status = store.status().unwrap();
    assert_eq!(status.raw_rows, 2 * status.clean_rows);
    assert_eq!(store.clean_observations(None).unwrap(), clean_once);
    assert_eq!(store.analytics("AAPL").unwrap(), analytics_once);
    assert_eq!(store.instruments().unwrap(), vec!["AAPL", "BTC-USD"]);
}

#[test]
fn last_write_wins_on_revised_rows() {
    let mut store = store();
    store.append_batch(&meta(), &[obs("X", 1, Some(10.0)), obs("X", 2, Some(11.0))]).unwrap();
    store.append_batch(&meta(), &[obs("X", 2, Some(12.5))]).unwrap();

    let clean = store.clean_observations(Some("X")).unwrap();
    assert_eq!(clean.len(), 2);
    assert_eq!(clean[1].close, Some(12.5));
    assert_eq!(clean, dedupe(&store.raw_observations().unwrap()));
}

#[test]
fn instrument_filter_is_bound_not_interpolated() {
    let mut store = store();
    store.append_batch(&meta(), &[obs("X", 1, Some(1.0)), obs("X", 2, Some(2.0))]).unwrap();
    store.append_batch(&meta(), &[obs("O'NEIL", 1, Some(5.0))]).unwrap();

    assert!(store.analytics("X' OR '1'='1").unwrap().is_empty());
    assert_eq!(store.analytics("O'NEIL").unwrap().len(), 1);
}

#[test]
fn materialized_copy_tracks_the_view_through_late_rows() {
    let mut store = store();
    store
        .append_batch(&meta(), &(0..10).map(|h| obs("X", h, Some(100.0 + h as f64))).collect::<Vec<_>>())
        .unwrap();
    store.append_batch(&meta(), &[obs("Y", 0, Some(5.0)), obs("Y", 1, Some(0.0))]).unwrap();
    materialize(&mut store).unwrap();

    // Tail extension.
    store.append_batch(&meta(), &[obs("X", 10, Some(95.0)), obs("X", 11, None)]).unwrap();
    let report = materialize(&mut store).unwrap();
    let x = report.instruments.iter().find(|r| r.instrument == "X").unwrap();
    assert_eq!(x.mode, RefreshMode::Incremental);

    // A late row lands in the middle of the series, and a revision rewrites one.
    store.append_batch(&meta(), &[obs("X", 4, Some(80.0))]).unwrap();
    store.append_batch(&meta(), &[obs("Y", 1, Some(6.0)), obs("Y", 2, Some(7.0))]).unwrap();
    let report = materialize(&mut store).unwrap();
    assert!(report.instruments.iter().all(|r| r.mode == RefreshMode::Full));

    for instrument in ["X", "Y"] {
        assert_rows_match(
            &store.materialized_analytics(instrument).unwrap(),
            &store.analytics(instrument).unwrap(),
        );
    }
}

#[test]
fn reset_then_reingest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prices.db");
    let mut store = Warehouse::open(&path).unwrap();
    store.setup().unwrap();
    store.append_batch(&meta(), &[obs("X", 1, Some(1.0))]).unwrap();
    materialize(&mut store).unwrap();

    store.reset().unwrap();
    assert!(matches!(store.analytics("X"), Err(PipelineError::Schema(_))));
    assert!(matches!(materialize(&mut store), Err(PipelineError::Schema(_))));

    store.setup().unwrap();
    assert!(store.raw_observations().unwrap().is_empty());
    store.append_batch(&meta(), &[obs("X", 1, Some(1.0)), obs("X", 2, Some(2.0))]).unwrap();
    assert_eq!(store.analytics("X").unwrap().len(), 2);
    store.close().unwrap();
}

// ── SQL views vs the Rust reference ──────────────────────────────────

fn arb_batches() -> impl Strategy<Value = Vec<Vec<Observation>>> {
    let row = (
        prop::sample::select(vec!["A", "B", "C"]),
        0..16i64,
        prop_oneof![
            8 => (1.0..500.0_f64).prop_map(|p| Some((p * 100.0).round() / 100.0)),
            1 => Just(Some(0.0)),
            1 => Just(None),
        ],
    )
        .prop_map(|(ticker, hour, close)| obs(ticker, hour, close));
    prop::collection::vec(prop::collection::vec(row, 1..20), 1..4)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn views_agree_with_reference(batches in arb_batches()) {
        let mut store = store();
        for batch in &batches {
            store.append_batch(&meta(), batch).unwrap();
        }

        let raw = store.raw_observations().unwrap();
        let clean = dedupe(&raw);
        prop_assert_eq!(store.clean_observations(None).unwrap(), clean.clone());

        let reference = analyze(&clean);
        for instrument in store.instruments().unwrap() {
            let expected: Vec<_> = reference
                .iter()
                .filter(|r| r.instrument_id == instrument)
                .cloned()
                .collect();
            assert_rows_match(&store.analytics(&instrument).unwrap(), &expected);
        }
    }

    #[test]
    fn materialize_equals_full_recompute(batches in arb_batches()) {
        let mut store = store();
        for batch in &batches {
            store.append_batch(&meta(), batch).unwrap();
            materialize(&mut store).unwrap();
        }
        for instrument in store.instruments().unwrap() {
            assert_rows_match(
                &store.materialized_analytics(&instrument).unwrap(),
                &store.analytics(&instrument).unwrap(),
            );
        }
    }
}
