//! Ingestion adapter: fetch, normalize, append.
//!
//! One call is one ingestion cycle. The provider's frame is normalized into
//! canonical observations and appended with its `ingest_log` entry in a
//! single transaction. Nothing is deduplicated here; re-ingesting an
//! overlapping window only adds rows the dedup view collapses.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::{IngestConfig, PricehouseConfig, ProviderKind};
use crate::data::normalize::{normalize, NormalizationWarning};
use crate::data::provider::{MarketDataProvider, ProviderError, ProviderRequest, Span};
use crate::data::{CircuitBreaker, SyntheticProvider, YahooProvider};
use crate::domain::Observation;
use crate::error::PipelineError;
use crate::store::{BatchMeta, Warehouse};

/// Outcome of one ingestion cycle.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub batch_id: i64,
    pub provider: String,
    pub rows_appended: usize,
    #[serde(serialize_with = "display_all")]
    pub warnings: Vec<NormalizationWarning>,
    /// Requested instruments the provider does not know.
    pub skipped: Vec<String>,
    pub dropped_columns: Vec<String>,
    pub fingerprint: String,
}

fn display_all<S: serde::Serializer>(
    warnings: &[NormalizationWarning],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(warnings.iter().map(|w| w.to_string()))
}

pub struct IngestionAdapter {
    provider: Arc<dyn MarketDataProvider>,
    period: Span,
    interval: Span,
}

impl IngestionAdapter {
    pub fn new(provider: Arc<dyn MarketDataProvider>, config: &IngestConfig) -> Self {
        Self {
            provider,
            period: config.period.clone(),
            interval: config.interval.clone(),
        }
    }

    /// Build the adapter with the provider named in the configuration.
    pub fn from_config(config: &PricehouseConfig) -> Result<Self, PipelineError> {
        let provider: Arc<dyn MarketDataProvider> = match config.ingest.provider {
            ProviderKind::Synthetic => Arc::new(SyntheticProvider::new()),
            ProviderKind::Yahoo => {
                let breaker = Arc::new(CircuitBreaker::new(
                    Duration::from_secs(config.provider.cooldown_secs),
                    config.provider.failure_threshold,
                ));
                Arc::new(YahooProvider::new(&config.provider, breaker)?)
            }
        };
        Ok(Self::new(provider, &config.ingest))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run one ingestion cycle for `instruments`.
    ///
    /// On any error nothing is appended.
    pub fn ingest(
        &self,
        store: &mut Warehouse,
        instruments: &BTreeSet<String>,
    ) -> Result<IngestReport, PipelineError> {
        if instruments.is_empty() {
            return Err(PipelineError::Config("no instruments requested".into()));
        }
        if !self.provider.is_available() {
            return Err(ProviderError::CircuitBreakerTripped.into());
        }

        let request = ProviderRequest {
            instruments: instruments.clone(),
            period: self.period.clone(),
            interval: self.interval.clone(),
        };
        tracing::info!(
            provider = self.provider.name(),
            instruments = ?instruments,
            period = %self.period,
            interval = %self.interval,
            "fetching"
        );

        let fetched = self.provider.fetch(&request)?;
        let batch = normalize(&fetched.frame, instruments)?;

        let mut warnings: Vec<String> = batch.warnings.iter().map(|w| w.to_string()).collect();
        warnings.extend(
            fetched
                .skipped
                .iter()
                .map(|s| format!("symbol not found: {s}")),
        );

        let fingerprint = fingerprint(&batch.observations)?;
        let meta = BatchMeta {
            provider: fetched.source.to_string(),
            instruments: instruments.iter().cloned().collect(),
            period: self.period.to_string(),
            interval: self.interval.to_string(),
            warnings,
            fingerprint: fingerprint.clone(),
        };
        let batch_id = store.append_batch(&meta, &batch.observations)?;

        Ok(IngestReport {
            batch_id,
            provider: meta.provider,
            rows_appended: batch.observations.len(),
            warnings: batch.warnings,
            skipped: fetched.skipped,
            dropped_columns: batch.dropped_columns,
            fingerprint,
        })
    }
}

/// BLAKE3 digest of a batch's normalized rows.
fn fingerprint(observations: &[Observation]) -> Result<String, PipelineError> {
    let bytes = serde_json::to_vec(observations)
        .map_err(|e| PipelineError::Config(format!("fingerprint serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
