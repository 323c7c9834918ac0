//! Pipeline configuration.
//!
//! Loaded from a TOML file with `[store]`, `[ingest]`, `[provider]` and
//! `[dashboard]` sections. Every field has a default, so an empty or absent
//! file is a valid configuration. The store handle is built from this value
//! and passed explicitly; nothing here is global.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::provider::Span;
use crate::error::PipelineError;

/// Environment variable overriding `store.path`.
pub const DB_PATH_ENV: &str = "PRICEHOUSE_DB";

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pricehouse.toml";

/// Upper bound on `provider.max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricehouseConfig {
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub provider: ProviderConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pricehouse.db"),
        }
    }
}

/// Which provider the ingestion adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Yahoo,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub instruments: Vec<String>,
    /// Look-back window of one ingestion cycle.
    pub period: Span,
    /// Bar size.
    pub interval: Span,
    pub provider: ProviderKind,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            instruments: ["BTC-USD", "ETH-USD", "AAPL", "TSLA"]
                .into_iter()
                .map(String::from)
                .collect(),
            period: Span::days(1),
            interval: Span::hours(1),
            provider: ProviderKind::Yahoo,
        }
    }
}

impl IngestConfig {
    /// Configured instruments, trimmed and deduplicated.
    pub fn instrument_set(&self) -> BTreeSet<String> {
        self.instruments
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Circuit breaker cooldown after a trip.
    pub cooldown_secs: u64,
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".into(),
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            cooldown_secs: 30 * 60,
            failure_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub histogram_bins: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { histogram_bins: 50 }
    }
}

impl PricehouseConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("read {}: {e}", path.display())))?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, PipelineError> {
        if path.exists() {
            return Self::from_file(path);
        }
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Parse a config from a TOML string (no environment overrides).
    pub fn from_toml(content: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("parse config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("serialize config: {e}")))
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.dashboard.histogram_bins == 0 {
            return Err(PipelineError::Config(
                "dashboard.histogram_bins must be at least 1".into(),
            ));
        }
        if self.provider.max_retries > MAX_RETRIES_LIMIT {
            return Err(PipelineError::Config(format!(
                "provider.max_retries must be at most {MAX_RETRIES_LIMIT}"
            )));
        }
        if self.ingest.interval.duration() > self.ingest.period.duration() {
            return Err(PipelineError::Config(format!(
                "ingest.interval ({}) is longer than ingest.period ({})",
                self.ingest.interval, self.ingest.period
            )));
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            if !path.trim().is_empty() {
                tracing::debug!(path = %path, "store path overridden by {DB_PATH_ENV}");
                self.store.path = PathBuf::from(path);
            }
        }
    }
}
