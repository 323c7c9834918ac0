//! Market data provider trait and structured error types.
//!
//! The MarketDataProvider trait abstracts over data sources (Yahoo Finance,
//! the offline synthetic generator) so we can swap implementations and mock for
//! tests. Providers return a raw polars frame whose shape is NOT guaranteed;
//! the normalizer is responsible for turning it into canonical observations.

use std::collections::BTreeSet;
use std::fmt;

use chrono::Duration;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error types for provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("provider returned no observations for {0}")]
    EmptyPayload(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Transport-level failures, as opposed to bad or missing data.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ProviderError::NetworkUnreachable(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::CircuitBreakerTripped
        )
    }
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    YahooFinance,
    Synthetic,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::YahooFinance => write!(f, "yahoo_finance"),
            DataSource::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// A bounded time span in provider notation: `30m`, `1h`, `1d`, `5d`, `1wk`, `1mo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Span {
    label: String,
    duration: Duration,
}

impl Span {
    pub fn parse(label: &str) -> Result<Self, ProviderError> {
        let label = label.trim();
        let split = label
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| ProviderError::Other(format!("span '{label}' has no unit")))?;
        let (count, unit) = label.split_at(split);
        let count: i64 = count
            .parse()
            .map_err(|_| ProviderError::Other(format!("span '{label}' has no count")))?;
        if count <= 0 {
            return Err(ProviderError::Other(format!("span '{label}' must be positive")));
        }
        let duration = match unit {
            "m" => Duration::try_minutes(count),
            "h" => Duration::try_hours(count),
            "d" => Duration::try_days(count),
            "wk" => Duration::try_weeks(count),
            "mo" => count.checked_mul(30).and_then(Duration::try_days),
            other => {
                return Err(ProviderError::Other(format!(
                    "span '{label}' has unknown unit '{other}'"
                )))
            }
        }
        .ok_or_else(|| ProviderError::Other(format!("span '{label}' is out of range")))?;
        Ok(Self {
            label: label.to_string(),
            duration,
        })
    }

    pub fn hours(count: i64) -> Self {
        Self {
            label: format!("{count}h"),
            duration: Duration::hours(count),
        }
    }

    pub fn days(count: i64) -> Self {
        Self {
            label: format!("{count}d"),
            duration: Duration::days(count),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl TryFrom<String> for Span {
    type Error = ProviderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Span::parse(&value)
    }
}

impl From<Span> for String {
    fn from(span: Span) -> Self {
        span.label
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// One ingestion cycle's request: the latest `period` of bars at `interval`.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub instruments: BTreeSet<String>,
    pub period: Span,
    pub interval: Span,
}

/// A raw provider response plus the warnings the provider itself raised
/// (e.g. a single symbol that was not found in a multi-symbol request).
#[derive(Debug, Clone)]
pub struct ProviderFrame {
    pub frame: DataFrame,
    pub source: DataSource,
    pub skipped: Vec<String>,
}

/// Trait for market data providers.
///
/// Implementations handle the specifics of fetching data from a particular
/// source. The store sits above this trait; providers know nothing about it.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch the latest window of observations for every requested instrument.
    fn fetch(&self, request: &ProviderRequest) -> Result<ProviderFrame, ProviderError>;

    /// Check if the provider is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}
