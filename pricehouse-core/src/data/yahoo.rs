//! Yahoo Finance data provider.
//!
//! Fetches intraday bars from Yahoo's v8 chart API (`range` + `interval`).
//! Handles rate limiting, retries with exponential backoff, response parsing
//! and the circuit breaker.
//!
//! The frame is returned with Yahoo's own labels (`timestamp` in epoch seconds,
//! `symbol`, lower-case fields); mapping them onto the canonical columns is
//! the normalizer's job.

use std::sync::Arc;
use std::time::Duration;

use polars::prelude::*;
use serde::Deserialize;

use super::circuit_breaker::CircuitBreaker;
use super::provider::{
    DataSource, MarketDataProvider, ProviderError, ProviderFrame, ProviderRequest,
};
use crate::config::ProviderConfig;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

/// Column buffers for a long frame spanning every fetched symbol.
#[derive(Debug, Default)]
struct LongColumns {
    timestamp: Vec<i64>,
    symbol: Vec<String>,
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

impl LongColumns {
    fn len(&self) -> usize {
        self.timestamp.len()
    }

    fn into_frame(self) -> Result<DataFrame, ProviderError> {
        DataFrame::new(vec![
            Column::new("timestamp".into(), self.timestamp),
            Column::new("symbol".into(), self.symbol),
            Column::new("open".into(), self.open),
            Column::new("high".into(), self.high),
            Column::new("low".into(), self.low),
            Column::new("close".into(), self.close),
            Column::new("volume".into(), self.volume),
        ])
        .map_err(|e| ProviderError::Other(format!("frame assembly: {e}")))
    }
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new(
        config: &ProviderConfig,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    fn chart_url(&self, symbol: &str, request: &ProviderRequest) -> String {
        format!(
            "{}/v8/finance/chart/{symbol}?range={}&interval={}",
            self.base_url,
            request.period.label(),
            request.interval.label()
        )
    }

    /// Parse one symbol's chart response into the long column buffers.
    fn parse_response(
        symbol: &str,
        resp: ChartResponse,
        out: &mut LongColumns,
    ) -> Result<usize, ProviderError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => {
                ProviderError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => ProviderError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ResponseFormatChanged("result array is empty".into()))?;

        // No timestamps at all means no bars in the requested range.
        let timestamps = data.timestamp.unwrap_or_default();
        let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

        let before = out.len();
        for (i, &ts) in timestamps.iter().enumerate() {
            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();

            // Bars with every field empty are placeholders for closed sessions.
            if open.is_none() && high.is_none() && low.is_none() && close.is_none() {
                continue;
            }

            out.timestamp.push(ts);
            out.symbol.push(symbol.to_string());
            out.open.push(open);
            out.high.push(high);
            out.low.push(low);
            out.close.push(close);
            out.volume.push(volume);
        }

        Ok(out.len() - before)
    }

    /// Execute a single symbol request with retry and circuit breaker logic.
    fn fetch_symbol(
        &self,
        symbol: &str,
        request: &ProviderRequest,
        out: &mut LongColumns,
    ) -> Result<usize, ProviderError> {
        let url = self.chart_url(symbol, request);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff(self.base_delay, attempt);
                tracing::debug!(symbol, attempt, ?delay, "retrying provider request");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(ProviderError::CircuitBreakerTripped);
            }

            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::FORBIDDEN {
                        self.circuit_breaker.trip();
                        return Err(ProviderError::CircuitBreakerTripped);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.circuit_breaker.record_failure();
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(ProviderError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(ProviderError::AuthenticationRequired(
                            "Yahoo Finance requires authentication".into(),
                        ));
                    }

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(ProviderError::SymbolNotFound {
                            symbol: symbol.to_string(),
                        });
                    }

                    if !status.is_success() {
                        self.circuit_breaker.record_failure();
                        last_error = Some(ProviderError::Other(format!("HTTP {status} for {symbol}")));
                        continue;
                    }

                    let chart: ChartResponse = resp.json().map_err(|e| {
                        ProviderError::MalformedPayload(format!(
                            "failed to parse response for {symbol}: {e}"
                        ))
                    })?;

                    let rows = Self::parse_response(symbol, chart, out)?;
                    self.circuit_breaker.record_success();
                    return Ok(rows);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(ProviderError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(ProviderError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Other("max retries exceeded".into())))
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt - 1)`, saturating.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(&self, request: &ProviderRequest) -> Result<ProviderFrame, ProviderError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(ProviderError::CircuitBreakerTripped);
        }

        let mut columns = LongColumns::default();
        let mut skipped = Vec::new();

        for symbol in &request.instruments {
            match self.fetch_symbol(symbol, request, &mut columns) {
                Ok(rows) => tracing::debug!(symbol = %symbol, rows, "fetched"),
                Err(ProviderError::SymbolNotFound { symbol }) => {
                    tracing::warn!(symbol = %symbol, "symbol not found, skipping");
                    skipped.push(symbol);
                }
                Err(e) => return Err(e),
            }
        }

        if columns.len() == 0 {
            let names: Vec<&str> = request.instruments.iter().map(String::as_str).collect();
            return Err(ProviderError::EmptyPayload(names.join(", ")));
        }

        Ok(ProviderFrame {
            frame: columns.into_frame()?,
            source: DataSource::YahooFinance,
            skipped,
        })
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
