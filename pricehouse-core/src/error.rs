//! Pipeline error taxonomy.
//!
//! Designed to be displayable in both CLI and TUI contexts: every variant
//! carries the underlying diagnostic so it can be shown to the operator as-is.

use thiserror::Error;

use crate::analytics::RollingError;
use crate::data::provider::ProviderError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Store or provider unreachable.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// An expected column or store object is absent.
    #[error("schema error: {0}")]
    Schema(String),

    /// Prior-row metrics are undefined for fewer than two rows.
    #[error("not enough data for '{instrument}': {rows} row(s), need at least 2")]
    EmptySeries { instrument: String, rows: usize },

    #[error("analytics error: {0}")]
    Analytics(#[from] RollingError),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// True for failures caused by an unreachable store or provider.
    pub fn is_connectivity(&self) -> bool {
        match self {
            PipelineError::Connectivity(_) => true,
            PipelineError::Provider(e) => e.is_connectivity(),
            _ => false,
        }
    }
}
