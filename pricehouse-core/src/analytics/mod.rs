//! Pure-Rust counterparts of the store views, plus dashboard statistics.
//!
//! `dedupe` and `analyze` define the same results as `v_clean_data` and
//! `v_market_analysis`; `RollingAnalytics` produces them one row at a time
//! for incremental materialization.

pub mod dedupe;
pub mod rolling;
pub mod summary;
pub mod window;

pub use dedupe::dedupe;
pub use rolling::{RollingAnalytics, RollingError};
pub use summary::{Histogram, HistogramBin, SeriesSummary};
pub use window::{analyze, fractional_change, MA_WINDOW};
