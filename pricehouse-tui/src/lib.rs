//! Pricehouse dashboard: terminal view over the analytics view.
//!
//! - Instrument selector fed by `SELECT DISTINCT "Ticker"` on the view
//! - Headline metrics (latest close, change, 7-period MA, return std dev)
//! - Price chart (close and MA) and a histogram of fractional changes
//! - Status bar and error history for store and schema failures

pub mod app;
pub mod input;
pub mod theme;
pub mod ui;

pub use app::AppState;
pub use theme::Theme;
