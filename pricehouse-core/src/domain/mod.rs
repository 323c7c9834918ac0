//! Domain types for the pricehouse pipeline

pub mod analytics_row;
pub mod observation;

pub use analytics_row::AnalyticsRow;
pub use observation::{CleanObservation, Observation, RawObservation};
