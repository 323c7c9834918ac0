//! Pricehouse Core: the market-data aggregation pipeline.
//!
//! This crate contains everything between the provider and the dashboard:
//! - Domain types (raw observations, clean observations, analytics rows)
//! - Provider trait with Yahoo Finance and synthetic implementations
//! - Frame normalization (label aliases, wide to long reshape, field checks)
//! - The warehouse store: append-only raw table, dedup and analytics views
//! - Ingestion adapter (fetch, normalize, single-transaction append)
//! - Reference and incremental analytics, series summaries for the dashboard

pub mod analytics;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod store;

pub use config::PricehouseConfig;
pub use error::PipelineError;
pub use store::Warehouse;
