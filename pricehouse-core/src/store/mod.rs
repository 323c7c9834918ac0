//! The warehouse store: raw table, dedup and analytics views, materialization

pub mod export;
pub mod materialize;
pub mod sql;
pub mod warehouse;

pub use export::{export_parquet, ExportReport};
pub use materialize::{materialize, InstrumentRefresh, MaterializeReport, RefreshMode};
pub use warehouse::{BatchMeta, IngestBatch, InstrumentStatus, StoreStatus, Warehouse};
