//! Provider access and frame normalization

pub mod circuit_breaker;
pub mod normalize;
pub mod provider;
pub mod schema;
pub mod synthetic;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use normalize::{normalize, NormalizationWarning, NormalizedBatch};
pub use provider::{
    DataSource, MarketDataProvider, ProviderError, ProviderFrame, ProviderRequest, Span,
};
pub use schema::{AnalyticsSchema, ObservationSchema, SchemaError};
pub use synthetic::SyntheticProvider;
pub use yahoo::YahooProvider;
