//! Data acquisition: providers, column normalization, suffix fallback, and the bar cache.

pub mod adapter;
pub mod cache;
pub mod csv_import;
pub mod normalize;
pub mod provider;
pub mod schema;
pub mod yahoo;

pub use adapter::ExchangeAdapter;
pub use cache::{BarCache, CacheMeta, CacheStatus};
pub use csv_import::CsvDirProvider;
pub use normalize::normalize_frame;
pub use provider::{
    ColumnLabel, DataError, DataProvider, DataSource, FetchWindow, ProviderColumn, ProviderFrame,
    RawValue,
};
pub use schema::{BarSchema, SchemaError};
pub use yahoo::YahooProvider;
