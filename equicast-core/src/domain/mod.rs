//! Domain types for Equicast

pub mod bar;
pub mod prediction;

pub use bar::{Bar, BarSeries, DataKind, RawBar};
pub use prediction::{Movement, PredictionRecord};

/// Ticker type alias (bare exchange symbol, no suffix)
pub type Ticker = String;
