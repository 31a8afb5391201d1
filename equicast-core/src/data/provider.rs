//! Data provider trait, raw provider frames, and structured error types.
//!
//! Providers return loosely-typed frames exactly as the source labels them.
//! Turning a frame into bars is the job of `normalize`, so every provider
//! gets the same column handling.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("empty response for {symbol}")]
    EmptyResponse { symbol: String },

    #[error("{symbol} is missing required columns: {}", missing.join(", "))]
    MissingColumns {
        symbol: String,
        missing: Vec<String>,
    },

    #[error("no data for '{ticker}' under any suffix (tried {})", tried.join(", "))]
    NotFound { ticker: String, tried: Vec<String> },

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("csv import error: {0}")]
    CsvError(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    YahooFinance,
    CsvImport,
    Cache,
    Synthetic,
}

/// What to ask the provider for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchWindow {
    /// Daily bars between two dates, both inclusive.
    Range { start: NaiveDate, end: NaiveDate },
    /// A provider-relative lookback such as `60d` at an interval such as `15m`.
    Period { period: String, interval: String },
}

impl FetchWindow {
    pub fn daily(start: NaiveDate, end: NaiveDate) -> Self {
        FetchWindow::Range { start, end }
    }

    pub fn intraday(period: impl Into<String>, interval: impl Into<String>) -> Self {
        FetchWindow::Period {
            period: period.into(),
            interval: interval.into(),
        }
    }

    /// True if timestamps from this window are whole days.
    pub fn is_daily(&self) -> bool {
        match self {
            FetchWindow::Range { .. } => true,
            FetchWindow::Period { interval, .. } => {
                matches!(interval.as_str(), "1d" | "5d" | "1wk" | "1mo" | "3mo")
            }
        }
    }
}

/// Column label as a provider reports it.
///
/// Some sources label columns with a (field, ticker) pair when more than one
/// symbol could be in the frame; others use a single flat name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnLabel {
    Flat(String),
    Qualified { field: String, ticker: String },
}

impl ColumnLabel {
    /// The field part of the label, qualifier stripped.
    pub fn field(&self) -> &str {
        match self {
            ColumnLabel::Flat(name) => name,
            ColumnLabel::Qualified { field, .. } => field,
        }
    }
}

/// A single cell before numeric coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Missing,
}

impl RawValue {
    /// Coerce to a number. Unparseable text becomes `NaN`.
    pub fn coerce(&self) -> f64 {
        match self {
            RawValue::Number(v) => *v,
            RawValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return f64::NAN;
                }
                trimmed
                    .replace(',', "")
                    .parse::<f64>()
                    .unwrap_or(f64::NAN)
            }
            RawValue::Missing => f64::NAN,
        }
    }
}

impl From<Option<f64>> for RawValue {
    fn from(v: Option<f64>) -> Self {
        v.map(RawValue::Number).unwrap_or(RawValue::Missing)
    }
}

#[derive(Debug, Clone)]
pub struct ProviderColumn {
    pub label: ColumnLabel,
    pub values: Vec<RawValue>,
}

/// Tabular provider output: a timestamp index and labelled columns.
#[derive(Debug, Clone, Default)]
pub struct ProviderFrame {
    pub index: Vec<NaiveDateTime>,
    pub columns: Vec<ProviderColumn>,
}

impl ProviderFrame {
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn push_column(&mut self, label: ColumnLabel, values: Vec<RawValue>) {
        self.columns.push(ProviderColumn { label, values });
    }
}

/// Trait for data providers (Yahoo Finance, CSV directory, etc).
///
/// One call is one request. Politeness delays and suffix fallback live in the
/// adapter above this trait; the cache sits above the adapter.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Which `DataSource` tag bars from this provider carry.
    fn source(&self) -> DataSource;

    /// Fetch a frame for a fully-qualified symbol (suffix included).
    fn fetch(&self, symbol: &str, window: &FetchWindow) -> Result<ProviderFrame, DataError>;
}
