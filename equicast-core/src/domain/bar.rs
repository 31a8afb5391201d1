//! Bars, the fundamental market data unit.

use crate::data::provider::DataSource;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bar granularity. Each kind has its own cache namespace and fetch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Daily,
    Intraday,
}

impl DataKind {
    pub const ALL: [DataKind; 2] = [DataKind::Daily, DataKind::Intraday];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Daily => "daily",
            DataKind::Intraday => "intraday",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "1d" => Ok(DataKind::Daily),
            "intraday" => Ok(DataKind::Intraday),
            other => Err(format!("unknown data kind '{other}' (expected daily or intraday)")),
        }
    }
}

/// OHLCV bar as delivered by a provider after column normalization.
///
/// Missing values are `NaN`. Daily bars carry a midnight timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl RawBar {
    /// True when every OHLCV field is missing (holiday rows from some providers).
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            && self.high.is_nan()
            && self.low.is_nan()
            && self.close.is_nan()
            && self.volume.is_nan()
    }

    /// Convert to a cleaned bar.
    ///
    /// Rows without a finite open, high, low and close are rejected. A missing
    /// volume becomes zero.
    pub fn clean(&self) -> Option<Bar> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return None;
        }
        Some(Bar {
            timestamp: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: if self.volume.is_finite() {
                self.volume
            } else {
                0.0
            },
        })
    }
}

/// Cleaned OHLCV bar consumed by indicators. All fields are finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bars for one ticker, strictly increasing in timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarSeries {
    /// Bare ticker as requested (e.g. "TATAMOTORS").
    pub ticker: String,
    /// Provider symbol that actually resolved (e.g. "TATAMOTORS.NS").
    pub symbol: String,
    pub kind: DataKind,
    pub source: DataSource,
    pub bars: Vec<RawBar>,
}

impl BarSeries {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.bars.first().map(|b| b.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.bars.last().map(|b| b.timestamp)
    }

    /// Drop every bar stamped after `cutoff`.
    pub fn truncate_after(&mut self, cutoff: NaiveDateTime) {
        self.bars.retain(|b| b.timestamp <= cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn raw(open: f64, close: f64, volume: f64) -> RawBar {
        RawBar {
            timestamp: ts(2),
            open,
            high: open.max(close) + 1.0,
            low: open.min(close) - 1.0,
            close,
            volume,
        }
    }

    #[test]
    fn clean_keeps_finite_bar() {
        let bar = raw(100.0, 101.0, 500.0).clean().unwrap();
        assert_eq!(bar.close, 101.0);
        assert_eq!(bar.volume, 500.0);
    }

    #[test]
    fn clean_rejects_missing_close() {
        assert!(raw(100.0, f64::NAN, 500.0).clean().is_none());
    }

    #[test]
    fn clean_zero_fills_missing_volume() {
        let bar = raw(100.0, 101.0, f64::NAN).clean().unwrap();
        assert_eq!(bar.volume, 0.0);
    }

    #[test]
    fn void_bar_detection() {
        let void = RawBar {
            timestamp: ts(2),
            open: f64::NAN,
            high: f64::NAN,
            low: f64::NAN,
            close: f64::NAN,
            volume: f64::NAN,
        };
        assert!(void.is_void());
        assert!(!raw(1.0, 2.0, f64::NAN).is_void());
    }

    #[test]
    fn truncate_after_cutoff() {
        let mut series = BarSeries {
            ticker: "ABC".into(),
            symbol: "ABC.NS".into(),
            kind: DataKind::Daily,
            source: DataSource::Synthetic,
            bars: (2..6)
                .map(|d| RawBar {
                    timestamp: ts(d),
                    ..raw(1.0, 1.0, 1.0)
                })
                .collect(),
        };
        series.truncate_after(ts(3));
        assert_eq!(series.len(), 2);
        assert_eq!(series.last_timestamp(), Some(ts(3)));
    }

    #[test]
    fn data_kind_names() {
        assert_eq!(DataKind::Daily.to_string(), "daily");
        assert_eq!(DataKind::Intraday.as_str(), "intraday");
    }

    #[test]
    fn kind_parses() {
        assert_eq!("Daily".parse::<DataKind>().unwrap(), DataKind::Daily);
        assert_eq!(" intraday ".parse::<DataKind>().unwrap(), DataKind::Intraday);
        assert!("weekly".parse::<DataKind>().is_err());
        for k in DataKind::ALL {
            assert_eq!(k.to_string().parse::<DataKind>().unwrap(), k);
        }
    }
}
