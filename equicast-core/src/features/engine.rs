//! Feature computation for one ticker.
//!
//! Pipeline:
//! 1. clean bars (non-finite prices dropped, missing volume zeroed)
//! 2. refuse series shorter than `min_history_bars`
//! 3. compute every indicator over the full series (no look-ahead)
//! 4. add lags, returns, return volatility, calendar fields
//! 5. label with the forward return (training mode only)
//! 6. drop rows with any non-finite feature, then zero-fill as a safety net
//!
//! Raw OHLCV never leaves this module; only derived features do.

use super::config::FeatureConfig;
use super::label::label_direction;
use super::row::{FeatureRow, FEATURE_COUNT};
use super::schema::FeatureSchema;
use crate::domain::{Bar, RawBar};
use crate::indicators::rolling_std;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Whether rows need a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelMode {
    /// Rows without a forward bar are dropped; every row has a target.
    Training,
    /// No target; the latest bars are kept.
    Inference,
}

/// Feature rows for one ticker, ordered by timestamp.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    pub ticker: String,
    pub schema: FeatureSchema,
    pub rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    pub fn latest(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }
}

/// Compute labelled features for one ticker.
///
/// Returns `None` when the series is too short or no row survives cleaning.
pub fn compute(
    ticker: &str,
    raw: &[RawBar],
    config: &FeatureConfig,
    mode: LabelMode,
) -> Option<FeatureFrame> {
    let bars: Vec<Bar> = raw.iter().filter_map(RawBar::clean).collect();
    let min_bars = config.min_history_bars();
    if bars.len() < min_bars {
        debug!(ticker, bars = bars.len(), required = min_bars, "insufficient history");
        return None;
    }

    let n = bars.len();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let indicator_series: Vec<Vec<f64>> = config
        .indicator_set()
        .indicators
        .iter()
        .map(|ind| ind.compute(&bars))
        .collect();

    let returns: Vec<f64> = (0..n)
        .map(|i| {
            if i == 0 {
                f64::NAN
            } else {
                closes[i] / closes[i - 1] - 1.0
            }
        })
        .collect();
    let volatility = rolling_std(&returns, config.volatility_window);

    let lagged = |series: &[f64], i: usize, k: usize| -> f64 {
        if i >= k {
            series[i - k]
        } else {
            f64::NAN
        }
    };

    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let target = match mode {
            LabelMode::Training => {
                match label_direction(&closes, i, config.horizon, config.up_threshold) {
                    Some(label) => Some(label),
                    None => continue,
                }
            }
            LabelMode::Inference => None,
        };

        let mut v = [f64::NAN; FEATURE_COUNT];
        for (slot, series) in v.iter_mut().zip(&indicator_series) {
            *slot = series[i];
        }
        let mut k = indicator_series.len();
        for lag in config.value_lags {
            v[k] = lagged(&closes, i, lag);
            k += 1;
        }
        for lag in config.value_lags {
            v[k] = lagged(&volumes, i, lag);
            k += 1;
        }
        v[k] = returns[i];
        k += 1;
        for lag in config.return_lags {
            v[k] = lagged(&returns, i, lag);
            k += 1;
        }
        v[k] = volatility[i];
        k += 1;

        let date = bars[i].timestamp.date();
        v[k] = date.weekday().num_days_from_monday() as f64;
        v[k + 1] = date.day() as f64;
        v[k + 2] = date.month() as f64;
        v[k + 3] = date.year() as f64;

        let row = FeatureRow::from_values(bars[i].timestamp, v, target);
        if row.is_complete() {
            rows.push(row);
        }
    }

    for row in &mut rows {
        row.fill_missing_with_zero();
    }

    if rows.is_empty() {
        debug!(ticker, "no complete feature rows");
        return None;
    }

    Some(FeatureFrame {
        ticker: ticker.to_string(),
        schema: FeatureSchema::from_config(config),
        rows,
    })
}
