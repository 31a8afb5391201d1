//! Fixed-shape feature row.
//!
//! A struct rather than a name→value map so that the feature count and order
//! are checked by the compiler. Column names live in `FeatureSchema`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub timestamp: NaiveDateTime,

    pub rsi: f64,
    pub macd: f64,
    pub macd_hist: f64,
    pub macd_signal: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub sma_fast: f64,
    pub sma_mid: f64,
    pub sma_slow: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub bb_lower: f64,
    pub bb_middle: f64,
    pub bb_upper: f64,
    pub bb_width: f64,
    pub atr: f64,
    pub ad: f64,
    pub obv: f64,

    pub close_lag1: f64,
    pub close_lag3: f64,
    pub close_lag5: f64,
    pub volume_lag1: f64,
    pub volume_lag3: f64,
    pub volume_lag5: f64,
    pub daily_return: f64,
    pub daily_return_lag1: f64,
    pub daily_return_lag2: f64,
    pub volatility: f64,

    pub day_of_week: f64,
    pub day_of_month: f64,
    pub month: f64,
    pub year: f64,

    /// Direction label; `None` at inference time.
    pub target: Option<u8>,
}

impl FeatureRow {
    /// Feature values in column order.
    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.rsi,
            self.macd,
            self.macd_hist,
            self.macd_signal,
            self.stoch_k,
            self.stoch_d,
            self.sma_fast,
            self.sma_mid,
            self.sma_slow,
            self.ema_fast,
            self.ema_slow,
            self.bb_lower,
            self.bb_middle,
            self.bb_upper,
            self.bb_width,
            self.atr,
            self.ad,
            self.obv,
            self.close_lag1,
            self.close_lag3,
            self.close_lag5,
            self.volume_lag1,
            self.volume_lag3,
            self.volume_lag5,
            self.daily_return,
            self.daily_return_lag1,
            self.daily_return_lag2,
            self.volatility,
            self.day_of_week,
            self.day_of_month,
            self.month,
            self.year,
        ]
    }

    /// Inverse of `values`.
    pub fn from_values(
        timestamp: NaiveDateTime,
        v: [f64; FEATURE_COUNT],
        target: Option<u8>,
    ) -> Self {
        let [
            rsi,
            macd,
            macd_hist,
            macd_signal,
            stoch_k,
            stoch_d,
            sma_fast,
            sma_mid,
            sma_slow,
            ema_fast,
            ema_slow,
            bb_lower,
            bb_middle,
            bb_upper,
            bb_width,
            atr,
            ad,
            obv,
            close_lag1,
            close_lag3,
            close_lag5,
            volume_lag1,
            volume_lag3,
            volume_lag5,
            daily_return,
            daily_return_lag1,
            daily_return_lag2,
            volatility,
            day_of_week,
            day_of_month,
            month,
            year,
        ] = v;
        Self {
            timestamp,
            rsi,
            macd,
            macd_hist,
            macd_signal,
            stoch_k,
            stoch_d,
            sma_fast,
            sma_mid,
            sma_slow,
            ema_fast,
            ema_slow,
            bb_lower,
            bb_middle,
            bb_upper,
            bb_width,
            atr,
            ad,
            obv,
            close_lag1,
            close_lag3,
            close_lag5,
            volume_lag1,
            volume_lag3,
            volume_lag5,
            daily_return,
            daily_return_lag1,
            daily_return_lag2,
            volatility,
            day_of_week,
            day_of_month,
            month,
            year,
            target,
        }
    }

    /// True when every feature is finite.
    pub fn is_complete(&self) -> bool {
        self.values().iter().all(|v| v.is_finite())
    }

    /// Replace any non-finite feature with zero.
    pub fn fill_missing_with_zero(&mut self) {
        let mut v = self.values();
        if v.iter().all(|x| x.is_finite()) {
            return;
        }
        for x in v.iter_mut().filter(|x| !x.is_finite()) {
            *x = 0.0;
        }
        *self = Self::from_values(self.timestamp, v, self.target);
    }
}
