//! Feature engine parameters.

use crate::indicators::{
    AccumulationDistribution, Atr, Bollinger, BollingerBand, Ema, Indicator, Macd, MacdOutput,
    OnBalanceVolume, Rsi, Sma, Stochastic, StochasticLine,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureConfigError {
    #[error("{0} must be >= 1")]
    ZeroPeriod(&'static str),

    #[error("macd_slow ({slow}) must exceed macd_fast ({fast})")]
    MacdOrder { fast: usize, slow: usize },

    #[error("volatility_window must be >= 2, got {0}")]
    VolatilityWindow(usize),

    #[error("bb_std must be positive, got {0}")]
    BollingerStd(f64),

    #[error("up_threshold must be finite, got {0}")]
    UpThreshold(f64),

    #[error("lookback_bars + history_buffer ({history}) leaves no labelled rows after a warmup of {warmup}")]
    NoLabelledRows { history: usize, warmup: usize },
}

/// Periods, lags, and labelling parameters for the feature engine.
///
/// The number of lags is fixed by the shape of `FeatureRow`; only their
/// distances are configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub stoch_k: usize,
    pub stoch_smooth: usize,
    pub stoch_d: usize,
    pub sma_fast: usize,
    pub sma_mid: usize,
    pub sma_slow: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    pub atr_period: usize,
    pub value_lags: [usize; 3],
    pub return_lags: [usize; 2],
    pub volatility_window: usize,
    /// Bars ahead the label looks.
    pub horizon: usize,
    /// Forward return must exceed this for the label to be 1.
    pub up_threshold: f64,
    /// History the slowest indicator needs.
    pub lookback_bars: usize,
    /// Extra bars required on top of `lookback_bars`.
    pub history_buffer: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            stoch_k: 14,
            stoch_smooth: 3,
            stoch_d: 3,
            sma_fast: 20,
            sma_mid: 50,
            sma_slow: 200,
            ema_fast: 20,
            ema_slow: 50,
            bb_period: 20,
            bb_std: 2.0,
            atr_period: 14,
            value_lags: [1, 3, 5],
            return_lags: [1, 2],
            volatility_window: 10,
            horizon: 1,
            up_threshold: 0.005,
            lookback_bars: 200,
            history_buffer: 50,
        }
    }
}

/// The indicator set in `FeatureRow` order (first 18 features).
pub(crate) struct IndicatorSet {
    pub indicators: Vec<Box<dyn Indicator>>,
}

impl FeatureConfig {
    /// Minimum number of clean bars before features are attempted.
    pub fn min_history_bars(&self) -> usize {
        self.lookback_bars + self.history_buffer
    }

    /// Calendar days to request so roughly `lookback_bars` trading days come back.
    pub fn prediction_window_days(&self) -> i64 {
        (self.lookback_bars as f64 * 1.8) as i64 + 50
    }

    pub(crate) fn indicator_set(&self) -> IndicatorSet {
        let (f, s, g) = (self.macd_fast, self.macd_slow, self.macd_signal);
        let (k, sm, d) = (self.stoch_k, self.stoch_smooth, self.stoch_d);
        let (bp, bs) = (self.bb_period, self.bb_std);
        IndicatorSet {
            indicators: vec![
                Box::new(Rsi::new(self.rsi_period)),
                Box::new(Macd::new(f, s, g, MacdOutput::Line)),
                Box::new(Macd::new(f, s, g, MacdOutput::Histogram)),
                Box::new(Macd::new(f, s, g, MacdOutput::Signal)),
                Box::new(Stochastic::new(k, sm, d, StochasticLine::K)),
                Box::new(Stochastic::new(k, sm, d, StochasticLine::D)),
                Box::new(Sma::new(self.sma_fast)),
                Box::new(Sma::new(self.sma_mid)),
                Box::new(Sma::new(self.sma_slow)),
                Box::new(Ema::new(self.ema_fast)),
                Box::new(Ema::new(self.ema_slow)),
                Box::new(Bollinger::new(bp, bs, BollingerBand::Lower)),
                Box::new(Bollinger::new(bp, bs, BollingerBand::Middle)),
                Box::new(Bollinger::new(bp, bs, BollingerBand::Upper)),
                Box::new(Bollinger::new(bp, bs, BollingerBand::Width)),
                Box::new(Atr::new(self.atr_period)),
                Box::new(AccumulationDistribution),
                Box::new(OnBalanceVolume),
            ],
        }
    }

    /// Index of the first bar at which every feature is defined.
    pub fn max_lookback(&self) -> usize {
        let indicator_max = self
            .indicator_set()
            .indicators
            .iter()
            .map(|i| i.lookback())
            .max()
            .unwrap_or(0);
        let value_lag_max = self.value_lags.iter().copied().max().unwrap_or(0);
        // return at t needs t-1; its lag k needs t-1-k
        let return_lag_max = 1 + self.return_lags.iter().copied().max().unwrap_or(0);
        indicator_max
            .max(value_lag_max)
            .max(return_lag_max)
            .max(self.volatility_window)
    }

    /// Ordered feature column names.
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .indicator_set()
            .indicators
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        for lag in self.value_lags {
            names.push(format!("close_lag{lag}"));
        }
        for lag in self.value_lags {
            names.push(format!("volume_lag{lag}"));
        }
        names.push("daily_return".into());
        for lag in self.return_lags {
            names.push(format!("daily_return_lag{lag}"));
        }
        names.push(format!("volatility_{}d", self.volatility_window));
        names.extend(
            ["day_of_week", "day_of_month", "month", "year"]
                .iter()
                .map(|s| s.to_string()),
        );
        names
    }

    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<(), FeatureConfigError> {
        let periods = [
            ("rsi_period", self.rsi_period),
            ("macd_fast", self.macd_fast),
            ("macd_signal", self.macd_signal),
            ("stoch_k", self.stoch_k),
            ("stoch_smooth", self.stoch_smooth),
            ("stoch_d", self.stoch_d),
            ("sma_fast", self.sma_fast),
            ("sma_mid", self.sma_mid),
            ("sma_slow", self.sma_slow),
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("bb_period", self.bb_period),
            ("atr_period", self.atr_period),
            ("horizon", self.horizon),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, v)| *v == 0) {
            return Err(FeatureConfigError::ZeroPeriod(name));
        }
        if self.macd_slow <= self.macd_fast {
            return Err(FeatureConfigError::MacdOrder {
                fast: self.macd_fast,
                slow: self.macd_slow,
            });
        }
        if self.volatility_window < 2 {
            return Err(FeatureConfigError::VolatilityWindow(self.volatility_window));
        }
        if !self.bb_std.is_finite() || self.bb_std <= 0.0 {
            return Err(FeatureConfigError::BollingerStd(self.bb_std));
        }
        if !self.up_threshold.is_finite() {
            return Err(FeatureConfigError::UpThreshold(self.up_threshold));
        }
        if self.min_history_bars() <= self.max_lookback() + self.horizon {
            return Err(FeatureConfigError::NoLabelledRows {
                history: self.min_history_bars(),
                warmup: self.max_lookback(),
            });
        }
        Ok(())
    }
}
