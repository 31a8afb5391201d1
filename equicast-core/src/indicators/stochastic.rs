//! Stochastic oscillator (slow form).
//!
//! raw %K = 100 * (close - lowest_low(k)) / (highest_high(k) - lowest_low(k))
//! %K     = SMA(raw %K, smooth)
//! %D     = SMA(%K, d)
//!
//! A window with zero range (a halted or locked stretch) yields a raw %K of
//! 0, as if the range were one machine epsilon wide.
//! Lookback: (k - 1) + (smooth - 1) for %K, plus (d - 1) for %D.

use super::sma::sma_of_series;
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StochasticLine {
    K,
    D,
}

#[derive(Debug, Clone)]
pub struct Stochastic {
    k: usize,
    smooth: usize,
    d: usize,
    line: StochasticLine,
    name: String,
}

impl Stochastic {
    pub fn new(k: usize, smooth: usize, d: usize, line: StochasticLine) -> Self {
        assert!(k >= 1 && smooth >= 1 && d >= 1, "stochastic periods must be >= 1");
        let tag = match line {
            StochasticLine::K => "stoch_k",
            StochasticLine::D => "stoch_d",
        };
        Self {
            k,
            smooth,
            d,
            line,
            name: format!("{tag}_{k}_{d}_{smooth}"),
        }
    }
}

/// Unsmoothed %K.
pub fn raw_k(bars: &[Bar], period: usize) -> Vec<f64> {
    let n = bars.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    for i in (period - 1)..n {
        let window = &bars[(i + 1 - period)..=i];
        let hh = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let ll = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let range = hh - ll;
        result[i] = if range > 0.0 {
            100.0 * (bars[i].close - ll) / range
        } else {
            0.0
        };
    }

    result
}

impl Indicator for Stochastic {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        let k_lookback = self.k - 1 + self.smooth - 1;
        match self.line {
            StochasticLine::K => k_lookback,
            StochasticLine::D => k_lookback + self.d - 1,
        }
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let k = sma_of_series(&raw_k(bars, self.k), self.smooth);
        match self.line {
            StochasticLine::K => k,
            StochasticLine::D => sma_of_series(&k, self.d),
        }
    }
}
