//! Moving Average Convergence Divergence (MACD).
//!
//! line      = EMA(close, fast) - EMA(close, slow)
//! signal    = EMA(line, signal)
//! histogram = line - signal
//!
//! Lookback: slow - 1 for the line, plus signal - 1 for signal and histogram.

use super::ema::{ema_after_warmup, ema_of_series};
use super::{closes, Indicator};
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdOutput {
    Line,
    Signal,
    Histogram,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    output: MacdOutput,
    name: String,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize, output: MacdOutput) -> Self {
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(slow > fast, "MACD slow period must exceed fast period");
        let prefix = match output {
            MacdOutput::Line => "macd",
            MacdOutput::Signal => "macd_signal",
            MacdOutput::Histogram => "macd_hist",
        };
        Self {
            fast,
            slow,
            signal,
            output,
            name: format!("{prefix}_{fast}_{slow}_{signal}"),
        }
    }
}

/// All three MACD series at once.
pub fn macd_series(values: &[f64], fast: usize, slow: usize, signal: usize) -> [Vec<f64>; 3] {
    let fast_ema = ema_of_series(values, fast);
    let slow_ema = ema_of_series(values, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_after_warmup(&line, signal);
    let hist: Vec<f64> = line.iter().zip(&signal_line).map(|(l, s)| l - s).collect();
    [line, signal_line, hist]
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        match self.output {
            MacdOutput::Line => self.slow - 1,
            MacdOutput::Signal | MacdOutput::Histogram => self.slow + self.signal - 2,
        }
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let [line, signal, hist] = macd_series(&closes(bars), self.fast, self.slow, self.signal);
        match self.output {
            MacdOutput::Line => line,
            MacdOutput::Signal => signal,
            MacdOutput::Histogram => hist,
        }
    }
}
