//! Volume-weighted cumulative indicators.
//!
//! Accumulation/Distribution line:
//!   clv = ((close - low) - (high - close)) / (high - low), 0 when high == low
//!   AD[t] = AD[t-1] + clv * volume
//!
//! On-Balance Volume:
//!   OBV[0] = 0
//!   OBV[t] = OBV[t-1] + sign(close[t] - close[t-1]) * volume[t]
//!
//! Both have zero lookback.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Default)]
pub struct AccumulationDistribution;

impl Indicator for AccumulationDistribution {
    fn name(&self) -> &str {
        "ad"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut acc = 0.0;
        bars.iter()
            .map(|b| {
                let range = b.high - b.low;
                let clv = if range > 0.0 {
                    ((b.close - b.low) - (b.high - b.close)) / range
                } else {
                    0.0
                };
                acc += clv * b.volume;
                acc
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OnBalanceVolume;

impl Indicator for OnBalanceVolume {
    fn name(&self) -> &str {
        "obv"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut result = Vec::with_capacity(bars.len());
        let mut acc = 0.0;
        for (i, bar) in bars.iter().enumerate() {
            if i > 0 {
                let prev = bars[i - 1].close;
                if bar.close > prev {
                    acc += bar.volume;
                } else if bar.close < prev {
                    acc -= bar.volume;
                }
            }
            result.push(acc);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_ohlcv_bars, DEFAULT_EPSILON};

    #[test]
    fn ad_accumulates_close_location() {
        let bars = make_ohlcv_bars(&[
            (10.0, 12.0, 8.0, 12.0, 100.0), // clv = 1
            (12.0, 12.0, 8.0, 8.0, 50.0),   // clv = -1
            (9.0, 10.0, 8.0, 9.0, 40.0),    // clv = 0
        ]);
        let ad = AccumulationDistribution.compute(&bars);
        assert_approx(ad[0], 100.0, DEFAULT_EPSILON);
        assert_approx(ad[1], 50.0, DEFAULT_EPSILON);
        assert_approx(ad[2], 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ad_zero_range_contributes_nothing() {
        let bars = make_ohlcv_bars(&[(5.0, 5.0, 5.0, 5.0, 1000.0)]);
        assert_eq!(AccumulationDistribution.compute(&bars), vec![0.0]);
    }

    #[test]
    fn obv_signs_volume() {
        let bars = make_ohlcv_bars(&[
            (1.0, 1.0, 1.0, 10.0, 100.0),
            (1.0, 1.0, 1.0, 11.0, 30.0),
            (1.0, 1.0, 1.0, 11.0, 70.0),
            (1.0, 1.0, 1.0, 9.0, 20.0),
        ]);
        assert_eq!(OnBalanceVolume.compute(&bars), vec![0.0, 30.0, 30.0, 10.0]);
    }
}
