//! Look-ahead contamination tests for every indicator and the feature engine.
//!
//! Invariant: no value at bar t may depend on price data from bar t+1 or later.
//!
//! Method: compute on a truncated series and on the full series, then assert
//! the overlapping prefix is identical. Any difference means future data is
//! leaking into past values.

use chrono::NaiveDate;
use equicast_core::domain::{Bar, RawBar};
use equicast_core::features::{compute, FeatureConfig, LabelMode};
use equicast_core::indicators::*;

/// Deterministic pseudo-random walk using a simple LCG.
fn make_test_bars(n: usize) -> Vec<Bar> {
    let base = NaiveDate::from_ymd_opt(2021, 1, 4)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut bars = Vec::with_capacity(n);
    let mut price = 100.0;

    for i in 0..n {
        let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
        let change = ((seed % 200) as f64 - 100.0) * 0.05;
        price = f64::max(price + change, 10.0);

        let open = price - 0.5;
        let close = price + 0.3;
        bars.push(Bar {
            timestamp: base + chrono::Duration::days(i as i64),
            open,
            high: open.max(close) + 2.0,
            low: open.min(close) - 2.0,
            close,
            volume: 1000.0 + (i as f64 * 100.0),
        });
    }
    bars
}

fn assert_no_lookahead(indicator: &dyn Indicator, full_bars: &[Bar], truncated_len: usize) {
    let truncated = &full_bars[..truncated_len];
    let full_result = indicator.compute(full_bars);
    let truncated_result = indicator.compute(truncated);

    assert_eq!(truncated_result.len(), truncated_len, "{}: length", indicator.name());
    assert_eq!(full_result.len(), full_bars.len(), "{}: length", indicator.name());

    for i in 0..truncated_len {
        let t = truncated_result[i];
        let f = full_result[i];
        if t.is_nan() && f.is_nan() {
            continue;
        }
        assert!(
            !t.is_nan() && !f.is_nan(),
            "{}: NaN mismatch at bar {i} (truncated={t}, full={f})",
            indicator.name()
        );
        assert!(
            (t - f).abs() < 1e-10,
            "{}: look-ahead contamination at bar {i}: truncated={t}, full={f}",
            indicator.name()
        );
    }
}

#[test]
fn lookahead_moving_averages() {
    let bars = make_test_bars(400);
    for p in [20, 50, 200] {
        assert_no_lookahead(&Sma::new(p), &bars, 250);
    }
    for p in [20, 50] {
        assert_no_lookahead(&Ema::new(p), &bars, 250);
    }
}

#[test]
fn lookahead_rsi() {
    let bars = make_test_bars(200);
    assert_no_lookahead(&Rsi::new(14), &bars, 100);
    assert_no_lookahead(&Rsi::new(7), &bars, 100);
}

#[test]
fn lookahead_macd() {
    let bars = make_test_bars(200);
    for out in [MacdOutput::Line, MacdOutput::Signal, MacdOutput::Histogram] {
        assert_no_lookahead(&Macd::new(12, 26, 9, out), &bars, 100);
    }
}

#[test]
fn lookahead_stochastic() {
    let bars = make_test_bars(200);
    assert_no_lookahead(&Stochastic::new(14, 3, 3, StochasticLine::K), &bars, 100);
    assert_no_lookahead(&Stochastic::new(14, 3, 3, StochasticLine::D), &bars, 100);
}

#[test]
fn lookahead_bollinger() {
    let bars = make_test_bars(200);
    for band in [
        BollingerBand::Upper,
        BollingerBand::Middle,
        BollingerBand::Lower,
        BollingerBand::Width,
    ] {
        assert_no_lookahead(&Bollinger::new(20, 2.0, band), &bars, 100);
    }
}

#[test]
fn lookahead_atr() {
    let bars = make_test_bars(200);
    assert_no_lookahead(&Atr::new(14), &bars, 100);
    assert_no_lookahead(&Atr::new(5), &bars, 100);
}

#[test]
fn lookahead_volume_indicators() {
    let bars = make_test_bars(200);
    assert_no_lookahead(&AccumulationDistribution, &bars, 100);
    assert_no_lookahead(&OnBalanceVolume, &bars, 100);
}

#[test]
fn lookahead_feature_rows() {
    let bars: Vec<RawBar> = make_test_bars(400)
        .into_iter()
        .map(|b| RawBar {
            timestamp: b.timestamp,
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            volume: b.volume,
        })
        .collect();
    let cfg = FeatureConfig::default();

    let full = compute("LCG", &bars, &cfg, LabelMode::Inference).unwrap();
    let truncated = compute("LCG", &bars[..300], &cfg, LabelMode::Inference).unwrap();

    assert_eq!(truncated.rows.len(), 101);
    for (t, f) in truncated.rows.iter().zip(&full.rows) {
        assert_eq!(t.timestamp, f.timestamp);
        for (a, b) in t.values().iter().zip(f.values().iter()) {
            assert!((a - b).abs() < 1e-10, "feature drift at {}", t.timestamp);
        }
    }
}
