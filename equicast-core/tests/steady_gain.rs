//! A series gaining 1% every day labels every row UP, and a model fit on
//! those rows calls the next day UP as well.

use chrono::{NaiveDate, NaiveDateTime};
use equicast_core::domain::RawBar;
use equicast_core::features::{compute, FeatureConfig, LabelMode, FEATURE_COUNT};
use equicast_core::model::{FeatureMatrix, GbmParams, GradientBoostedClassifier};

fn ts(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 6, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::days(i as i64)
}

fn steady_gain(n: usize) -> Vec<RawBar> {
    (0..n)
        .map(|i| {
            let close = 100.0 * 1.01_f64.powi(i as i32);
            RawBar {
                timestamp: ts(i),
                open: close * 0.998,
                high: close * 1.004,
                low: close * 0.994,
                close,
                volume: 50_000.0 + (i % 11) as f64 * 400.0,
            }
        })
        .collect()
}

#[test]
fn every_training_row_is_up() {
    let cfg = FeatureConfig::default();
    let frame = compute("SYN", &steady_gain(300), &cfg, LabelMode::Training).unwrap();

    assert!(!frame.rows.is_empty());
    assert!(frame.rows.iter().all(|r| r.target == Some(1)));
    // the final bar has no next close to label against
    assert_eq!(frame.rows.last().unwrap().timestamp, ts(298));
}

#[test]
fn model_fit_on_steady_gain_predicts_up() {
    let cfg = FeatureConfig::default();
    let bars = steady_gain(300);
    let training = compute("SYN", &bars, &cfg, LabelMode::Training).unwrap();

    let values: Vec<[f64; FEATURE_COUNT]> = training.rows.iter().map(|r| r.values()).collect();
    let labels: Vec<u8> = training.rows.iter().map(|r| r.target.unwrap()).collect();
    let x = FeatureMatrix::from_rows(FEATURE_COUNT, &values).unwrap();
    let params = GbmParams {
        n_estimators: 20,
        ..GbmParams::default()
    };
    let model = GradientBoostedClassifier::fit(&params, &x, &labels).unwrap();

    let inference = compute("SYN", &bars, &cfg, LabelMode::Inference).unwrap();
    let latest = inference.latest().unwrap();
    assert_eq!(latest.timestamp, ts(299));
    assert!(model.predict_proba(&latest.values()).unwrap() > 0.5);
}
