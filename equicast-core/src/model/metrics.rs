//! Hold-out evaluation: accuracy, ROC AUC, per-class report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fraction of matching labels; `None` for empty or mismatched input.
pub fn accuracy(y_true: &[u8], y_pred: &[u8]) -> Option<f64> {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return None;
    }
    let hits = y_true.iter().zip(y_pred).filter(|(a, b)| a == b).count();
    Some(hits as f64 / y_true.len() as f64)
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged.
///
/// `None` when only one class is present.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> Option<f64> {
    if y_true.len() != scores.len() {
        return None;
    }
    let n_pos = y_true.iter().filter(|&&y| y == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut pos_rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            if y_true[k] == 1 {
                pos_rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1 plus macro and weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub labels: [String; 2],
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassificationReport {
    /// Build for binary labels. `labels` names class 0 and class 1.
    pub fn binary(y_true: &[u8], y_pred: &[u8], labels: [&str; 2]) -> Self {
        let n = y_true.len().min(y_pred.len());
        let mut classes = [ClassMetrics {
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
            support: 0,
        }; 2];

        for (c, slot) in classes.iter_mut().enumerate() {
            let c = c as u8;
            let (mut tp, mut predicted, mut actual) = (0, 0, 0);
            for (&t, &p) in y_true[..n].iter().zip(&y_pred[..n]) {
                if p == c {
                    predicted += 1;
                }
                if t == c {
                    actual += 1;
                    if p == c {
                        tp += 1;
                    }
                }
            }
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, actual);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            *slot = ClassMetrics {
                precision,
                recall,
                f1,
                support: actual,
            };
        }

        let total: usize = classes.iter().map(|c| c.support).sum();
        let avg = |f: fn(&ClassMetrics) -> f64| -> (f64, f64) {
            let macro_ = classes.iter().map(f).sum::<f64>() / 2.0;
            let weighted = if total == 0 {
                0.0
            } else {
                classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / total as f64
            };
            (macro_, weighted)
        };
        let (mp, wp) = avg(|c| c.precision);
        let (mr, wr) = avg(|c| c.recall);
        let (mf, wf) = avg(|c| c.f1);

        Self {
            labels: labels.map(String::from),
            classes,
            accuracy: accuracy(&y_true[..n], &y_pred[..n]).unwrap_or(0.0),
            macro_avg: ClassMetrics {
                precision: mp,
                recall: mr,
                f1: mf,
                support: total,
            },
            weighted_avg: ClassMetrics {
                precision: wp,
                recall: wr,
                f1: wf,
                support: total,
            },
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        fn line(f: &mut fmt::Formatter<'_>, name: &str, m: &ClassMetrics) -> fmt::Result {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, m.precision, m.recall, m.f1, m.support
            )
        }
        for (name, m) in self.labels.iter().zip(&self.classes) {
            line(f, name, m)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        line(f, "macro avg", &self.macro_avg)?;
        line(f, "weighted avg", &self.weighted_avg)
    }
}

/// Hold-out evaluation stored alongside the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub n_train: usize,
    pub n_test: usize,
    pub accuracy: f64,
    /// Absent when the test split has a single class.
    pub roc_auc: Option<f64>,
    pub report: ClassificationReport,
}

impl Evaluation {
    pub fn compute(n_train: usize, y_true: &[u8], proba: &[f64]) -> Self {
        let y_pred: Vec<u8> = proba.iter().map(|&p| u8::from(p > 0.5)).collect();
        Self {
            n_train,
            n_test: y_true.len(),
            accuracy: accuracy(y_true, &y_pred).unwrap_or(0.0),
            roc_auc: roc_auc(y_true, proba),
            report: ClassificationReport::binary(y_true, &y_pred, ["DOWN/FLAT", "UP"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_basic() {
        assert_eq!(accuracy(&[1, 0, 1, 1], &[1, 0, 0, 1]), Some(0.75));
        assert_eq!(accuracy(&[], &[]), None);
        assert_eq!(accuracy(&[1], &[1, 0]), None);
    }

    #[test]
    fn auc_perfect_and_inverted() {
        let y = [0, 0, 1, 1];
        assert_eq!(roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&y, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
    }

    #[test]
    fn auc_handles_ties() {
        // all scores equal: chance level
        assert_eq!(roc_auc(&[0, 1, 0, 1], &[0.5; 4]), Some(0.5));
        // one positive tied with one negative
        let auc = roc_auc(&[0, 0, 1, 1], &[0.1, 0.5, 0.5, 0.9]).unwrap();
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn auc_undefined_for_one_class() {
        assert_eq!(roc_auc(&[1, 1, 1], &[0.2, 0.4, 0.6]), None);
    }

    #[test]
    fn report_numbers() {
        let y_true = [0, 0, 0, 1, 1];
        let y_pred = [0, 1, 0, 1, 0];
        let r = ClassificationReport::binary(&y_true, &y_pred, ["DOWN/FLAT", "UP"]);

        assert_eq!(r.classes[0].support, 3);
        assert!((r.classes[0].precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((r.classes[0].recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((r.classes[1].precision - 0.5).abs() < 1e-12);
        assert!((r.classes[1].recall - 0.5).abs() < 1e-12);
        assert_eq!(r.accuracy, 0.6);
        assert_eq!(r.weighted_avg.support, 5);

        let text = r.to_string();
        assert!(text.contains("precision"));
        assert!(text.contains("UP"));
        assert!(text.contains("weighted avg"));
    }

    #[test]
    fn class_never_predicted_has_zero_precision() {
        let r = ClassificationReport::binary(&[0, 1, 1], &[0, 0, 0], ["neg", "pos"]);
        assert_eq!(r.classes[1].precision, 0.0);
        assert_eq!(r.classes[1].f1, 0.0);
    }

    #[test]
    fn evaluation_thresholds_at_half() {
        let e = Evaluation::compute(10, &[0, 1, 1], &[0.2, 0.7, 0.4]);
        assert_eq!(e.n_test, 3);
        assert!((e.accuracy - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(e.roc_auc, Some(1.0));
    }
}
