//! Gradient-boosted tree classifier, evaluation metrics, and the persisted artifact.

pub mod artifact;
pub mod gbm;
pub mod matrix;
pub mod metrics;
pub mod tree;

pub use artifact::{ModelArtifact, ARTIFACT_FORMAT_VERSION};
pub use gbm::{GbmParams, GradientBoostedClassifier};
pub use matrix::FeatureMatrix;
pub use metrics::{accuracy, roc_auc, ClassMetrics, ClassificationReport, Evaluation};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("{rows} rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },

    #[error("expected {expected} features, got {found}")]
    FeatureCountMismatch { expected: usize, found: usize },

    #[error("non-finite value in feature matrix at row {row}, column {col}")]
    NonFiniteInput { row: usize, col: usize },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("artifact I/O error: {0}")]
    Io(String),

    #[error("artifact format error: {0}")]
    Format(String),
}
