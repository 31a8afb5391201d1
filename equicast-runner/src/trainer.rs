//! Model training with a temporal hold-out.

use crate::config::PipelineConfig;
use crate::table::TrainingTable;
use equicast_core::model::{Evaluation, GradientBoostedClassifier, ModelArtifact, ModelError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("temporal split left an empty side ({train} train rows, {test} test rows)")]
    EmptySplit { train: usize, test: usize },

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub artifact: ModelArtifact,
    pub model_path: PathBuf,
}

impl TrainOutcome {
    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.artifact.evaluation.as_ref()
    }
}

/// Fit on rows before `training.train_end_date`, evaluate on the rest, persist.
pub fn train(table: &TrainingTable, config: &PipelineConfig) -> Result<TrainOutcome, TrainError> {
    let cutoff = config.training.train_end_date;
    let (train_rows, test_rows) = table.split_at(cutoff);
    info!(
        %cutoff,
        train = train_rows.len(),
        test = test_rows.len(),
        "temporal split"
    );
    if train_rows.is_empty() || test_rows.is_empty() {
        return Err(TrainError::EmptySplit {
            train: train_rows.len(),
            test: test_rows.len(),
        });
    }

    let (x_train, y_train) = TrainingTable::matrix(&train_rows)?;
    let (x_test, y_test) = TrainingTable::matrix(&test_rows)?;
    let up_rate = y_train.iter().filter(|&&y| y == 1).count() as f64 / y_train.len() as f64;
    debug!(up_rate, "training label balance");

    let params = &config.training.gbm;
    info!(
        trees = params.n_estimators,
        learning_rate = params.learning_rate,
        max_depth = params.max_depth,
        "fitting classifier"
    );
    let classifier = GradientBoostedClassifier::fit(params, &x_train, &y_train)?;

    let proba = classifier.predict_proba_batch(&x_test)?;
    let evaluation = Evaluation::compute(train_rows.len(), &y_test, &proba);
    log_evaluation(&evaluation);
    log_importance(&classifier, &table.schema.columns);

    let artifact = ModelArtifact::new(
        table.schema.clone(),
        classifier,
        cutoff,
        table.tickers(),
        Some(evaluation),
    )?;
    let model_path = config.paths.model_file.clone();
    artifact.save(&model_path)?;

    Ok(TrainOutcome {
        artifact,
        model_path,
    })
}

fn log_evaluation(e: &Evaluation) {
    match e.roc_auc {
        Some(auc) => info!(accuracy = e.accuracy, roc_auc = auc, test_rows = e.n_test, "evaluation"),
        None => info!(
            accuracy = e.accuracy,
            test_rows = e.n_test,
            "evaluation (ROC AUC undefined: single class in test split)"
        ),
    }
    info!("classification report\n{}", e.report);
}

fn log_importance(classifier: &GradientBoostedClassifier, columns: &[String]) {
    let mut ranked: Vec<(&String, f64)> = columns.iter().zip(classifier.feature_importance()).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (name, gain) in ranked.iter().take(10) {
        debug!(feature = %name, gain, "importance");
    }
}
