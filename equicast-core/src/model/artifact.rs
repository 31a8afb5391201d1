//! Persisted model: classifier plus the feature schema it was trained on.
//!
//! Stored as pretty JSON, written atomically (.tmp then rename). Loading
//! rejects unknown format versions and classifiers whose width disagrees
//! with the stored schema.

use super::gbm::GradientBoostedClassifier;
use super::metrics::Evaluation;
use super::ModelError;
use crate::features::FeatureSchema;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Bump when the artifact layout changes.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub schema: FeatureSchema,
    pub classifier: GradientBoostedClassifier,
    pub trained_at: NaiveDateTime,
    /// Rows strictly before this date were used for fitting.
    pub train_end_date: NaiveDate,
    pub tickers: Vec<String>,
    pub evaluation: Option<Evaluation>,
}

impl ModelArtifact {
    pub fn new(
        schema: FeatureSchema,
        classifier: GradientBoostedClassifier,
        train_end_date: NaiveDate,
        tickers: Vec<String>,
        evaluation: Option<Evaluation>,
    ) -> Result<Self, ModelError> {
        let artifact = Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            schema,
            classifier,
            trained_at: chrono::Local::now().naive_local(),
            train_end_date,
            tickers,
            evaluation,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ModelError::Format(format!(
                "artifact format {} is not supported (expected {ARTIFACT_FORMAT_VERSION})",
                self.format_version
            )));
        }
        if self.schema.len() != self.classifier.n_features() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.schema.len(),
                found: self.classifier.n_features(),
            });
        }
        Ok(())
    }

    /// Probability of an UP move for a row already aligned to `self.schema`.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64, ModelError> {
        self.classifier.predict_proba(row)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| ModelError::Io(format!("create {}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ModelError::Format(format!("serialize: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| ModelError::Io(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            ModelError::Io(format!("rename to {}: {e}", path.display()))
        })?;

        info!(
            path = %path.display(),
            trees = self.classifier.n_trees(),
            features = self.schema.len(),
            "model artifact saved"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ModelError::Io(format!("read {}: {e}", path.display())))?;
        let artifact: Self = serde_json::from_str(&content)
            .map_err(|e| ModelError::Format(format!("{}: {e}", path.display())))?;
        artifact.validate()?;
        Ok(artifact)
    }
}
