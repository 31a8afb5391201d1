//! Versioned feature schema.
//!
//! The schema is the ordered list of feature column names plus a version and
//! a BLAKE3 fingerprint over both and the feature configuration. It is stored
//! with the model so inference can detect drift between the features the
//! model was trained on and the features the engine now produces.

use super::config::FeatureConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Bump when the meaning of an existing column changes.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub columns: Vec<String>,
    pub fingerprint: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum SchemaMismatch {
    #[error("feature schema version {found} does not match engine version {expected}")]
    Version { expected: u32, found: u32 },

    #[error("row has {found} values but schema has {expected} columns")]
    Width { expected: usize, found: usize },
}

/// Result of comparing a produced schema against a required one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCheck {
    /// Required columns the producer does not emit (zero-filled on align).
    pub missing: Vec<String>,
    /// Produced columns the requirement does not use (dropped on align).
    pub extra: Vec<String>,
}

impl SchemaCheck {
    pub fn is_superset(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A row reindexed onto a target schema.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRow {
    pub values: Vec<f64>,
    pub zero_filled: Vec<String>,
}

impl FeatureSchema {
    pub fn from_config(config: &FeatureConfig) -> Self {
        Self::with_columns(config.column_names(), config)
    }

    fn with_columns(columns: Vec<String>, config: &FeatureConfig) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&FEATURE_SCHEMA_VERSION.to_le_bytes());
        for c in &columns {
            hasher.update(c.as_bytes());
            hasher.update(&[0]);
        }
        // serde_json of a plain struct cannot fail
        if let Ok(cfg) = serde_json::to_vec(config) {
            hasher.update(&cfg);
        }
        Self {
            version: FEATURE_SCHEMA_VERSION,
            columns,
            fingerprint: hasher.finalize().to_hex().to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Compare what this schema produces against what `required` expects.
    pub fn check_superset(&self, required: &FeatureSchema) -> Result<SchemaCheck, SchemaMismatch> {
        if required.version != self.version {
            return Err(SchemaMismatch::Version {
                expected: self.version,
                found: required.version,
            });
        }
        let missing = required
            .columns
            .iter()
            .filter(|c| self.position(c).is_none())
            .cloned()
            .collect();
        let extra = self
            .columns
            .iter()
            .filter(|c| required.position(c).is_none())
            .cloned()
            .collect();
        Ok(SchemaCheck { missing, extra })
    }

    /// Reindex a row produced under this schema onto `target`.
    ///
    /// Target columns absent here are zero-filled; columns not in the target
    /// are dropped; order follows the target.
    pub fn align(&self, target: &FeatureSchema, values: &[f64]) -> Result<AlignedRow, SchemaMismatch> {
        if values.len() != self.columns.len() {
            return Err(SchemaMismatch::Width {
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        let by_name: HashMap<&str, f64> = self
            .columns
            .iter()
            .map(String::as_str)
            .zip(values.iter().copied())
            .collect();

        let mut zero_filled = Vec::new();
        let aligned = target
            .columns
            .iter()
            .map(|c| match by_name.get(c.as_str()) {
                Some(v) => *v,
                None => {
                    zero_filled.push(c.clone());
                    0.0
                }
            })
            .collect();

        Ok(AlignedRow {
            values: aligned,
            zero_filled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(cols: &[&str]) -> FeatureSchema {
        FeatureSchema::with_columns(
            cols.iter().map(|c| c.to_string()).collect(),
            &FeatureConfig::default(),
        )
    }

    #[test]
    fn fingerprint_tracks_config() {
        let a = FeatureSchema::from_config(&FeatureConfig::default());
        let b = FeatureSchema::from_config(&FeatureConfig {
            sma_slow: 150,
            ..FeatureConfig::default()
        });
        assert_ne!(a.fingerprint, b.fingerprint);
        assert_eq!(a, FeatureSchema::from_config(&FeatureConfig::default()));
    }

    #[test]
    fn align_reorders_fills_and_drops() {
        let live = schema(&["a", "b", "c"]);
        let model = schema(&["c", "d", "a"]);
        let aligned = live.align(&model, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(aligned.values, vec![3.0, 0.0, 1.0]);
        assert_eq!(aligned.zero_filled, vec!["d".to_string()]);
    }

    #[test]
    fn align_rejects_wrong_width() {
        let live = schema(&["a", "b"]);
        assert!(matches!(
            live.align(&live, &[1.0]),
            Err(SchemaMismatch::Width { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn superset_check_lists_differences() {
        let live = schema(&["a", "b", "c"]);
        let check = live.check_superset(&schema(&["a", "c"])).unwrap();
        assert!(check.is_superset());
        assert_eq!(check.extra, vec!["b".to_string()]);

        let check = live.check_superset(&schema(&["a", "z"])).unwrap();
        assert!(!check.is_superset());
        assert_eq!(check.missing, vec!["z".to_string()]);
    }

    #[test]
    fn version_mismatch_rejected() {
        let live = schema(&["a"]);
        let mut old = schema(&["a"]);
        old.version = 0;
        assert_eq!(
            live.check_superset(&old),
            Err(SchemaMismatch::Version {
                expected: FEATURE_SCHEMA_VERSION,
                found: 0
            })
        );
    }
}
