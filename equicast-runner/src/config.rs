//! Pipeline configuration.
//!
//! Built once per run from defaults, an optional TOML file, then CLI
//! overrides; validated; then handed to every stage by shared reference.

use crate::ledger::DuplicatePolicy;
use chrono::NaiveDate;
use equicast_core::data::{adapter::DEFAULT_SUFFIXES, FetchWindow};
use equicast_core::domain::DataKind;
use equicast_core::features::{FeatureConfig, FeatureConfigError};
use equicast_core::model::GbmParams;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("invalid config TOML: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid [features] section: {0}")]
    Features(#[from] FeatureConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub paths: PathsConfig,
    pub features: FeatureConfig,
    pub training: TrainingConfig,
    pub prediction: PredictionConfig,
    pub concurrency: ConcurrencyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Bare tickers, no exchange suffix.
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    /// Inclusive; today when absent.
    pub end_date: Option<NaiveDate>,
    pub kind: DataKind,
    /// Exchange suffixes tried in order.
    pub suffixes: Vec<String>,
    /// Sleep after every provider request.
    pub api_delay_secs: f64,
    pub intraday_period: String,
    pub intraday_interval: String,
    /// Read `{csv_dir}/{SYMBOL}.csv` instead of calling the network.
    pub csv_dir: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            tickers: vec!["TATAMOTORS".into()],
            start_date: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or_default(),
            end_date: None,
            kind: DataKind::Daily,
            suffixes: DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            api_delay_secs: 5.0,
            intraday_period: "60d".into(),
            intraday_interval: "15m".into(),
            csv_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub cache_dir: PathBuf,
    pub processed_file: PathBuf,
    pub model_file: PathBuf,
    pub predictions_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: "raw_data_cache".into(),
            processed_file: "processed_data/training_data.parquet".into(),
            model_file: "models/direction_model.json".into(),
            predictions_dir: "predictions".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Rows dated strictly before this go to training, the rest to test.
    pub train_end_date: NaiveDate,
    /// Load `paths.processed_file` instead of rebuilding the table.
    pub reuse_dataset: bool,
    pub gbm: GbmParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            train_end_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            reuse_dataset: false,
            gbm: GbmParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PredictionConfig {
    pub duplicate_policy: DuplicatePolicy,
    /// Date the prediction is made from; today when absent.
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub max_workers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_workers: 1 }
    }
}

/// Command-line overrides, applied after the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub tickers: Option<Vec<String>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub kind: Option<DataKind>,
    pub max_workers: Option<usize>,
    pub api_delay_secs: Option<f64>,
    pub csv_dir: Option<PathBuf>,
    pub as_of: Option<NaiveDate>,
    pub reuse_dataset: bool,
    pub overwrite: bool,
}

impl PipelineConfig {
    /// Defaults, then `path` if given, then `overrides`, then validation.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.data.tickers = config.tickers();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply(&mut self, o: &ConfigOverrides) {
        if let Some(t) = &o.tickers {
            self.data.tickers = t.clone();
        }
        if let Some(d) = o.start_date {
            self.data.start_date = d;
        }
        if let Some(d) = o.end_date {
            self.data.end_date = Some(d);
        }
        if let Some(k) = o.kind {
            self.data.kind = k;
        }
        if let Some(w) = o.max_workers {
            self.concurrency.max_workers = w;
        }
        if let Some(s) = o.api_delay_secs {
            self.data.api_delay_secs = s;
        }
        if let Some(dir) = &o.csv_dir {
            self.data.csv_dir = Some(dir.clone());
        }
        if let Some(d) = o.as_of {
            self.prediction.as_of = Some(d);
        }
        if o.reuse_dataset {
            self.training.reuse_dataset = true;
        }
        if o.overwrite {
            self.prediction.duplicate_policy = DuplicatePolicy::Overwrite;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |m: String| Err(ConfigError::Invalid(m));

        if self.data.tickers.is_empty() {
            return invalid("data.tickers is empty".into());
        }
        if let Some(t) = self.data.tickers.iter().find(|t| t.trim().is_empty()) {
            return invalid(format!("blank ticker {t:?}"));
        }
        if self.data.suffixes.is_empty() {
            return invalid("data.suffixes is empty".into());
        }
        if !(self.data.api_delay_secs >= 0.0 && self.data.api_delay_secs.is_finite()) {
            return invalid(format!(
                "data.api_delay_secs must be >= 0, got {}",
                self.data.api_delay_secs
            ));
        }
        let end = self.end_date();
        if self.data.start_date > end {
            return invalid(format!(
                "start_date {} is after end_date {end}",
                self.data.start_date
            ));
        }
        if self.concurrency.max_workers == 0 {
            return invalid("concurrency.max_workers must be >= 1".into());
        }
        self.features.validate()?;
        self.training
            .gbm
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    /// Trimmed, upper-cased tickers without repeats, in first-seen order.
    pub fn tickers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.data
            .tickers
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.data
            .end_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    pub fn as_of(&self) -> NaiveDate {
        self.prediction
            .as_of
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    pub fn api_delay(&self) -> Duration {
        Duration::from_secs_f64(self.data.api_delay_secs)
    }

    /// Window for assembling the training table.
    pub fn training_window(&self) -> FetchWindow {
        match self.data.kind {
            DataKind::Daily => FetchWindow::daily(self.data.start_date, self.end_date()),
            DataKind::Intraday => self.intraday_window(),
        }
    }

    /// Window ending at `as_of` long enough to warm every indicator.
    pub fn prediction_window(&self, as_of: NaiveDate) -> FetchWindow {
        match self.data.kind {
            DataKind::Daily => {
                let days = self.features.prediction_window_days();
                FetchWindow::daily(as_of - chrono::Duration::days(days), as_of)
            }
            DataKind::Intraday => self.intraday_window(),
        }
    }

    fn intraday_window(&self) -> FetchWindow {
        FetchWindow::intraday(&self.data.intraday_period, &self.data.intraday_interval)
    }

    /// BLAKE3 over the serialized configuration.
    pub fn config_hash(&self) -> String {
        match serde_json::to_vec(self) {
            Ok(bytes) => blake3::hash(&bytes).to_hex().to_string(),
            Err(_) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = PipelineConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.data.tickers, vec!["TATAMOTORS"]);
        assert_eq!(c.data.suffixes, vec![".NS", ".BO"]);
        assert_eq!(c.concurrency.max_workers, 1);
        assert_eq!(c.training.train_end_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(c.prediction.duplicate_policy, DuplicatePolicy::Skip);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let c = PipelineConfig::from_toml(
            r#"
[data]
tickers = ["INFY", "TCS"]
start_date = "2018-06-01"
api_delay_secs = 0.5

[training.gbm]
n_estimators = 50
"#,
        )
        .unwrap();
        assert_eq!(c.data.tickers, vec!["INFY", "TCS"]);
        assert_eq!(c.data.start_date, NaiveDate::from_ymd_opt(2018, 6, 1).unwrap());
        assert_eq!(c.data.kind, DataKind::Daily);
        assert_eq!(c.training.gbm.n_estimators, 50);
        assert_eq!(c.training.gbm.learning_rate, 0.05);
        assert_eq!(c.features.rsi_period, 14);
    }

    #[test]
    fn toml_round_trip() {
        let mut c = PipelineConfig::default();
        c.data.end_date = Some(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
        c.data.csv_dir = Some("fixtures".into());
        let text = c.to_toml().unwrap();
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), c);
    }

    #[test]
    fn overrides_win_over_file() {
        let overrides = ConfigOverrides {
            tickers: Some(vec![" reliance ".into()]),
            max_workers: Some(4),
            api_delay_secs: Some(0.0),
            overwrite: true,
            ..ConfigOverrides::default()
        };
        let c = PipelineConfig::load(None, &overrides).unwrap();
        assert_eq!(c.data.tickers, vec!["RELIANCE"]);
        assert_eq!(c.concurrency.max_workers, 4);
        assert_eq!(c.api_delay(), Duration::ZERO);
        assert_eq!(c.prediction.duplicate_policy, DuplicatePolicy::Overwrite);
    }

    #[test]
    fn file_tickers_are_normalized_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("equicast.toml");
        std::fs::write(
            &path,
            "[data]\ntickers = [\" syn\", \"INFY\", \"SYN\", \"infy \", \"TCS\"]\n",
        )
        .unwrap();
        let c = PipelineConfig::load(Some(&path), &ConfigOverrides::default()).unwrap();
        assert_eq!(c.data.tickers, vec!["SYN", "INFY", "TCS"]);
    }

    #[test]
    fn invalid_values_rejected() {
        let zero_workers = ConfigOverrides {
            max_workers: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            PipelineConfig::load(None, &zero_workers),
            Err(ConfigError::Invalid(_))
        ));

        let backwards = ConfigOverrides {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2023, 1, 1),
            ..ConfigOverrides::default()
        };
        assert!(PipelineConfig::load(None, &backwards).is_err());

        assert!(matches!(
            PipelineConfig::from_toml("[data]\ntickers = 3"),
            Err(ConfigError::Parse(_))
        ));

        let mut bad_features = PipelineConfig::default();
        bad_features.features.rsi_period = 0;
        assert!(matches!(
            bad_features.validate(),
            Err(ConfigError::Features(FeatureConfigError::ZeroPeriod("rsi_period")))
        ));
    }

    #[test]
    fn prediction_window_spans_indicator_warmup() {
        let c = PipelineConfig::default();
        let as_of = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        match c.prediction_window(as_of) {
            FetchWindow::Range { start, end } => {
                assert_eq!(end, as_of);
                assert_eq!((end - start).num_days(), 410);
            }
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = PipelineConfig::load(
            Some(Path::new("/nonexistent/equicast.toml")),
            &ConfigOverrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
