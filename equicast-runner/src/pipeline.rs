//! End-to-end run: assemble, train, predict, in the order a mode asks for.

use crate::assembler::{build_training_table, AssemblyReport};
use crate::config::PipelineConfig;
use crate::ledger::PredictionLedger;
use crate::predictor::{PredictionEngine, PredictionSummary};
use crate::table::TrainingTable;
use crate::trainer::train;
use anyhow::{Context, Result};
use equicast_core::data::{BarCache, CsvDirProvider, DataError, DataProvider, ExchangeAdapter, YahooProvider};
use equicast_core::features::FeatureSchema;
use equicast_core::model::{Evaluation, ModelArtifact};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    TrainAndPredict,
    TrainOnly,
    PredictOnly,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::TrainAndPredict => "train_and_predict",
            Mode::TrainOnly => "train_only",
            Mode::PredictOnly => "predict_only",
        }
    }

    fn trains(&self) -> bool {
        !matches!(self, Mode::PredictOnly)
    }

    fn predicts(&self) -> bool {
        !matches!(self, Mode::TrainOnly)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "train_and_predict" => Ok(Mode::TrainAndPredict),
            "train_only" | "train" => Ok(Mode::TrainOnly),
            "predict_only" | "predict" => Ok(Mode::PredictOnly),
            other => Err(format!(
                "unknown mode '{other}' (expected train_and_predict, train_only or predict_only)"
            )),
        }
    }
}

#[derive(Debug)]
pub struct PipelineSummary {
    pub mode: Mode,
    pub config_hash: String,
    /// `None` when training was skipped or the table was reused from disk.
    pub assembly: Option<AssemblyReport>,
    pub training_rows: Option<usize>,
    pub evaluation: Option<Evaluation>,
    pub model_path: Option<PathBuf>,
    pub predictions: Option<PredictionSummary>,
    pub elapsed: Duration,
}

/// Adapter over the CSV directory when one is configured, Yahoo otherwise.
pub fn build_adapter(config: &PipelineConfig) -> Result<ExchangeAdapter, DataError> {
    let provider: Arc<dyn DataProvider> = match &config.data.csv_dir {
        Some(dir) => Arc::new(CsvDirProvider::new(dir.clone())),
        None => Arc::new(YahooProvider::new()?),
    };
    Ok(ExchangeAdapter::new(
        provider,
        config.data.suffixes.clone(),
        config.api_delay(),
    ))
}

pub fn run_pipeline(mode: Mode, config: &PipelineConfig) -> Result<PipelineSummary> {
    let adapter = build_adapter(config).context("failed to set up data provider")?;
    run_pipeline_with(mode, config, &adapter)
}

/// Run `mode` against an already-built adapter.
pub fn run_pipeline_with(
    mode: Mode,
    config: &PipelineConfig,
    adapter: &ExchangeAdapter,
) -> Result<PipelineSummary> {
    let started = Instant::now();
    let mut summary = PipelineSummary {
        mode,
        config_hash: config.config_hash(),
        assembly: None,
        training_rows: None,
        evaluation: None,
        model_path: None,
        predictions: None,
        elapsed: Duration::ZERO,
    };
    info!(
        %mode,
        provider = adapter.provider_name(),
        tickers = config.tickers().len(),
        config_hash = %summary.config_hash,
        "pipeline starting"
    );

    let mut trained: Option<ModelArtifact> = None;
    if mode.trains() {
        let (table, report) = training_table(config, adapter)?;
        summary.training_rows = Some(table.len());
        summary.assembly = report;

        let outcome = train(&table, config).context("training failed")?;
        summary.evaluation = outcome.evaluation().cloned();
        summary.model_path = Some(outcome.model_path);
        trained = Some(outcome.artifact);
    }

    if mode.predicts() {
        let engine = match trained {
            Some(artifact) => PredictionEngine::new(config, adapter, artifact)?,
            None => PredictionEngine::load(config, adapter).with_context(|| {
                format!(
                    "cannot load model from {}; run a training mode first",
                    config.paths.model_file.display()
                )
            })?,
        };
        let as_of = config.as_of();
        let mut ledger = PredictionLedger::open(&config.paths.predictions_dir, engine.target_date(as_of))?;
        let predictions = engine.predict_all(
            &config.tickers(),
            as_of,
            &mut ledger,
            config.prediction.duplicate_policy,
        )?;
        summary.predictions = Some(predictions);
    }

    summary.elapsed = started.elapsed();
    info!(%mode, elapsed_ms = summary.elapsed.as_millis() as u64, "pipeline finished");
    Ok(summary)
}

/// The persisted table when reuse is requested and possible, else a fresh build.
fn training_table(
    config: &PipelineConfig,
    adapter: &ExchangeAdapter,
) -> Result<(TrainingTable, Option<AssemblyReport>)> {
    let path = &config.paths.processed_file;
    if config.training.reuse_dataset {
        if path.exists() {
            let expected = FeatureSchema::from_config(&config.features);
            let table = TrainingTable::read_parquet(path, &expected)
                .with_context(|| format!("cannot reuse dataset {}", path.display()))?;
            info!(path = %path.display(), rows = table.len(), "reusing processed dataset");
            return Ok((table, None));
        }
        warn!(path = %path.display(), "no processed dataset to reuse, rebuilding");
    }

    let cache = BarCache::new(config.paths.cache_dir.clone());
    let (table, report) =
        build_training_table(config, adapter, &cache).context("dataset assembly failed")?;
    Ok((table, Some(report)))
}
