//! Equicast Runner — pipeline orchestration on top of `equicast-core`.
//!
//! This crate provides:
//! - Layered configuration (defaults, TOML file, CLI overrides)
//! - Dataset assembly across tickers on a bounded worker pool
//! - Persisted training table (Parquet) with a schema sidecar
//! - Temporal-split training and evaluation
//! - Next-day prediction with duplicate-aware dated prediction files
//! - The end-to-end pipeline for each run mode

pub mod assembler;
pub mod config;
pub mod ledger;
pub mod pipeline;
pub mod pool;
pub mod predictor;
pub mod table;
pub mod trainer;

pub use assembler::{build_training_table, warm_cache, AssembleError, AssemblyReport, TickerFailure, WarmResult};
pub use config::{ConfigError, ConfigOverrides, PipelineConfig};
pub use ledger::{ledger_file_name, DuplicatePolicy, LedgerError, LedgerWrite, PredictionLedger};
pub use pipeline::{build_adapter, run_pipeline, run_pipeline_with, Mode, PipelineSummary};
pub use pool::{fan_out, PoolError};
pub use predictor::{PredictError, PredictionEngine, PredictionSummary, Skip};
pub use table::{TableError, TableRow, TrainingTable};
pub use trainer::{train, TrainError, TrainOutcome};
