//! Dataset assembly: fetch and featurize every ticker, then combine.
//!
//! Tickers run on the bounded pool. A ticker that fails (no data on any
//! exchange, too little history, no complete rows) is logged and listed in
//! the report; the run continues. Zero successes is fatal.

use crate::config::PipelineConfig;
use crate::pool::{fan_out, PoolError};
use crate::table::{TableError, TrainingTable};
use equicast_core::data::{BarCache, DataError, ExchangeAdapter, FetchWindow};
use equicast_core::domain::BarSeries;
use equicast_core::features::{compute, FeatureFrame, LabelMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("no ticker produced training rows ({attempted} attempted)")]
    NoData { attempted: usize },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerFailure {
    pub ticker: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyReport {
    /// (ticker, row count), sorted by ticker.
    pub succeeded: Vec<(String, usize)>,
    pub failed: Vec<TickerFailure>,
    pub rows: usize,
    pub content_hash: String,
}

/// Bars for one ticker through the cache, clipped to the requested range.
fn load_bars(
    ticker: &str,
    config: &PipelineConfig,
    adapter: &ExchangeAdapter,
    cache: &BarCache,
    window: &FetchWindow,
) -> Result<BarSeries, DataError> {
    let mut series = cache.load_or_fetch(ticker, config.data.kind, adapter, window)?;
    if let FetchWindow::Range { start, end } = window {
        series.bars.retain(|b| {
            let d = b.timestamp.date();
            d >= *start && d <= *end
        });
    }
    Ok(series)
}

fn featurize(
    ticker: &str,
    config: &PipelineConfig,
    adapter: &ExchangeAdapter,
    cache: &BarCache,
    window: &FetchWindow,
) -> Result<FeatureFrame, TickerFailure> {
    let fail = |reason: String| TickerFailure {
        ticker: ticker.to_string(),
        reason,
    };
    let series = load_bars(ticker, config, adapter, cache, window).map_err(|e| fail(e.to_string()))?;
    compute(ticker, &series.bars, &config.features, LabelMode::Training).ok_or_else(|| {
        fail(format!(
            "no training rows from {} bars (need at least {})",
            series.len(),
            config.features.min_history_bars()
        ))
    })
}

/// Build the training table for `config.data.tickers` and persist it.
pub fn build_training_table(
    config: &PipelineConfig,
    adapter: &ExchangeAdapter,
    cache: &BarCache,
) -> Result<(TrainingTable, AssemblyReport), AssembleError> {
    let tickers = config.tickers();
    let window = config.training_window();
    info!(
        tickers = tickers.len(),
        workers = config.concurrency.max_workers,
        kind = %config.data.kind,
        "assembling training table"
    );

    let outcomes = fan_out(config.concurrency.max_workers, &tickers, |ticker| {
        featurize(ticker, config, adapter, cache, &window)
    })?;

    let mut frames = Vec::new();
    let mut report = AssemblyReport::default();
    for outcome in outcomes {
        match outcome {
            Ok(frame) => {
                info!(ticker = %frame.ticker, rows = frame.rows.len(), "ticker featurized");
                report.succeeded.push((frame.ticker.clone(), frame.rows.len()));
                frames.push(frame);
            }
            Err(failure) => {
                warn!(ticker = %failure.ticker, reason = %failure.reason, "ticker skipped");
                report.failed.push(failure);
            }
        }
    }
    report.succeeded.sort();
    report.failed.sort_by(|a, b| a.ticker.cmp(&b.ticker));

    let table = TrainingTable::from_frames(frames)?.ok_or(AssembleError::NoData {
        attempted: tickers.len(),
    })?;
    report.rows = table.len();
    report.content_hash = table.content_hash();
    info!(
        rows = report.rows,
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        hash = %report.content_hash,
        "training table assembled"
    );

    table.write_parquet(&config.paths.processed_file)?;
    Ok((table, report))
}

/// Outcome of warming the cache for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmResult {
    pub ticker: String,
    pub symbol: Option<String>,
    pub bars: usize,
    pub error: Option<String>,
}

/// Fetch every configured ticker into the cache without featurizing.
pub fn warm_cache(
    config: &PipelineConfig,
    adapter: &ExchangeAdapter,
    cache: &BarCache,
) -> Result<Vec<WarmResult>, AssembleError> {
    let window = config.training_window();
    let mut results = fan_out(
        config.concurrency.max_workers,
        &config.tickers(),
        |ticker| match load_bars(ticker, config, adapter, cache, &window) {
            Ok(series) => WarmResult {
                ticker: ticker.clone(),
                symbol: Some(series.symbol),
                bars: series.bars.len(),
                error: None,
            },
            Err(e) => {
                warn!(ticker = %ticker, reason = %e, "fetch failed");
                WarmResult {
                    ticker: ticker.clone(),
                    symbol: None,
                    bars: 0,
                    error: Some(e.to_string()),
                }
            }
        },
    )?;
    results.sort_by(|a, b| a.ticker.cmp(&b.ticker));
    Ok(results)
}
