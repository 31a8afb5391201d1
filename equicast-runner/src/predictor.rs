//! Next-bar direction prediction from a trained artifact.
//!
//! Data for prediction always comes straight from the adapter so the latest
//! bars are seen; the cache is for training only. Features are computed with
//! the same engine and configuration as training, then reindexed onto the
//! artifact's schema before the classifier sees them.

use crate::config::PipelineConfig;
use crate::ledger::{DuplicatePolicy, LedgerError, LedgerWrite, PredictionLedger};
use crate::pool::{fan_out, PoolError};
use chrono::{NaiveDate, NaiveDateTime};
use equicast_core::data::ExchangeAdapter;
use equicast_core::domain::{PredictionRecord, RawBar};
use equicast_core::features::{compute, FeatureSchema, LabelMode, SchemaMismatch};
use equicast_core::model::{ModelArtifact, ModelError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("cannot use model artifact: {0}")]
    Model(#[from] ModelError),

    #[error("model schema is incompatible: {0}")]
    Schema(#[from] SchemaMismatch),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Why no prediction was written for a ticker.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Skip {
    #[error("already predicted for this date")]
    AlreadyPredicted,

    #[error("no data: {reason}")]
    NoData { reason: String },

    #[error("insufficient history: {bars} clean bars, need {required}")]
    InsufficientHistory { bars: usize, required: usize },

    #[error("no complete feature row")]
    NoFeatureRows,

    #[error("latest complete feature row is {row}, but the last bar is {last_bar}")]
    StaleFeatures { row: NaiveDateTime, last_bar: NaiveDateTime },

    #[error("model rejected the row: {reason}")]
    Model { reason: String },
}

#[derive(Debug)]
pub struct PredictionSummary {
    pub prediction_for_date: NaiveDate,
    /// Records inserted or replaced this run, sorted by ticker.
    pub written: Vec<PredictionRecord>,
    pub skipped: Vec<(String, Skip)>,
    pub ledger_path: PathBuf,
}

pub struct PredictionEngine<'a> {
    config: &'a PipelineConfig,
    adapter: &'a ExchangeAdapter,
    artifact: ModelArtifact,
    engine_schema: FeatureSchema,
}

impl<'a> PredictionEngine<'a> {
    /// Wrap an artifact, checking its schema against the configured features.
    ///
    /// A version mismatch is fatal. Columns the model needs but the engine no
    /// longer produces are zero-filled at prediction time.
    pub fn new(
        config: &'a PipelineConfig,
        adapter: &'a ExchangeAdapter,
        artifact: ModelArtifact,
    ) -> Result<Self, PredictError> {
        let engine_schema = FeatureSchema::from_config(&config.features);
        let check = engine_schema.check_superset(&artifact.schema)?;
        if !check.is_superset() {
            warn!(
                missing = ?check.missing,
                "model expects columns the engine does not produce; they will be zero-filled"
            );
        }
        if !check.extra.is_empty() {
            debug!(extra = ?check.extra, "engine columns unused by the model");
        }
        if engine_schema.fingerprint != artifact.schema.fingerprint {
            warn!(
                model = %artifact.schema.fingerprint,
                engine = %engine_schema.fingerprint,
                "feature configuration differs from the one the model was trained with"
            );
        }
        Ok(Self {
            config,
            adapter,
            artifact,
            engine_schema,
        })
    }

    /// Load the artifact from `paths.model_file`.
    pub fn load(config: &'a PipelineConfig, adapter: &'a ExchangeAdapter) -> Result<Self, PredictError> {
        let path = &config.paths.model_file;
        let artifact = ModelArtifact::load(path)?;
        info!(
            path = %path.display(),
            trees = artifact.classifier.n_trees(),
            train_end = %artifact.train_end_date,
            "model loaded"
        );
        Self::new(config, adapter, artifact)
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// The date a prediction made on `as_of` is for.
    pub fn target_date(&self, as_of: NaiveDate) -> NaiveDate {
        as_of + chrono::Duration::days(self.config.features.horizon as i64)
    }

    /// Predict the direction of the bar after `as_of` for one ticker.
    pub fn predict_next_day(&self, ticker: &str, as_of: NaiveDate) -> Result<PredictionRecord, Skip> {
        let window = self.config.prediction_window(as_of);
        let mut series = self
            .adapter
            .fetch(ticker, self.config.data.kind, &window)
            .map_err(|e| Skip::NoData {
                reason: e.to_string(),
            })?;
        if let Some(end_of_day) = as_of.and_hms_opt(23, 59, 59) {
            series.truncate_after(end_of_day);
        }

        let clean = series.bars.iter().filter_map(RawBar::clean).count();
        let last_bar = series
            .bars
            .iter()
            .rev()
            .find_map(RawBar::clean)
            .map(|b| b.timestamp);
        let required = self.config.features.min_history_bars();
        if clean < required {
            return Err(Skip::InsufficientHistory {
                bars: clean,
                required,
            });
        }

        let frame = compute(ticker, &series.bars, &self.config.features, LabelMode::Inference)
            .ok_or(Skip::NoFeatureRows)?;
        let latest = frame.latest().ok_or(Skip::NoFeatureRows)?;
        if let Some(last_bar) = last_bar.filter(|t| *t != latest.timestamp) {
            return Err(Skip::StaleFeatures {
                row: latest.timestamp,
                last_bar,
            });
        }
        let aligned = frame
            .schema
            .align(&self.artifact.schema, &latest.values())
            .map_err(|e| Skip::Model {
                reason: e.to_string(),
            })?;
        if !aligned.zero_filled.is_empty() {
            debug!(ticker, columns = ?aligned.zero_filled, "zero-filled absent columns");
        }

        let probability_up = self
            .artifact
            .predict_proba(&aligned.values)
            .map_err(|e| Skip::Model {
                reason: e.to_string(),
            })?;
        debug!(
            ticker,
            symbol = %series.symbol,
            bar = %latest.timestamp,
            probability_up,
            "predicted"
        );
        Ok(PredictionRecord::from_probability(
            ticker,
            as_of,
            self.target_date(as_of),
            probability_up,
        ))
    }

    /// Predict every ticker and record the results in `ledger`.
    ///
    /// Under `DuplicatePolicy::Skip`, tickers already in the ledger are not
    /// fetched at all.
    pub fn predict_all(
        &self,
        tickers: &[String],
        as_of: NaiveDate,
        ledger: &mut PredictionLedger,
        policy: DuplicatePolicy,
    ) -> Result<PredictionSummary, PredictError> {
        let prediction_for_date = self.target_date(as_of);
        let mut skipped = Vec::new();
        let pending: Vec<String> = tickers
            .iter()
            .filter(|t| {
                let known = policy == DuplicatePolicy::Skip && ledger.contains(t);
                if known {
                    info!(ticker = %t, date = %prediction_for_date, "already predicted, skipping");
                    skipped.push((t.to_string(), Skip::AlreadyPredicted));
                }
                !known
            })
            .cloned()
            .collect();

        info!(
            tickers = pending.len(),
            %as_of,
            target = %prediction_for_date,
            workers = self.config.concurrency.max_workers,
            "predicting"
        );
        let mut outcomes = fan_out(self.config.concurrency.max_workers, &pending, |ticker| {
            (ticker.clone(), self.predict_next_day(ticker, as_of))
        })?;
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut written = Vec::new();
        for (ticker, outcome) in outcomes {
            match outcome {
                Ok(record) => match ledger.upsert(record.clone(), policy)? {
                    LedgerWrite::Inserted | LedgerWrite::Replaced => {
                        info!(
                            ticker = %record.ticker,
                            movement = %record.predicted_movement,
                            probability_up = record.probability_up,
                            "prediction recorded"
                        );
                        written.push(record);
                    }
                    LedgerWrite::Kept => skipped.push((ticker, Skip::AlreadyPredicted)),
                },
                Err(skip) => {
                    warn!(ticker = %ticker, reason = %skip, "prediction skipped");
                    skipped.push((ticker, skip));
                }
            }
        }
        skipped.sort_by(|a, b| a.0.cmp(&b.0));

        if !written.is_empty() {
            ledger.save()?;
        }
        Ok(PredictionSummary {
            prediction_for_date,
            written,
            skipped,
            ledger_path: ledger.path().to_path_buf(),
        })
    }

    /// Schema the configured feature engine produces.
    pub fn engine_schema(&self) -> &FeatureSchema {
        &self.engine_schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equicast_core::data::{
        ColumnLabel, DataError, DataProvider, DataSource, FetchWindow, ProviderFrame, RawValue,
    };
    use equicast_core::features::{FeatureConfig, FEATURE_COUNT};
    use equicast_core::model::{FeatureMatrix, GbmParams, GradientBoostedClassifier};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Rising closes for "UP.NS", the same with a zero-priced second-to-last
    /// bar for "GAP.NS", the last 30 days for "SHORT.NS", nothing else.
    /// Counts requests.
    struct StubProvider {
        calls: AtomicUsize,
    }

    impl DataProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn source(&self) -> DataSource {
            DataSource::Synthetic
        }

        fn fetch(&self, symbol: &str, window: &FetchWindow) -> Result<ProviderFrame, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let FetchWindow::Range { start, end } = window else {
                return Err(DataError::Other("daily only".into()));
            };
            let start = match symbol {
                "UP.NS" | "GAP.NS" => *start,
                "SHORT.NS" => *end - chrono::Duration::days(29),
                _ => {
                    return Err(DataError::SymbolNotFound {
                        symbol: symbol.into(),
                    })
                }
            };
            let days = (*end - start).num_days() + 1;
            let mut frame = ProviderFrame::default();
            let mut close = Vec::new();
            for i in 0..days {
                frame
                    .index
                    .push((start + chrono::Duration::days(i)).and_hms_opt(0, 0, 0).unwrap());
                close.push(100.0 * 1.01f64.powi(i as i32) + (i % 3) as f64 * 0.1);
            }
            if symbol == "GAP.NS" && close.len() >= 2 {
                let k = close.len() - 2;
                close[k] = 0.0;
            }
            let col = |f: f64| close.iter().map(|c| RawValue::Number(c * f)).collect::<Vec<_>>();
            frame.push_column(ColumnLabel::Flat("Open".into()), col(0.995));
            frame.push_column(ColumnLabel::Flat("High".into()), col(1.01));
            frame.push_column(ColumnLabel::Flat("Low".into()), col(0.99));
            frame.push_column(ColumnLabel::Flat("Close".into()), col(1.0));
            frame.push_column(
                ColumnLabel::Flat("Volume".into()),
                close.iter().map(|_| RawValue::Number(10_000.0)).collect(),
            );
            Ok(frame)
        }
    }

    fn artifact(config: &FeatureConfig) -> ModelArtifact {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let mut r = vec![0.0; FEATURE_COUNT];
                r[0] = i as f64;
                r
            })
            .collect();
        let labels: Vec<u8> = (0..40).map(|i| u8::from(i >= 20)).collect();
        let x = FeatureMatrix::from_rows(FEATURE_COUNT, &rows).unwrap();
        let params = GbmParams {
            n_estimators: 5,
            ..GbmParams::default()
        };
        let clf = GradientBoostedClassifier::fit(&params, &x, &labels).unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ModelArtifact::new(FeatureSchema::from_config(config), clf, d, vec!["UP".into()], None).unwrap()
    }

    fn setup() -> (PipelineConfig, ExchangeAdapter, Arc<StubProvider>) {
        let provider = Arc::new(StubProvider {
            calls: AtomicUsize::new(0),
        });
        let adapter = ExchangeAdapter::with_default_suffixes(provider.clone(), Duration::ZERO);
        (PipelineConfig::default(), adapter, provider)
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
    }

    #[test]
    fn predicts_next_day_record() {
        let (config, adapter, _) = setup();
        let engine = PredictionEngine::new(&config, &adapter, artifact(&config.features)).unwrap();
        let record = engine.predict_next_day("UP", as_of()).unwrap();
        assert_eq!(record.ticker, "UP");
        assert_eq!(record.source_date, as_of());
        assert_eq!(record.prediction_for_date, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
        assert!((0.0..=1.0).contains(&record.probability_up));
        assert_eq!(record.predicted_class, u8::from(record.probability_up > 0.5));
    }

    #[test]
    fn unknown_ticker_is_no_data() {
        let (config, adapter, _) = setup();
        let engine = PredictionEngine::new(&config, &adapter, artifact(&config.features)).unwrap();
        assert!(matches!(
            engine.predict_next_day("NOPE", as_of()),
            Err(Skip::NoData { .. })
        ));
    }

    #[test]
    fn short_series_is_insufficient_history() {
        let (config, adapter, _) = setup();
        let engine = PredictionEngine::new(&config, &adapter, artifact(&config.features)).unwrap();
        assert_eq!(
            engine.predict_next_day("SHORT", as_of()),
            Err(Skip::InsufficientHistory {
                bars: 30,
                required: 250
            })
        );
    }

    #[test]
    fn incomplete_last_row_is_stale_not_predicted() {
        let (config, adapter, _) = setup();
        let engine = PredictionEngine::new(&config, &adapter, artifact(&config.features)).unwrap();
        let last_bar = as_of().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(
            engine.predict_next_day("GAP", as_of()),
            Err(Skip::StaleFeatures {
                row: last_bar - chrono::Duration::days(1),
                last_bar,
            })
        );
    }

    #[test]
    fn version_mismatch_is_fatal() {
        let (config, adapter, _) = setup();
        let mut art = artifact(&config.features);
        art.schema.version += 1;
        assert!(matches!(
            PredictionEngine::new(&config, &adapter, art),
            Err(PredictError::Schema(SchemaMismatch::Version { .. }))
        ));
    }

    #[test]
    fn skip_policy_does_not_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let (config, adapter, provider) = setup();
        let engine = PredictionEngine::new(&config, &adapter, artifact(&config.features)).unwrap();
        let tickers = vec!["UP".to_string()];

        let mut ledger = PredictionLedger::open(dir.path(), engine.target_date(as_of())).unwrap();
        let first = engine
            .predict_all(&tickers, as_of(), &mut ledger, DuplicatePolicy::Skip)
            .unwrap();
        assert_eq!(first.written.len(), 1);
        let calls = provider.calls.load(Ordering::SeqCst);

        let mut ledger = PredictionLedger::open(dir.path(), engine.target_date(as_of())).unwrap();
        let second = engine
            .predict_all(&tickers, as_of(), &mut ledger, DuplicatePolicy::Skip)
            .unwrap();
        assert!(second.written.is_empty());
        assert_eq!(second.skipped, vec![("UP".to_string(), Skip::AlreadyPredicted)]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), calls);
        assert_eq!(ledger.records().len(), 1);
    }
}
