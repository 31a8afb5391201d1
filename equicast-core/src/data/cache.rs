//! Parquet bar cache, one file per (kind, ticker).
//!
//! Layout: `{cache_dir}/{kind}/{TICKER}.parquet` plus `{TICKER}.meta.json`.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity validation on load (schema check, row count > 0)
//! - A file that fails validation is deleted and treated as a miss
//! - No expiry: a hit is served regardless of age; `clear` invalidates

use super::adapter::ExchangeAdapter;
use super::provider::{DataError, DataSource, FetchWindow};
use super::schema::BarSchema;
use crate::domain::{BarSeries, DataKind, RawBar};
use chrono::{NaiveDateTime, TimeZone};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Metadata sidecar for a cached ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub ticker: String,
    pub symbol: String,
    pub kind: DataKind,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub bar_count: usize,
    pub data_hash: String,
    pub source: DataSource,
    pub cached_at: NaiveDateTime,
}

/// Cache status for a single cached file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub ticker: String,
    pub kind: DataKind,
    pub bytes: u64,
    pub meta: Option<CacheMeta>,
}

pub struct BarCache {
    cache_dir: PathBuf,
}

impl BarCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn kind_dir(&self, kind: DataKind) -> PathBuf {
        self.cache_dir.join(kind.as_str())
    }

    /// Path to the Parquet file: `{cache_dir}/{kind}/{TICKER}.parquet`
    pub fn data_path(&self, ticker: &str, kind: DataKind) -> PathBuf {
        self.kind_dir(kind).join(format!("{ticker}.parquet"))
    }

    fn meta_path(&self, ticker: &str, kind: DataKind) -> PathBuf {
        self.kind_dir(kind).join(format!("{ticker}.meta.json"))
    }

    /// Serve from cache, or fetch through the adapter and write back.
    ///
    /// A failed write is logged; the fetched series is still returned.
    pub fn load_or_fetch(
        &self,
        ticker: &str,
        kind: DataKind,
        adapter: &ExchangeAdapter,
        window: &FetchWindow,
    ) -> Result<BarSeries, DataError> {
        if let Some(series) = self.load(ticker, kind)? {
            debug!(ticker, %kind, bars = series.len(), "cache hit");
            return Ok(series);
        }

        info!(ticker, %kind, "cache miss, fetching");
        let series = adapter.fetch(ticker, kind, window)?;
        if let Err(e) = self.write(&series) {
            warn!(ticker, %kind, reason = %e, "failed to write cache");
        }
        Ok(series)
    }

    /// Load cached bars. `Ok(None)` on a miss, including a corrupt file.
    pub fn load(&self, ticker: &str, kind: DataKind) -> Result<Option<BarSeries>, DataError> {
        let path = self.data_path(ticker, kind);
        if !path.exists() {
            return Ok(None);
        }

        match load_and_validate_parquet(&path) {
            Ok(bars) => {
                let symbol = self
                    .get_meta(ticker, kind)
                    .map(|m| m.symbol)
                    .unwrap_or_else(|| ticker.to_string());
                Ok(Some(BarSeries {
                    ticker: ticker.to_string(),
                    symbol,
                    kind,
                    source: DataSource::Cache,
                    bars,
                }))
            }
            Err(e) => {
                warn!(
                    ticker,
                    %kind,
                    path = %path.display(),
                    reason = %e,
                    "deleting corrupt cache file"
                );
                if let Err(e) = fs::remove_file(&path) {
                    warn!(ticker, path = %path.display(), reason = %e, "cannot remove corrupt cache file");
                }
                let _ = fs::remove_file(self.meta_path(ticker, kind));
                Ok(None)
            }
        }
    }

    /// Write a series to the cache. Writes are atomic: write to .tmp then rename.
    pub fn write(&self, series: &BarSeries) -> Result<(), DataError> {
        let (Some(first), Some(last)) = (series.bars.first(), series.bars.last()) else {
            return Err(DataError::CacheError("no bars to cache".into()));
        };

        let dir = self.kind_dir(series.kind);
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let df = bars_to_dataframe(&series.bars)?;
        let path = self.data_path(&series.ticker, series.kind);
        let tmp_path = path.with_extension("parquet.tmp");

        write_parquet(&df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        let meta = CacheMeta {
            ticker: series.ticker.clone(),
            symbol: series.symbol.clone(),
            kind: series.kind,
            start: first.timestamp,
            end: last.timestamp,
            bar_count: series.bars.len(),
            data_hash: hash_bars(&series.bars)?,
            source: series.source,
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(&series.ticker, series.kind), meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;

        Ok(())
    }

    pub fn get_meta(&self, ticker: &str, kind: DataKind) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(ticker, kind)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Remove cached files. `None` for ticker or kind means "all".
    ///
    /// Returns the number of data files removed.
    pub fn clear(&self, ticker: Option<&str>, kind: Option<DataKind>) -> Result<usize, DataError> {
        let kinds: Vec<DataKind> = match kind {
            Some(k) => vec![k],
            None => DataKind::ALL.to_vec(),
        };

        let mut removed = 0;
        for kind in kinds {
            let targets: Vec<String> = match ticker {
                Some(t) => vec![t.to_string()],
                None => self.cached_tickers(kind)?,
            };
            for t in targets {
                let path = self.data_path(&t, kind);
                if path.exists() {
                    fs::remove_file(&path)
                        .map_err(|e| DataError::CacheError(format!("remove {t}: {e}")))?;
                    removed += 1;
                }
                let _ = fs::remove_file(self.meta_path(&t, kind));
            }
        }
        info!(removed, "cache cleared");
        Ok(removed)
    }

    /// Status of every cached file, sorted by kind then ticker.
    pub fn status(&self) -> Result<Vec<CacheStatus>, DataError> {
        let mut out = Vec::new();
        for kind in DataKind::ALL {
            for ticker in self.cached_tickers(kind)? {
                let bytes = fs::metadata(self.data_path(&ticker, kind))
                    .map(|m| m.len())
                    .unwrap_or(0);
                let meta = self.get_meta(&ticker, kind);
                out.push(CacheStatus {
                    ticker,
                    kind,
                    bytes,
                    meta,
                });
            }
        }
        Ok(out)
    }

    fn cached_tickers(&self, kind: DataKind) -> Result<Vec<String>, DataError> {
        let dir = self.kind_dir(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(&dir).map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;

        let mut tickers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                tickers.push(stem.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }
}

/// BLAKE3 content hash of a bar slice.
pub fn hash_bars(bars: &[RawBar]) -> Result<String, DataError> {
    let bytes = serde_json::to_vec(bars)
        .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn bars_to_dataframe(bars: &[RawBar]) -> Result<DataFrame, DataError> {
    let millis: Vec<i64> = bars
        .iter()
        .map(|b| b.timestamp.and_utc().timestamp_millis())
        .collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("timestamp".into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| DataError::ParquetError(format!("timestamp cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<RawBar>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    BarSchema::validate(&df).map_err(|e| DataError::ValidationError(e.to_string()))?;

    dataframe_to_bars(&df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<RawBar>, DataError> {
    let map_err = |e: PolarsError| DataError::ParquetError(format!("column read: {e}"));

    let millis = df
        .column("timestamp")
        .map_err(map_err)?
        .cast(&DataType::Int64)
        .map_err(map_err)?;
    let millis = millis.i64().map_err(map_err)?;

    let f64_col = |name: &str| -> Result<Float64Chunked, DataError> {
        Ok(df.column(name).map_err(map_err)?.f64().map_err(map_err)?.clone())
    };
    let open = f64_col("open")?;
    let high = f64_col("high")?;
    let low = f64_col("low")?;
    let close = f64_col("close")?;
    let volume = f64_col("volume")?;

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let ms = millis
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null timestamp at row {i}")))?;
        let timestamp = chrono::Utc
            .timestamp_millis_opt(ms)
            .single()
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| DataError::ParquetError(format!("invalid timestamp {ms} at row {i}")))?;

        bars.push(RawBar {
            timestamp,
            open: open.get(i).unwrap_or(f64::NAN),
            high: high.get(i).unwrap_or(f64::NAN),
            low: low.get(i).unwrap_or(f64::NAN),
            close: close.get(i).unwrap_or(f64::NAN),
            volume: volume.get(i).unwrap_or(f64::NAN),
        });
    }

    Ok(bars)
}
