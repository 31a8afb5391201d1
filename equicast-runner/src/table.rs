//! Training table: labelled feature rows for every ticker.
//!
//! Persisted as Parquet with a categorical `ticker` column, a millisecond
//! `timestamp`, one `f64` column per feature in schema order and an `i32`
//! `target`. The feature schema is written next to it as
//! `{stem}.schema.json` so a reused table can be checked against the
//! current configuration.

use chrono::{NaiveDate, TimeZone};
use equicast_core::features::{FeatureFrame, FeatureRow, FeatureSchema, FEATURE_COUNT};
use equicast_core::model::{FeatureMatrix, ModelError};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("table I/O error: {0}")]
    Io(String),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("table has no schema sidecar at {0}")]
    MissingSchema(String),

    #[error("stored feature schema {found} differs from configured {expected}")]
    SchemaDrift { expected: String, found: String },

    #[error("feature frames disagree on schema")]
    MixedSchemas,

    #[error("duplicate row for {ticker} at {timestamp}")]
    DuplicateKey { ticker: String, timestamp: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub ticker: String,
    pub row: FeatureRow,
}

#[derive(Debug, Clone)]
pub struct TrainingTable {
    pub schema: FeatureSchema,
    rows: Vec<TableRow>,
}

impl TrainingTable {
    /// Combine per-ticker frames, sorted by (ticker, timestamp).
    pub fn from_frames(frames: Vec<FeatureFrame>) -> Result<Option<Self>, TableError> {
        let mut frames = frames.into_iter();
        let Some(first) = frames.next() else {
            return Ok(None);
        };
        let schema = first.schema.clone();
        let mut rows: Vec<TableRow> = Vec::new();
        for frame in std::iter::once(first).chain(frames) {
            if frame.schema != schema {
                return Err(TableError::MixedSchemas);
            }
            let ticker = frame.ticker;
            rows.extend(frame.rows.into_iter().map(|row| TableRow {
                ticker: ticker.clone(),
                row,
            }));
        }
        Self::new(schema, rows).map(Some)
    }

    /// Sort by (ticker, timestamp). That pair must be unique.
    pub fn new(schema: FeatureSchema, mut rows: Vec<TableRow>) -> Result<Self, TableError> {
        rows.sort_by(|a, b| {
            a.ticker
                .cmp(&b.ticker)
                .then(a.row.timestamp.cmp(&b.row.timestamp))
        });
        if let Some(pair) = rows
            .windows(2)
            .find(|w| w[0].ticker == w[1].ticker && w[0].row.timestamp == w[1].row.timestamp)
        {
            return Err(TableError::DuplicateKey {
                ticker: pair[1].ticker.clone(),
                timestamp: pair[1].row.timestamp.to_string(),
            });
        }
        Ok(Self { schema, rows })
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct tickers, sorted.
    pub fn tickers(&self) -> Vec<String> {
        let mut t: Vec<String> = self.rows.iter().map(|r| r.ticker.clone()).collect();
        t.dedup();
        t
    }

    /// Rows dated strictly before `cutoff`, and the rest.
    pub fn split_at(&self, cutoff: NaiveDate) -> (Vec<&TableRow>, Vec<&TableRow>) {
        self.rows
            .iter()
            .partition(|r| r.row.timestamp.date() < cutoff)
    }

    /// BLAKE3 over tickers, timestamps, feature bits and targets.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.schema.fingerprint.as_bytes());
        for r in &self.rows {
            hasher.update(r.ticker.as_bytes());
            hasher.update(&[0]);
            hasher.update(&r.row.timestamp.and_utc().timestamp_millis().to_le_bytes());
            for v in r.row.values() {
                hasher.update(&v.to_bits().to_le_bytes());
            }
            hasher.update(&[r.row.target.unwrap_or(u8::MAX)]);
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn to_dataframe(&self) -> Result<DataFrame, TableError> {
        let pe = |e: PolarsError| TableError::Parquet(e.to_string());

        let tickers: Vec<&str> = self.rows.iter().map(|r| r.ticker.as_str()).collect();
        let millis: Vec<i64> = self
            .rows
            .iter()
            .map(|r| r.row.timestamp.and_utc().timestamp_millis())
            .collect();
        let targets: Vec<Option<i32>> = self
            .rows
            .iter()
            .map(|r| r.row.target.map(i32::from))
            .collect();

        let mut columns = Vec::with_capacity(FEATURE_COUNT + 3);
        columns.push(
            Column::new("ticker".into(), tickers)
                .cast(&DataType::Categorical(None, CategoricalOrdering::Physical))
                .map_err(pe)?,
        );
        columns.push(
            Column::new("timestamp".into(), millis)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .map_err(pe)?,
        );
        for (k, name) in self.schema.columns.iter().enumerate() {
            let values: Vec<f64> = self.rows.iter().map(|r| r.row.values()[k]).collect();
            columns.push(Column::new(name.as_str().into(), values));
        }
        columns.push(Column::new("target".into(), targets));

        DataFrame::new(columns).map_err(pe)
    }

    /// Write the table and its schema sidecar atomically.
    pub fn write_parquet(&self, path: &Path) -> Result<(), TableError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TableError::Io(e.to_string()))?;
        }
        let mut df = self.to_dataframe()?;

        let tmp = path.with_extension("parquet.tmp");
        let file = fs::File::create(&tmp).map_err(|e| TableError::Io(e.to_string()))?;
        ParquetWriter::new(file)
            .finish(&mut df)
            .map_err(|e| TableError::Parquet(e.to_string()))?;
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            TableError::Io(format!("atomic rename failed: {e}"))
        })?;

        let schema_json = serde_json::to_string_pretty(&self.schema)
            .map_err(|e| TableError::Io(format!("schema serialization: {e}")))?;
        fs::write(schema_path(path), schema_json).map_err(|e| TableError::Io(e.to_string()))?;

        info!(
            path = %path.display(),
            rows = self.len(),
            tickers = self.tickers().len(),
            "training table written"
        );
        Ok(())
    }

    /// Read a persisted table, refusing one built under a different schema.
    pub fn read_parquet(path: &Path, expected: &FeatureSchema) -> Result<Self, TableError> {
        let sidecar = schema_path(path);
        let stored: FeatureSchema = fs::read_to_string(&sidecar)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .ok_or_else(|| TableError::MissingSchema(sidecar.display().to_string()))?;
        if stored.fingerprint != expected.fingerprint {
            return Err(TableError::SchemaDrift {
                expected: expected.fingerprint.clone(),
                found: stored.fingerprint,
            });
        }

        let file = fs::File::open(path).map_err(|e| TableError::Io(e.to_string()))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| TableError::Parquet(e.to_string()))?;
        let rows = dataframe_to_rows(&df, &stored)?;
        Self::new(stored, rows)
    }

    /// Feature matrix and labels for a subset of rows.
    pub fn matrix(rows: &[&TableRow]) -> Result<(FeatureMatrix, Vec<u8>), ModelError> {
        let mut x = FeatureMatrix::with_capacity(FEATURE_COUNT, rows.len());
        let mut y = Vec::with_capacity(rows.len());
        for r in rows {
            x.push_row(&r.row.values())?;
            y.push(r.row.target.unwrap_or(0));
        }
        Ok((x, y))
    }
}

fn schema_path(path: &Path) -> PathBuf {
    path.with_extension("schema.json")
}

fn dataframe_to_rows(df: &DataFrame, schema: &FeatureSchema) -> Result<Vec<TableRow>, TableError> {
    let pe = |e: PolarsError| TableError::Parquet(e.to_string());

    let tickers = df.column("ticker").map_err(pe)?.cast(&DataType::String).map_err(pe)?;
    let tickers = tickers.str().map_err(pe)?;
    let millis = df.column("timestamp").map_err(pe)?.cast(&DataType::Int64).map_err(pe)?;
    let millis = millis.i64().map_err(pe)?;
    let targets = df.column("target").map_err(pe)?.cast(&DataType::Int32).map_err(pe)?;
    let targets = targets.i32().map_err(pe)?;

    let mut features: Vec<Float64Chunked> = Vec::with_capacity(schema.len());
    for name in &schema.columns {
        features.push(df.column(name).map_err(pe)?.f64().map_err(pe)?.clone());
    }

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let ticker = tickers
            .get(i)
            .ok_or_else(|| TableError::Parquet(format!("null ticker at row {i}")))?;
        let ms = millis
            .get(i)
            .ok_or_else(|| TableError::Parquet(format!("null timestamp at row {i}")))?;
        let timestamp = chrono::Utc
            .timestamp_millis_opt(ms)
            .single()
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| TableError::Parquet(format!("invalid timestamp {ms} at row {i}")))?;

        let mut values = [0.0; FEATURE_COUNT];
        for (slot, col) in values.iter_mut().zip(&features) {
            *slot = col.get(i).unwrap_or(0.0);
        }
        let target = targets.get(i).and_then(|t| u8::try_from(t).ok());

        rows.push(TableRow {
            ticker: ticker.to_string(),
            row: FeatureRow::from_values(timestamp, values, target),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use equicast_core::features::FeatureConfig;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 12, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn row(day: u32, seed: f64, target: u8) -> FeatureRow {
        let mut v = [0.0; FEATURE_COUNT];
        for (k, slot) in v.iter_mut().enumerate() {
            *slot = seed + k as f64 * 0.5;
        }
        FeatureRow::from_values(ts(day), v, Some(target))
    }

    fn frame(ticker: &str, days: &[u32]) -> FeatureFrame {
        FeatureFrame {
            ticker: ticker.into(),
            schema: FeatureSchema::from_config(&FeatureConfig::default()),
            rows: days
                .iter()
                .map(|&d| row(d, d as f64, (d % 2) as u8))
                .collect(),
        }
    }

    #[test]
    fn frames_are_sorted_by_ticker_then_time() {
        let table = TrainingTable::from_frames(vec![frame("ZED", &[3, 1]), frame("ABC", &[2, 1])])
            .unwrap()
            .unwrap();
        let keys: Vec<(String, u32)> = table
            .rows()
            .iter()
            .map(|r| (r.ticker.clone(), chrono::Datelike::day(&r.row.timestamp.date())))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("ABC".into(), 1),
                ("ABC".into(), 2),
                ("ZED".into(), 1),
                ("ZED".into(), 3)
            ]
        );
        assert_eq!(table.tickers(), vec!["ABC", "ZED"]);
    }

    #[test]
    fn repeated_ticker_frames_are_rejected() {
        let err = TrainingTable::from_frames(vec![frame("SYN", &[1, 2]), frame("SYN", &[1, 2])])
            .unwrap_err();
        match err {
            TableError::DuplicateKey { ticker, .. } => assert_eq!(ticker, "SYN"),
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
    }

    #[test]
    fn no_frames_is_none() {
        assert!(TrainingTable::from_frames(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn hash_ignores_input_order() {
        let a = TrainingTable::from_frames(vec![frame("A", &[1, 2]), frame("B", &[1])]).unwrap().unwrap();
        let b = TrainingTable::from_frames(vec![frame("B", &[1]), frame("A", &[2, 1])]).unwrap().unwrap();
        assert_eq!(a.content_hash(), b.content_hash());

        let c = TrainingTable::from_frames(vec![frame("A", &[1, 3])]).unwrap().unwrap();
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn split_is_strictly_before_cutoff() {
        let table = TrainingTable::from_frames(vec![frame("A", &[29, 30, 31])]).unwrap().unwrap();
        let (train, test) = table.split_at(NaiveDate::from_ymd_opt(2023, 12, 30).unwrap());
        assert_eq!(train.len(), 1);
        assert_eq!(test.len(), 2);
    }

    #[test]
    fn parquet_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed").join("training.parquet");
        let table = TrainingTable::from_frames(vec![frame("ABC", &[1, 2, 3]), frame("XYZ", &[1])])
            .unwrap()
            .unwrap();
        table.write_parquet(&path).unwrap();
        assert!(path.with_extension("schema.json").exists());

        let back = TrainingTable::read_parquet(&path, &table.schema).unwrap();
        assert_eq!(back.rows(), table.rows());
        assert_eq!(back.content_hash(), table.content_hash());

        let df = table.to_dataframe().unwrap();
        assert!(matches!(df.column("ticker").unwrap().dtype(), DataType::Categorical(..)));
        assert_eq!(df.width(), FEATURE_COUNT + 3);
    }

    #[test]
    fn drifted_schema_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        let table = TrainingTable::from_frames(vec![frame("ABC", &[1])]).unwrap().unwrap();
        table.write_parquet(&path).unwrap();

        let other = FeatureConfig {
            rsi_period: 7,
            ..FeatureConfig::default()
        };
        let err = TrainingTable::read_parquet(&path, &FeatureSchema::from_config(&other)).unwrap_err();
        assert!(matches!(err, TableError::SchemaDrift { .. }));
    }

    #[test]
    fn matrix_matches_rows() {
        let table = TrainingTable::from_frames(vec![frame("A", &[1, 2])]).unwrap().unwrap();
        let refs: Vec<&TableRow> = table.rows().iter().collect();
        let (x, y) = TrainingTable::matrix(&refs).unwrap();
        assert_eq!(x.n_rows(), 2);
        assert_eq!(x.n_cols(), FEATURE_COUNT);
        assert_eq!(y, vec![1, 0]);
        assert_eq!(x.get(1, 0), 2.0);
    }
}
