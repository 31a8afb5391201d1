//! Dated prediction file with duplicate detection.
//!
//! One CSV per target date: `{dir}/daily_predictions_{YYYY-MM-DD}.csv`.
//! The file holds at most one record per ticker. Saves are atomic.

use chrono::NaiveDate;
use equicast_core::domain::PredictionRecord;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("ledger CSV error at {path}: {reason}")]
    Csv { path: String, reason: String },

    #[error("record for {ticker} targets {found}, ledger is for {expected}")]
    WrongDate {
        ticker: String,
        expected: NaiveDate,
        found: NaiveDate,
    },
}

/// What to do when a ticker already has a record for the date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep the existing record; do not recompute.
    #[default]
    Skip,
    /// Replace the existing record.
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerWrite {
    Inserted,
    Replaced,
    Kept,
}

#[derive(Debug)]
pub struct PredictionLedger {
    path: PathBuf,
    date: NaiveDate,
    records: Vec<PredictionRecord>,
}

pub fn ledger_file_name(date: NaiveDate) -> String {
    format!("daily_predictions_{}.csv", date.format("%Y-%m-%d"))
}

impl PredictionLedger {
    /// Open the ledger for `date`, reading existing records if the file exists.
    pub fn open(dir: &Path, date: NaiveDate) -> Result<Self, LedgerError> {
        let path = dir.join(ledger_file_name(date));
        let records = if path.exists() {
            read_records(&path)?
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), existing = records.len(), "ledger opened");
        Ok(Self {
            path,
            date,
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    pub fn get(&self, ticker: &str) -> Option<&PredictionRecord> {
        self.records.iter().find(|r| r.ticker == ticker)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.get(ticker).is_some()
    }

    /// Insert a record, resolving an existing one per `policy`.
    pub fn upsert(
        &mut self,
        record: PredictionRecord,
        policy: DuplicatePolicy,
    ) -> Result<LedgerWrite, LedgerError> {
        if record.prediction_for_date != self.date {
            return Err(LedgerError::WrongDate {
                ticker: record.ticker,
                expected: self.date,
                found: record.prediction_for_date,
            });
        }
        match self.records.iter().position(|r| r.ticker == record.ticker) {
            None => {
                self.records.push(record);
                Ok(LedgerWrite::Inserted)
            }
            Some(_) if policy == DuplicatePolicy::Skip => Ok(LedgerWrite::Kept),
            Some(i) => {
                self.records[i] = record;
                Ok(LedgerWrite::Replaced)
            }
        }
    }

    /// Write all records sorted by ticker. Write to .tmp then rename.
    pub fn save(&mut self) -> Result<(), LedgerError> {
        let io_err = |p: &Path, e: &dyn std::fmt::Display| LedgerError::Io {
            path: p.display().to_string(),
            reason: e.to_string(),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, &e))?;
        }

        self.records.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        let tmp = self.path.with_extension("csv.tmp");
        {
            let csv_err = |e: csv::Error| LedgerError::Csv {
                path: tmp.display().to_string(),
                reason: e.to_string(),
            };
            let mut writer = csv::Writer::from_path(&tmp).map_err(csv_err)?;
            for r in &self.records {
                writer.serialize(r).map_err(csv_err)?;
            }
            writer.flush().map_err(|e| io_err(&tmp, &e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            io_err(&self.path, &e)
        })?;

        info!(path = %self.path.display(), records = self.records.len(), "predictions saved");
        Ok(())
    }
}

fn read_records(path: &Path) -> Result<Vec<PredictionRecord>, LedgerError> {
    let csv_err = |e: csv::Error| LedgerError::Csv {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let mut records: Vec<PredictionRecord> = Vec::new();
    for row in reader.deserialize() {
        let record: PredictionRecord = row.map_err(csv_err)?;
        // a hand-edited file may repeat a ticker; the last row wins
        match records.iter().position(|r| r.ticker == record.ticker) {
            Some(i) => records[i] = record,
            None => records.push(record),
        }
    }
    Ok(records)
}
