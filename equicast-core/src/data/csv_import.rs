//! Local CSV directory provider.
//!
//! Reads `{dir}/{SYMBOL}.csv`, where `SYMBOL` includes the exchange suffix
//! (e.g. `TATAMOTORS.NS.csv`). The first column is the timestamp; every other
//! column is passed through with its header as the label, so normalization
//! treats CSV exports and API responses the same way.

use super::provider::{
    ColumnLabel, DataError, DataProvider, DataSource, FetchWindow, ProviderFrame, RawValue,
};
use chrono::{NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S%z",
];

pub struct CsvDirProvider {
    dir: PathBuf,
}

impl CsvDirProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }
}

/// Parse a timestamp cell: plain dates become midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = chrono::DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_utc());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    None
}

fn in_window(ts: NaiveDateTime, window: &FetchWindow) -> bool {
    match window {
        FetchWindow::Range { start, end } => {
            let d = ts.date();
            d >= *start && d <= *end
        }
        // A relative period has no anchor in a static file; keep everything.
        FetchWindow::Period { .. } => true,
    }
}

impl DataProvider for CsvDirProvider {
    fn name(&self) -> &str {
        "csv_dir"
    }

    fn source(&self) -> DataSource {
        DataSource::CsvImport
    }

    fn fetch(&self, symbol: &str, window: &FetchWindow) -> Result<ProviderFrame, DataError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(|e| DataError::CsvError(format!("{}: {e}", path.display())))?;

        let headers = reader
            .headers()
            .map_err(|e| DataError::CsvError(format!("{}: headers: {e}", path.display())))?
            .clone();
        if headers.len() < 2 {
            return Err(DataError::CsvError(format!(
                "{}: expected a timestamp column and at least one value column",
                path.display()
            )));
        }

        let width = headers.len() - 1;
        let mut index = Vec::new();
        let mut cells: Vec<Vec<RawValue>> = vec![Vec::new(); width];

        for (line, record) in reader.records().enumerate() {
            let record = record
                .map_err(|e| DataError::CsvError(format!("{}: row {line}: {e}", path.display())))?;
            let Some(ts) = record.get(0).and_then(parse_timestamp) else {
                return Err(DataError::CsvError(format!(
                    "{}: row {line}: unparseable timestamp {:?}",
                    path.display(),
                    record.get(0).unwrap_or_default()
                )));
            };
            if !in_window(ts, window) {
                continue;
            }
            index.push(ts);
            for (k, column) in cells.iter_mut().enumerate() {
                let value = match record.get(k + 1) {
                    Some(s) if !s.trim().is_empty() => RawValue::Text(s.to_string()),
                    _ => RawValue::Missing,
                };
                column.push(value);
            }
        }

        let mut frame = ProviderFrame {
            index,
            columns: Vec::with_capacity(width),
        };
        for (label, values) in headers.iter().skip(1).zip(cells) {
            frame.push_column(ColumnLabel::Flat(label.to_string()), values);
        }
        Ok(frame)
    }
}
