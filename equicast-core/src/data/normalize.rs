//! Column normalization: provider frame in, clean-schema raw bars out.
//!
//! Rules:
//! - labels are lower-cased, `_` treated as a space, whitespace collapsed
//! - qualified (field, ticker) labels keep only the field
//! - `adj close` is recognised and dropped
//! - the five OHLCV fields must all be present, otherwise `MissingColumns`
//! - values are coerced to numbers; unparseable cells become `NaN`
//! - rows are sorted by timestamp, duplicates keep the first occurrence
//! - rows where every field is missing are dropped

use super::provider::{DataError, ProviderFrame};
use crate::domain::RawBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldRole {
    Open,
    High,
    Low,
    Close,
    Volume,
    AdjClose,
}

const REQUIRED: [(FieldRole, &str); 5] = [
    (FieldRole::Open, "open"),
    (FieldRole::High, "high"),
    (FieldRole::Low, "low"),
    (FieldRole::Close, "close"),
    (FieldRole::Volume, "volume"),
];

/// Canonical form of a column name: lower-case, single spaces.
pub fn canonical_name(raw: &str) -> String {
    raw.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn classify(name: &str) -> Option<FieldRole> {
    match name {
        "open" => Some(FieldRole::Open),
        "high" => Some(FieldRole::High),
        "low" => Some(FieldRole::Low),
        "close" => Some(FieldRole::Close),
        "volume" => Some(FieldRole::Volume),
        "adj close" | "adjclose" | "adjusted close" => Some(FieldRole::AdjClose),
        _ => None,
    }
}

/// Normalize a provider frame into raw bars.
pub fn normalize_frame(symbol: &str, frame: ProviderFrame) -> Result<Vec<RawBar>, DataError> {
    if frame.is_empty() {
        return Err(DataError::EmptyResponse {
            symbol: symbol.to_string(),
        });
    }

    let n = frame.index.len();
    let mut slots: [Option<Vec<f64>>; 5] = Default::default();

    for column in &frame.columns {
        let Some(role) = classify(&canonical_name(column.label.field())) else {
            continue;
        };
        let slot = match role {
            FieldRole::Open => 0,
            FieldRole::High => 1,
            FieldRole::Low => 2,
            FieldRole::Close => 3,
            FieldRole::Volume => 4,
            FieldRole::AdjClose => continue,
        };
        if slots[slot].is_some() {
            continue; // first matching column wins
        }
        if column.values.len() != n {
            return Err(DataError::ResponseFormatChanged(format!(
                "{symbol}: column '{}' has {} values for {n} timestamps",
                column.label.field(),
                column.values.len()
            )));
        }
        slots[slot] = Some(column.values.iter().map(|v| v.coerce()).collect());
    }

    let missing: Vec<String> = REQUIRED
        .iter()
        .zip(slots.iter())
        .filter(|(_, slot)| slot.is_none())
        .map(|((_, name), _)| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(DataError::MissingColumns {
            symbol: symbol.to_string(),
            missing,
        });
    }

    let [open, high, low, close, volume] = slots.map(Option::unwrap_or_default);

    let mut bars: Vec<RawBar> = (0..n)
        .map(|i| RawBar {
            timestamp: frame.index[i],
            open: open[i],
            high: high[i],
            low: low[i],
            close: close[i],
            volume: volume[i],
        })
        .filter(|b| !b.is_void())
        .collect();

    // Stable sort keeps the first of equal timestamps ahead of later ones.
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);

    if bars.is_empty() {
        return Err(DataError::EmptyResponse {
            symbol: symbol.to_string(),
        });
    }

    Ok(bars)
}
