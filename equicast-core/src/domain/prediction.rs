//! Prediction record emitted once per (ticker, target date).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Predicted direction for the next period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Movement {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN/FLAT")]
    DownOrFlat,
}

impl Movement {
    pub fn from_class(class: u8) -> Self {
        if class == 1 {
            Movement::Up
        } else {
            Movement::DownOrFlat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Movement::Up => "UP",
            Movement::DownOrFlat => "DOWN/FLAT",
        }
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub ticker: String,
    pub prediction_for_date: NaiveDate,
    pub predicted_movement: Movement,
    pub predicted_class: u8,
    pub probability_up: f64,
    pub source_date: NaiveDate,
}

impl PredictionRecord {
    /// Build a record from the classifier's probability of class 1.
    ///
    /// Class 1 is assigned iff the probability is strictly above one half.
    pub fn from_probability(
        ticker: impl Into<String>,
        source_date: NaiveDate,
        prediction_for_date: NaiveDate,
        probability_up: f64,
    ) -> Self {
        let predicted_class = u8::from(probability_up > 0.5);
        Self {
            ticker: ticker.into(),
            prediction_for_date,
            predicted_movement: Movement::from_class(predicted_class),
            predicted_class,
            probability_up,
            source_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn class_follows_probability() {
        let up = PredictionRecord::from_probability("ABC", day(1), day(2), 0.73);
        assert_eq!(up.predicted_class, 1);
        assert_eq!(up.predicted_movement, Movement::Up);

        let flat = PredictionRecord::from_probability("ABC", day(1), day(2), 0.5);
        assert_eq!(flat.predicted_class, 0);
        assert_eq!(flat.predicted_movement, Movement::DownOrFlat);
    }

    #[test]
    fn movement_serializes_with_labels() {
        assert_eq!(serde_json::to_string(&Movement::Up).unwrap(), "\"UP\"");
        assert_eq!(
            serde_json::to_string(&Movement::DownOrFlat).unwrap(),
            "\"DOWN/FLAT\""
        );
    }
}
