use polars::prelude::*;

/// Expected on-disk schema for cached bars.
pub struct BarSchema;

impl BarSchema {
    pub const COLUMNS: [&'static str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

    /// Get the canonical bar schema
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("timestamp".into(), DataType::Datetime(TimeUnit::Milliseconds, None)),
            Field::new("open".into(), DataType::Float64),
            Field::new("high".into(), DataType::Float64),
            Field::new("low".into(), DataType::Float64),
            Field::new("close".into(), DataType::Float64),
            Field::new("volume".into(), DataType::Float64),
        ])
    }

    /// Validate DataFrame against schema
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        if df.height() == 0 {
            return Err(SchemaError::Empty);
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("frame has no rows")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(volume: Column) -> DataFrame {
        let timestamp = Column::new("timestamp".into(), &[1672531200000i64])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap();
        DataFrame::new(vec![
            timestamp,
            Column::new("open".into(), &[400.0]),
            Column::new("high".into(), &[405.0]),
            Column::new("low".into(), &[399.0]),
            Column::new("close".into(), &[403.0]),
            volume,
        ])
        .unwrap()
    }

    #[test]
    fn schema_has_all_columns() {
        let schema = BarSchema::schema();
        for name in BarSchema::COLUMNS {
            assert!(schema.contains(name), "missing {name}");
        }
    }

    #[test]
    fn accepts_valid_frame() {
        let df = frame(Column::new("volume".into(), &[1_000_000.0]));
        assert!(BarSchema::validate(&df).is_ok());
    }

    #[test]
    fn rejects_integer_volume() {
        let df = frame(Column::new("volume".into(), &[1_000_000i64]));
        assert!(matches!(
            BarSchema::validate(&df),
            Err(SchemaError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn rejects_missing_column() {
        let df = DataFrame::new(vec![Column::new("open".into(), &[1.0])]).unwrap();
        assert!(matches!(
            BarSchema::validate(&df),
            Err(SchemaError::MissingColumn(_))
        ));
    }
}
