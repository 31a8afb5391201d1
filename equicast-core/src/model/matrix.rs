//! Dense row-major feature matrix.

use super::ModelError;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f64>,
    n_rows: usize,
    n_cols: usize,
}

impl FeatureMatrix {
    pub fn new(n_cols: usize) -> Self {
        Self {
            data: Vec::new(),
            n_rows: 0,
            n_cols,
        }
    }

    pub fn with_capacity(n_cols: usize, rows: usize) -> Self {
        Self {
            data: Vec::with_capacity(n_cols * rows),
            n_rows: 0,
            n_cols,
        }
    }

    /// Build from rows of equal width.
    pub fn from_rows<R: AsRef<[f64]>>(n_cols: usize, rows: &[R]) -> Result<Self, ModelError> {
        let mut m = Self::with_capacity(n_cols, rows.len());
        for r in rows {
            m.push_row(r.as_ref())?;
        }
        Ok(m)
    }

    pub fn push_row(&mut self, row: &[f64]) -> Result<(), ModelError> {
        if row.len() != self.n_cols {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.n_cols,
                found: row.len(),
            });
        }
        if let Some(col) = row.iter().position(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteInput {
                row: self.n_rows,
                col,
            });
        }
        self.data.extend_from_slice(row);
        self.n_rows += 1;
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n_cols + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.n_cols..(row + 1) * self.n_cols]
    }
}
