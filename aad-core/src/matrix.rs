//! Region feature matrix
//!
//! The feature transform can produce either representation. Both expose the
//! same row-level operations so the loss, the gradient and the feedback loop
//! never branch on storage themselves.

use ndarray::Array2;

use crate::sparse::SparseMatrix;

/// Instance-by-region feature matrix
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureMatrix {
    /// Every cell stored
    Dense(Array2<f64>),
    /// Only path cells stored
    Sparse(SparseMatrix),
}

impl FeatureMatrix {
    /// Number of instances
    pub fn nrows(&self) -> usize {
        match self {
            Self::Dense(m) => m.nrows(),
            Self::Sparse(m) => m.nrows(),
        }
    }

    /// Number of regions
    pub fn ncols(&self) -> usize {
        match self {
            Self::Dense(m) => m.ncols(),
            Self::Sparse(m) => m.ncols(),
        }
    }

    /// True when backed by CSR storage
    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }

    /// Cell value
    pub fn get(&self, i: usize, j: usize) -> f64 {
        match self {
            Self::Dense(m) => m[[i, j]],
            Self::Sparse(m) => m.get(i, j),
        }
    }

    /// Row `i` dotted with `w`
    pub fn row_dot(&self, i: usize, w: &[f64]) -> f64 {
        match self {
            Self::Dense(m) => m.row(i).iter().zip(w).map(|(x, y)| x * y).sum(),
            Self::Sparse(m) => m.row_dot(i, w),
        }
    }

    /// Linear scores `x·w` for every row
    pub fn dot(&self, w: &[f64]) -> Vec<f64> {
        match self {
            Self::Dense(m) => (0..m.nrows()).map(|i| self.row_dot(i, w)).collect(),
            Self::Sparse(m) => m.dot(w),
        }
    }

    /// `out += alpha * row_i`
    pub fn add_scaled_row(&self, i: usize, alpha: f64, out: &mut [f64]) {
        match self {
            Self::Dense(m) => {
                for (o, x) in out.iter_mut().zip(m.row(i).iter()) {
                    *o += alpha * x;
                }
            }
            Self::Sparse(m) => m.add_scaled_row(i, alpha, out),
        }
    }

    /// New matrix of the selected rows, same representation
    pub fn select_rows(&self, rows: &[usize]) -> FeatureMatrix {
        match self {
            Self::Dense(m) => Self::Dense(m.select(ndarray::Axis(0), rows)),
            Self::Sparse(m) => Self::Sparse(m.select_rows(rows)),
        }
    }

    /// Dense copy regardless of representation
    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            Self::Dense(m) => m.clone(),
            Self::Sparse(m) => m.to_dense(),
        }
    }
}

impl From<Array2<f64>> for FeatureMatrix {
    fn from(m: Array2<f64>) -> Self {
        Self::Dense(m)
    }
}

impl From<SparseMatrix> for FeatureMatrix {
    fn from(m: SparseMatrix) -> Self {
        Self::Sparse(m)
    }
}
