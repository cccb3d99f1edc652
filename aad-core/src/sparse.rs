//! Compressed sparse row matrix
//!
//! Region features are extremely sparse: a row has at most one nonzero per
//! tree in leaf-only mode and at most the tree depth otherwise, while the
//! column count is the total number of regions across the forest. CSR keeps
//! row access contiguous, which is all the loss and gradient code needs.

use std::collections::BTreeMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::errors::{AadError, AadResult};

/// Row-major sparse matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    nrows: usize,
    ncols: usize,
    /// Offsets into `indices`/`data`, length `nrows + 1`
    indptr: Vec<usize>,
    /// Column of each stored value, ascending within a row
    indices: Vec<usize>,
    /// Stored values
    data: Vec<f64>,
}

impl SparseMatrix {
    /// Empty matrix with zero rows
    pub fn empty(ncols: usize) -> Self {
        Self {
            nrows: 0,
            ncols,
            indptr: vec![0],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Build from `(row, col, value)` triplets.
    ///
    /// A repeated `(row, col)` keeps the last value written, matching
    /// assignment semantics. Explicit zeros are stored.
    pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> AadResult<Self>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let mut cells: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for (r, c, v) in triplets {
            if r >= nrows {
                return Err(AadError::DimensionMismatch { expected: nrows, actual: r + 1 });
            }
            if c >= ncols {
                return Err(AadError::DimensionMismatch { expected: ncols, actual: c + 1 });
            }
            cells.insert((r, c), v);
        }
        Ok(Self::from_sorted_cells(nrows, ncols, cells))
    }

    /// Build from cells already keyed and ordered by `(row, col)`
    pub fn from_sorted_cells(nrows: usize, ncols: usize, cells: BTreeMap<(usize, usize), f64>) -> Self {
        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::with_capacity(cells.len());
        let mut data = Vec::with_capacity(cells.len());

        indptr.push(0);
        let mut row = 0;
        for ((r, c), v) in cells {
            while row < r {
                indptr.push(indices.len());
                row += 1;
            }
            indices.push(c);
            data.push(v);
        }
        while row < nrows {
            indptr.push(indices.len());
            row += 1;
        }

        Self { nrows, ncols, indptr, indices, data }
    }

    /// Copy the nonzero cells of a dense matrix
    pub fn from_dense(dense: &Array2<f64>) -> Self {
        let (nrows, ncols) = dense.dim();
        let mut cells = BTreeMap::new();
        for ((r, c), &v) in dense.indexed_iter() {
            if v != 0.0 {
                cells.insert((r, c), v);
            }
        }
        Self::from_sorted_cells(nrows, ncols, cells)
    }

    /// Number of rows
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored values
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Stored `(col, value)` pairs of one row
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (start, end) = (self.indptr[i], self.indptr[i + 1]);
        self.indices[start..end]
            .iter()
            .copied()
            .zip(self.data[start..end].iter().copied())
    }

    /// Value at `(i, j)`, zero when not stored
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (start, end) = (self.indptr[i], self.indptr[i + 1]);
        match self.indices[start..end].binary_search(&j) {
            Ok(pos) => self.data[start + pos],
            Err(_) => 0.0,
        }
    }

    /// Append the rows of `other` below this matrix
    pub fn vstack(&mut self, other: &SparseMatrix) -> AadResult<()> {
        if other.ncols != self.ncols {
            return Err(AadError::DimensionMismatch { expected: self.ncols, actual: other.ncols });
        }
        let offset = self.indices.len();
        self.indices.extend_from_slice(&other.indices);
        self.data.extend_from_slice(&other.data);
        self.indptr.extend(other.indptr[1..].iter().map(|p| p + offset));
        self.nrows += other.nrows;
        Ok(())
    }

    /// New matrix made of the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> SparseMatrix {
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for &r in rows {
            let (start, end) = (self.indptr[r], self.indptr[r + 1]);
            indices.extend_from_slice(&self.indices[start..end]);
            data.extend_from_slice(&self.data[start..end]);
            indptr.push(indices.len());
        }
        SparseMatrix {
            nrows: rows.len(),
            ncols: self.ncols,
            indptr,
            indices,
            data,
        }
    }

    /// Row `i` dotted with `w`
    pub fn row_dot(&self, i: usize, w: &[f64]) -> f64 {
        self.row(i).map(|(c, v)| v * w[c]).sum()
    }

    /// Matrix-vector product
    pub fn dot(&self, w: &[f64]) -> Vec<f64> {
        (0..self.nrows).map(|i| self.row_dot(i, w)).collect()
    }

    /// `out += alpha * row_i`
    pub fn add_scaled_row(&self, i: usize, alpha: f64, out: &mut [f64]) {
        for (c, v) in self.row(i) {
            out[c] += alpha * v;
        }
    }

    /// Dense copy
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.nrows, self.ncols));
        for i in 0..self.nrows {
            for (c, v) in self.row(i) {
                dense[[i, c]] = v;
            }
        }
        dense
    }
}
