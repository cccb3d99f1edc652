//! Region feature transform
//!
//! Maps raw instances into the region feature space. Column `r` of row `i` is
//! nonzero only when region `r` lies on the decision path of instance `i` in
//! its tree. With leaf-only regions the path is just the leaf; otherwise it is
//! every node visited after the root.
//!
//! Cell value for region `r` on a path of `k` nodes:
//!
//! ```text
//! Const | Hst | Rsf | RsfLog   ->  d[r]
//! everything else             ->  d[r] / k
//! ```
//!
//! ## Batching
//!
//! The sparse form is built `batch_size` rows at a time; each batch is turned
//! into CSR and stacked below the previous ones. The parallel variant computes
//! each tree's cells on the rayon pool and merges them keyed by
//! `(row, region)` before insertion, so the output does not depend on thread
//! scheduling.

use std::collections::BTreeMap;
use std::time::Instant;

use aad_core::constants::PROGRESS_LOG_MIN_ROWS;
use aad_core::{AadError, AadResult, ArrayTree, FeatureMatrix, ScoreType, SparseMatrix, TransformConfig};
use log::debug;
use ndarray::{s, Array2, ArrayView2};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::region::RegionIndex;
use crate::scoring::instance_region_score;

type Cell = (usize, usize, f64);

/// Borrowed view of a fitted detector sufficient to transform instances
#[derive(Debug, Clone, Copy)]
pub struct FeatureTransformer<'a> {
    trees: &'a [ArrayTree],
    index: &'a RegionIndex,
    d: &'a [f64],
    score_type: ScoreType,
    leaf_only: bool,
}

impl<'a> FeatureTransformer<'a> {
    /// Bind the forest, its regions and their scores
    pub fn new(
        trees: &'a [ArrayTree],
        index: &'a RegionIndex,
        d: &'a [f64],
        score_type: ScoreType,
        leaf_only: bool,
    ) -> AadResult<Self> {
        if score_type == ScoreType::OrigTree {
            return Err(AadError::UnsupportedConfig {
                reason: "orig_tree score type cannot be used for region features",
            });
        }
        if d.len() != index.len() {
            return Err(AadError::DimensionMismatch { expected: index.len(), actual: d.len() });
        }
        Ok(Self { trees, index, d, score_type, leaf_only })
    }

    /// Number of output columns
    pub fn n_regions(&self) -> usize {
        self.d.len()
    }

    /// Transform with the representation and batching chosen by `config`
    pub fn transform(&self, x: ArrayView2<'_, f64>, config: &TransformConfig) -> AadResult<FeatureMatrix> {
        if config.dense {
            return self.to_dense(x).map(FeatureMatrix::Dense);
        }
        let sparse = if config.parallel {
            self.to_sparse_parallel(x, config.batch_size)?
        } else {
            self.to_sparse(x, config.batch_size)?
        };
        Ok(FeatureMatrix::Sparse(sparse))
    }

    /// Dense `n x regions` matrix
    pub fn to_dense(&self, x: ArrayView2<'_, f64>) -> AadResult<Array2<f64>> {
        self.check_input(x)?;
        let mut out = Array2::zeros((x.nrows(), self.n_regions()));
        for tree in 0..self.trees.len() {
            for (row, col, v) in self.tree_cells(tree, x)? {
                out[[row, col]] = v;
            }
        }
        Ok(out)
    }

    /// CSR matrix built in row batches
    pub fn to_sparse(&self, x: ArrayView2<'_, f64>, batch_size: usize) -> AadResult<SparseMatrix> {
        self.batched(x, batch_size, |batch| {
            let mut cells = BTreeMap::new();
            for tree in 0..self.trees.len() {
                for (row, col, v) in self.tree_cells(tree, batch)? {
                    cells.insert((row, col), v);
                }
            }
            Ok(cells)
        })
    }

    /// CSR matrix with per-tree work on the thread pool
    #[cfg(feature = "parallel")]
    pub fn to_sparse_parallel(&self, x: ArrayView2<'_, f64>, batch_size: usize) -> AadResult<SparseMatrix> {
        self.batched(x, batch_size, |batch| {
            let per_tree: Vec<AadResult<Vec<Cell>>> = (0..self.trees.len())
                .into_par_iter()
                .map(|tree| self.tree_cells(tree, batch))
                .collect();
            let mut cells = BTreeMap::new();
            for result in per_tree {
                for (row, col, v) in result? {
                    cells.insert((row, col), v);
                }
            }
            Ok(cells)
        })
    }

    /// CSR matrix with per-tree work on the thread pool
    #[cfg(not(feature = "parallel"))]
    pub fn to_sparse_parallel(&self, x: ArrayView2<'_, f64>, batch_size: usize) -> AadResult<SparseMatrix> {
        self.to_sparse(x, batch_size)
    }

    fn batched<F>(&self, x: ArrayView2<'_, f64>, batch_size: usize, mut cells_of: F) -> AadResult<SparseMatrix>
    where
        F: FnMut(ArrayView2<'_, f64>) -> AadResult<BTreeMap<(usize, usize), f64>>,
    {
        self.check_input(x)?;
        if batch_size == 0 {
            return Err(AadError::InvalidConfig("transform batch_size must be positive".into()));
        }

        let n = x.nrows();
        let m = self.n_regions();
        let mut out = SparseMatrix::empty(m);
        let mut start = 0;
        while start < n {
            let end = (start + batch_size).min(n);
            let started = Instant::now();
            let batch = x.slice(s![start..end, ..]);
            let cells = cells_of(batch)?;
            out.vstack(&SparseMatrix::from_sorted_cells(end - start, m, cells))?;
            if n >= PROGRESS_LOG_MIN_ROWS {
                debug!(
                    "processed {}/{} ({:.3}); batch {} in {:?}",
                    end,
                    n,
                    end as f64 / n as f64,
                    batch_size,
                    started.elapsed()
                );
            }
            start = end;
        }
        Ok(out)
    }

    /// `(row, region, value)` cells contributed by one tree
    fn tree_cells(&self, tree: usize, x: ArrayView2<'_, f64>) -> AadResult<Vec<Cell>> {
        let t = &self.trees[tree];
        let paths = if self.leaf_only {
            t.decision_path_leaf(x)
        } else {
            t.decision_path_full(x)
        };

        let mut cells = Vec::with_capacity(paths.iter().map(Vec::len).sum());
        for (row, path) in paths.iter().enumerate() {
            let k = path.len();
            for &node in path {
                // Nodes without a region contribute nothing
                if let Some(r) = self.index.region_id(tree, node) {
                    cells.push((row, r, instance_region_score(self.d[r], self.score_type, k)?));
                }
            }
        }
        Ok(cells)
    }

    fn check_input(&self, x: ArrayView2<'_, f64>) -> AadResult<()> {
        let required = self.trees.iter().map(|t| t.n_features).max().unwrap_or(0);
        if x.ncols() < required {
            return Err(AadError::DimensionMismatch { expected: required, actual: x.ncols() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::region_scores;
    use aad_core::math::average_path_length;
    use ndarray::array;

    fn setup(leaf_only: bool, score_type: ScoreType) -> (Vec<ArrayTree>, RegionIndex, Vec<f64>) {
        let trees = vec![
            ArrayTree::stump(2, 0, 0.5, 30, 2),
            ArrayTree {
                n_features: 2,
                children_left: vec![Some(1), Some(3), None, None, None],
                children_right: vec![Some(2), Some(4), None, None, None],
                feature: vec![1, 0, 0, 0, 0],
                threshold: vec![0.4, 0.2, 0.0, 0.0, 0.0],
                n_node_samples: vec![32, 20, 12, 5, 15],
                log_frac_vol: None,
            },
        ];
        let index = RegionIndex::build(&trees, leaf_only);
        let d = region_scores(index.regions(), score_type, 32).unwrap().d;
        (trees, index, d)
    }

    #[test]
    fn test_leaf_only_one_cell_per_tree() {
        let (trees, index, d) = setup(true, ScoreType::LeafInvSample);
        let tf = FeatureTransformer::new(&trees, &index, &d, ScoreType::LeafInvSample, true).unwrap();
        let x = array![[0.1, 0.1], [0.9, 0.9]];
        let m = tf.to_sparse(x.view(), 10_000).unwrap();
        assert_eq!(m.nnz(), 4);
        assert!((m.get(0, 0) - 1.0 / (1.0 + average_path_length(30))).abs() < 1e-12);
    }

    #[test]
    fn test_full_path_normalized_by_length() {
        let (trees, index, d) = setup(false, ScoreType::InvPathLen);
        let tf = FeatureTransformer::new(&trees, &index, &d, ScoreType::InvPathLen, false).unwrap();
        let x = array![[0.1, 0.1]];
        let dense = tf.to_dense(x.view()).unwrap();
        // tree 1 path: node 1 (depth 1), node 3 (depth 2), k = 2
        let r1 = index.region_id(1, 1).unwrap();
        let r3 = index.region_id(1, 3).unwrap();
        assert!((dense[[0, r1]] - 1.0 / 2.0).abs() < 1e-12);
        assert!((dense[[0, r3]] - 0.5 / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_unnormalized_types_keep_d() {
        let (trees, index, d) = setup(false, ScoreType::Hst);
        let tf = FeatureTransformer::new(&trees, &index, &d, ScoreType::Hst, false).unwrap();
        let dense = tf.to_dense(array![[0.1, 0.1]].view()).unwrap();
        let r3 = index.region_id(1, 3).unwrap();
        assert_eq!(dense[[0, r3]], d[r3]);
    }

    #[test]
    fn test_dense_sparse_and_batches_agree() {
        let (trees, index, d) = setup(false, ScoreType::LeafInvSample);
        let tf = FeatureTransformer::new(&trees, &index, &d, ScoreType::LeafInvSample, false).unwrap();
        let x = Array2::from_shape_fn((23, 2), |(i, j)| ((i * 7 + j * 3) % 10) as f64 / 10.0);
        let dense = tf.to_dense(x.view()).unwrap();
        assert_eq!(tf.to_sparse(x.view(), 10_000).unwrap().to_dense(), dense);
        assert_eq!(tf.to_sparse(x.view(), 4).unwrap().to_dense(), dense);
        assert_eq!(tf.to_sparse_parallel(x.view(), 5).unwrap().to_dense(), dense);
    }

    #[test]
    fn test_rejects_narrow_input_and_orig_tree() {
        let (trees, index, d) = setup(true, ScoreType::Const);
        let tf = FeatureTransformer::new(&trees, &index, &d, ScoreType::Const, true).unwrap();
        let err = tf.to_dense(array![[0.1]].view()).unwrap_err();
        assert_eq!(err, AadError::DimensionMismatch { expected: 2, actual: 1 });
        assert!(FeatureTransformer::new(&trees, &index, &d, ScoreType::OrigTree, true).is_err());
    }

    #[test]
    fn test_empty_input() {
        let (trees, index, d) = setup(true, ScoreType::Const);
        let tf = FeatureTransformer::new(&trees, &index, &d, ScoreType::Const, true).unwrap();
        let m = tf.to_sparse(Array2::<f64>::zeros((0, 2)).view(), 10).unwrap();
        assert_eq!(m.nrows(), 0);
        assert_eq!(m.ncols(), index.len());
    }
}
