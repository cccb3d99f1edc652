//! Isolation Forest
//!
//! Combines isolation trees fitted on random subsamples. Each tree gets its
//! own RNG seeded with `seed + tree_index`, so trees can be grown in any
//! order (or in parallel) and the forest is still reproducible.
//!
//! ## Scoring
//!
//! ```text
//! h(x)  = leaf depth + c(leaf samples)
//! score = 0.5 - 2^(-E[h(x)] / c(max_samples))
//! ```
//!
//! Lower scores are more anomalous, matching the usual decision-function
//! convention.

use std::time::Instant;

use aad_core::math::average_path_length;
use aad_core::{AadError, AadResult, ArrayTree, TreeEnsemble};
use log::debug;
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::tree::{build_isolation_tree, check_finite};

/// Configuration for Isolation Forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub n_estimators: usize,
    /// Subsample size for each tree
    pub max_samples: usize,
    /// Maximum tree depth; `None` uses `ceil(log2(max_samples))`
    pub max_depth: Option<usize>,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            max_depth: None,
            seed: 42,
        }
    }
}

/// Isolation Forest in array-tree form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    config: ForestConfig,
    trees: Vec<ArrayTree>,
    /// Effective subsample size (capped by the training set)
    max_samples: usize,
    /// Leaf depth per node, per tree
    #[serde(skip)]
    depths: Vec<Vec<Option<usize>>>,
}

impl IsolationForest {
    /// Unfitted forest
    pub fn new(config: ForestConfig) -> Self {
        Self { config, trees: Vec::new(), max_samples: 0, depths: Vec::new() }
    }

    /// Configuration the forest was created with
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Train on the rows of `x`
    pub fn fit(&mut self, x: ArrayView2<'_, f64>) -> AadResult<()> {
        let n = x.nrows();
        if n == 0 || x.ncols() == 0 {
            return Err(AadError::InvalidConfig("cannot fit a forest on empty input".into()));
        }
        if self.config.n_estimators == 0 {
            return Err(AadError::InvalidConfig("n_estimators must be positive".into()));
        }
        check_finite(x)?;

        let started = Instant::now();
        let max_samples = self.config.max_samples.clamp(1, n);
        let max_depth = self
            .config
            .max_depth
            .unwrap_or_else(|| (max_samples as f64).log2().ceil().max(1.0) as usize);
        let seed = self.config.seed;

        let grow = |i: usize| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let rows = sample(&mut rng, n, max_samples).into_vec();
            build_isolation_tree(x, &rows, max_depth, &mut rng)
        };

        #[cfg(feature = "parallel")]
        let trees: Vec<ArrayTree> = (0..self.config.n_estimators).into_par_iter().map(grow).collect();
        #[cfg(not(feature = "parallel"))]
        let trees: Vec<ArrayTree> = (0..self.config.n_estimators).map(grow).collect();

        self.max_samples = max_samples;
        self.trees = trees;
        self.refresh_depths();
        debug!(
            "fitted isolation forest: {} trees, {} samples each, in {:?}",
            self.trees.len(),
            max_samples,
            started.elapsed()
        );
        Ok(())
    }

    fn refresh_depths(&mut self) {
        self.depths = self.trees.iter().map(ArrayTree::node_depths).collect();
    }

    /// Adjusted path length of every row, averaged over trees
    pub fn expected_path_length(&self, x: ArrayView2<'_, f64>) -> AadResult<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(AadError::NotFitted("isolation forest has no trees"));
        }
        let n_features = self.n_features();
        if x.ncols() < n_features {
            return Err(AadError::DimensionMismatch { expected: n_features, actual: x.ncols() });
        }

        let computed;
        let depths = if self.depths.len() == self.trees.len() {
            &self.depths
        } else {
            computed = self.trees.iter().map(ArrayTree::node_depths).collect::<Vec<_>>();
            &computed
        };

        let n_trees = self.trees.len() as f64;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.trees
                    .iter()
                    .zip(depths)
                    .map(|(tree, d)| {
                        let leaf = tree.apply_row(row);
                        d[leaf].unwrap_or(0) as f64 + average_path_length(tree.n_node_samples[leaf])
                    })
                    .sum::<f64>()
                    / n_trees
            })
            .collect())
    }
}

impl TreeEnsemble for IsolationForest {
    fn trees(&self) -> &[ArrayTree] {
        &self.trees
    }

    fn max_samples(&self) -> usize {
        self.max_samples
    }

    fn decision_function(&self, x: ArrayView2<'_, f64>) -> AadResult<Vec<f64>> {
        let c = average_path_length(self.max_samples);
        Ok(self
            .expected_path_length(x)?
            .into_iter()
            .map(|h| 0.5 - 2f64.powf(-h / c))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn create_test_data() -> Array2<f64> {
        let mut rows = Vec::new();
        // Normal data cluster
        for i in 0..40 {
            rows.push([20.0 + (i % 8) as f64 * 0.1, 50.0 + (i / 8) as f64 * 0.2]);
        }
        // Anomalies
        rows.push([35.0, 90.0]);
        rows.push([5.0, 20.0]);
        Array2::from_shape_vec((rows.len(), 2), rows.into_iter().flatten().collect()).unwrap()
    }

    fn small_config() -> ForestConfig {
        ForestConfig { n_estimators: 50, max_samples: 32, max_depth: None, seed: 123 }
    }

    #[test]
    fn test_forest_fit() {
        let mut forest = IsolationForest::new(small_config());
        forest.fit(create_test_data().view()).unwrap();
        assert_eq!(forest.trees().len(), 50);
        assert_eq!(forest.max_samples(), 32);
        assert!(forest.trees().iter().all(|t| t.validate().is_ok()));
        assert!(forest.trees().iter().all(|t| t.n_node_samples[0] == 32));
    }

    #[test]
    fn test_fit_rejects_non_finite_values() {
        for bad in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let mut x = create_test_data();
            x[[3, 1]] = bad;
            let mut forest = IsolationForest::new(small_config());
            assert!(matches!(forest.fit(x.view()), Err(AadError::InvalidConfig(_))));
            assert!(forest.trees().is_empty());
        }
    }

    #[test]
    fn test_anomalies_score_lower() {
        let x = create_test_data();
        let mut forest = IsolationForest::new(small_config());
        forest.fit(x.view()).unwrap();
        let scores = forest.decision_function(x.view()).unwrap();
        let worst_normal = scores[..40].iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(scores[40] < worst_normal);
        assert!(scores[41] < worst_normal);
    }

    #[test]
    fn test_reproducible() {
        let x = create_test_data();
        let mut a = IsolationForest::new(small_config());
        let mut b = IsolationForest::new(small_config());
        a.fit(x.view()).unwrap();
        b.fit(x.view()).unwrap();
        assert_eq!(a.trees(), b.trees());
    }

    #[test]
    fn test_unfitted_and_empty() {
        let forest = IsolationForest::new(ForestConfig::default());
        assert!(matches!(
            forest.decision_function(Array2::zeros((1, 2)).view()),
            Err(AadError::NotFitted(_))
        ));
        let mut forest = IsolationForest::new(ForestConfig::default());
        assert!(forest.fit(Array2::zeros((0, 2)).view()).is_err());
    }

    #[test]
    fn test_no_streaming() {
        let mut forest = IsolationForest::new(small_config());
        forest.fit(create_test_data().view()).unwrap();
        assert!(!forest.supports_streaming());
        assert_eq!(forest.update_model_from_stream_buffer(), Err(AadError::StreamingUnsupported));
    }
}
