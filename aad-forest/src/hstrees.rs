//! Half-space trees and random split forests
//!
//! Both families build *full* binary trees of a fixed depth over a
//! randomly perturbed work range, independent of where the training points
//! fall. Only the node masses (sample counts) depend on the data, which is
//! what makes them cheap to refresh from a stream.
//!
//! - [`SplitRule::Midpoint`]: split the chosen dimension of the node box in
//!   half (HS-trees)
//! - [`SplitRule::Random`]: split at a uniform point inside the box
//!   (RS-forest)
//!
//! Every node records the log of its box volume as a fraction of the root
//! box, which the `Rsf` / `RsfLog` region scores use.
//!
//! ## Streaming
//!
//! `add_samples` routes new points through every tree and accumulates their
//! node counts in a stream buffer. `update_model_from_stream_buffer` swaps the
//! buffered counts in as the new masses and clears the buffer.

use std::time::Instant;

use aad_core::{AadError, AadResult, ArrayTree, DetectorType, TreeEnsemble};
use log::{debug, info};
use ndarray::{ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::tree::{check_finite, ArrayTreeBuilder};

/// Deepest tree accepted; a full tree has `2^(depth+1) - 1` nodes
const MAX_FULL_TREE_DEPTH: usize = 20;

/// Where a node box is cut
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitRule {
    /// Box midpoint
    #[default]
    Midpoint,
    /// Uniform point inside the box
    Random,
}

impl SplitRule {
    /// Rule used by a half-space detector family, `None` for other families
    pub fn for_detector(detector_type: DetectorType) -> Option<Self> {
        match detector_type {
            DetectorType::HsTrees => Some(Self::Midpoint),
            DetectorType::RsForest => Some(Self::Random),
            DetectorType::IForest | DetectorType::AtgpIForest => None,
        }
    }
}

/// Configuration for a half-space forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalfSpaceConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Depth of every tree
    pub max_depth: usize,
    /// Split placement
    pub split_rule: SplitRule,
    /// Random seed
    pub seed: u64,
}

impl Default for HalfSpaceConfig {
    fn default() -> Self {
        Self {
            n_estimators: 25,
            max_depth: 10,
            split_rule: SplitRule::Midpoint,
            seed: 42,
        }
    }
}

/// Forest of full-depth half-space trees with a stream buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalfSpaceForest {
    config: HalfSpaceConfig,
    trees: Vec<ArrayTree>,
    /// Pending node counts per tree
    stream_buffer: Vec<Vec<usize>>,
    buffered_rows: usize,
    max_samples: usize,
}

impl HalfSpaceForest {
    /// Unfitted forest
    pub fn new(config: HalfSpaceConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            stream_buffer: Vec::new(),
            buffered_rows: 0,
            max_samples: 0,
        }
    }

    /// Configuration the forest was created with
    pub fn config(&self) -> &HalfSpaceConfig {
        &self.config
    }

    /// Rows waiting in the stream buffer
    pub fn buffered_rows(&self) -> usize {
        self.buffered_rows
    }

    /// Build the trees around the range of `x` and count its rows as masses
    pub fn fit(&mut self, x: ArrayView2<'_, f64>) -> AadResult<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(AadError::InvalidConfig("cannot fit a forest on empty input".into()));
        }
        if self.config.max_depth > MAX_FULL_TREE_DEPTH {
            return Err(AadError::InvalidConfig(format!(
                "max_depth {} exceeds {}",
                self.config.max_depth, MAX_FULL_TREE_DEPTH
            )));
        }
        check_finite(x)?;

        let started = Instant::now();
        let ranges: Vec<(f64, f64)> = x
            .axis_iter(Axis(1))
            .map(|col| {
                col.iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
            })
            .collect();
        // work boxes extend up to two spans past the observed range
        if let Some(col) = ranges.iter().position(|&(lo, hi)| !(3.0 * (hi - lo)).is_finite()) {
            return Err(AadError::InvalidConfig(format!("column {} range is too wide for a work box", col)));
        }

        self.trees = (0..self.config.n_estimators)
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(i as u64));
                let work_box = work_range(&ranges, &mut rng);
                let mut tree = build_full_tree(&work_box, self.config.max_depth, self.config.split_rule, &mut rng);
                tree.n_node_samples = node_masses(&tree, x);
                tree
            })
            .collect();
        self.max_samples = x.nrows();
        self.stream_buffer = self.trees.iter().map(|t| vec![0; t.node_count()]).collect();
        self.buffered_rows = 0;

        debug!(
            "fitted half-space forest: {} trees of depth {} ({:?} splits) in {:?}",
            self.trees.len(),
            self.config.max_depth,
            self.config.split_rule,
            started.elapsed()
        );
        Ok(())
    }

    fn check_input(&self, x: ArrayView2<'_, f64>) -> AadResult<()> {
        if self.trees.is_empty() {
            return Err(AadError::NotFitted("half-space forest has no trees"));
        }
        let n_features = self.n_features();
        if x.ncols() < n_features {
            return Err(AadError::DimensionMismatch { expected: n_features, actual: x.ncols() });
        }
        Ok(())
    }
}

/// Per dimension, a box of half-width `2·max(s - min, max - s)` around a
/// uniform point `s` of the observed range
fn work_range<R: Rng + ?Sized>(ranges: &[(f64, f64)], rng: &mut R) -> Vec<(f64, f64)> {
    ranges
        .iter()
        .map(|&(min, max)| {
            let s = if max > min { rng.gen_range(min..=max) } else { min };
            let mut r = 2.0 * (s - min).max(max - s);
            if r <= 0.0 {
                r = 1.0;
            }
            (s - r, s + r)
        })
        .collect()
}

fn build_full_tree<R: Rng + ?Sized>(
    work_box: &[(f64, f64)],
    max_depth: usize,
    rule: SplitRule,
    rng: &mut R,
) -> ArrayTree {
    let mut builder = ArrayTreeBuilder::new(work_box.len());
    let mut log_frac_vol = Vec::new();
    grow_full(&mut builder, &mut log_frac_vol, work_box.to_vec(), 0.0, 0, max_depth, rule, rng);
    builder.set_log_frac_vol(log_frac_vol);
    builder.finish()
}

#[allow(clippy::too_many_arguments)]
fn grow_full<R: Rng + ?Sized>(
    builder: &mut ArrayTreeBuilder,
    log_frac_vol: &mut Vec<f64>,
    node_box: Vec<(f64, f64)>,
    log_vol: f64,
    depth: usize,
    max_depth: usize,
    rule: SplitRule,
    rng: &mut R,
) -> usize {
    let node = builder.push_leaf(0);
    log_frac_vol.push(log_vol);
    if depth >= max_depth {
        return node;
    }

    let feature = rng.gen_range(0..node_box.len());
    let (lo, hi) = node_box[feature];
    let midpoint = lo + (hi - lo) / 2.0;
    let threshold = match rule {
        // a cut on the lower edge would leave an empty left box
        SplitRule::Random if hi > lo => Some(rng.gen_range(lo..hi)).filter(|&t| t > lo).unwrap_or(midpoint),
        _ => midpoint,
    };
    let width = hi - lo;
    let left_frac = if width > 0.0 { (threshold - lo) / width } else { 0.5 };

    let mut left_box = node_box.clone();
    left_box[feature].1 = threshold;
    let mut right_box = node_box;
    right_box[feature].0 = threshold;

    let left = grow_full(builder, log_frac_vol, left_box, log_vol + left_frac.ln(), depth + 1, max_depth, rule, rng);
    let right = grow_full(
        builder,
        log_frac_vol,
        right_box,
        log_vol + (1.0 - left_frac).ln(),
        depth + 1,
        max_depth,
        rule,
        rng,
    );
    builder.set_split(node, feature, threshold, left, right);
    node
}

/// Count every row on every node of its path, root included
fn node_masses(tree: &ArrayTree, x: ArrayView2<'_, f64>) -> Vec<usize> {
    let mut counts = vec![0; tree.node_count()];
    for row in x.rows() {
        accumulate_path(tree, row, &mut counts);
    }
    counts
}

fn accumulate_path(tree: &ArrayTree, row: ArrayView1<'_, f64>, counts: &mut [usize]) {
    counts[ArrayTree::ROOT] += 1;
    for node in tree.decision_path_full_row(row) {
        counts[node] += 1;
    }
}

impl TreeEnsemble for HalfSpaceForest {
    fn trees(&self) -> &[ArrayTree] {
        &self.trees
    }

    fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Mean over trees of `ln(leaf mass + 1) + depth·ln 2`; lower is more anomalous
    fn decision_function(&self, x: ArrayView2<'_, f64>) -> AadResult<Vec<f64>> {
        self.check_input(x)?;
        let n_trees = self.trees.len() as f64;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.trees
                    .iter()
                    .map(|tree| {
                        let path = tree.decision_path_full_row(row);
                        let leaf = path.last().copied().unwrap_or(ArrayTree::ROOT);
                        (tree.n_node_samples[leaf] as f64 + 1.0).ln() + path.len() as f64 * std::f64::consts::LN_2
                    })
                    .sum::<f64>()
                    / n_trees
            })
            .collect())
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn add_samples(&mut self, x: ArrayView2<'_, f64>) -> AadResult<()> {
        self.check_input(x)?;
        for (tree, buffer) in self.trees.iter().zip(self.stream_buffer.iter_mut()) {
            for row in x.rows() {
                accumulate_path(tree, row, buffer);
            }
        }
        self.buffered_rows += x.nrows();
        Ok(())
    }

    fn update_model_from_stream_buffer(&mut self) -> AadResult<()> {
        if self.trees.is_empty() {
            return Err(AadError::NotFitted("half-space forest has no trees"));
        }
        for (tree, buffer) in self.trees.iter_mut().zip(self.stream_buffer.iter_mut()) {
            let fresh = vec![0; buffer.len()];
            tree.n_node_samples = std::mem::replace(buffer, fresh);
        }
        if self.buffered_rows > 0 {
            self.max_samples = self.buffered_rows;
        }
        info!("half-space forest refreshed from {} buffered rows", self.buffered_rows);
        self.buffered_rows = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn clustered(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, 3), |(i, j)| 0.2 + 0.01 * ((i + j) % 7) as f64)
    }

    fn config(rule: SplitRule) -> HalfSpaceConfig {
        HalfSpaceConfig { n_estimators: 20, max_depth: 6, split_rule: rule, seed: 7 }
    }

    #[test]
    fn test_full_tree_shape_and_volumes() {
        let mut forest = HalfSpaceForest::new(config(SplitRule::Midpoint));
        forest.fit(clustered(100).view()).unwrap();
        let tree = &forest.trees()[0];
        assert_eq!(tree.node_count(), (1 << 7) - 1);
        assert!(tree.validate().is_ok());
        let lfv = tree.log_frac_vol.as_ref().unwrap();
        assert_eq!(lfv[0], 0.0);
        let leaf = tree.apply_row(clustered(1).row(0));
        assert!((lfv[leaf] - 6.0 * 0.5f64.ln()).abs() < 1e-9);
        assert_eq!(tree.n_node_samples[0], 100);
    }

    #[test]
    fn test_fit_rejects_non_finite_or_overwide_columns() {
        let mut x = clustered(30);
        x[[5, 2]] = f64::INFINITY;
        let mut forest = HalfSpaceForest::new(config(SplitRule::Midpoint));
        assert!(matches!(forest.fit(x.view()), Err(AadError::InvalidConfig(_))));

        let mut x = clustered(30);
        x[[0, 0]] = -1e308;
        x[[1, 0]] = 1e308;
        assert!(matches!(forest.fit(x.view()), Err(AadError::InvalidConfig(_))));
        assert!(forest.trees().is_empty());
    }

    #[test]
    fn test_random_split_volumes_sum_to_parent() {
        let mut forest = HalfSpaceForest::new(config(SplitRule::Random));
        forest.fit(clustered(50).view()).unwrap();
        let tree = &forest.trees()[3];
        let lfv = tree.log_frac_vol.as_ref().unwrap();
        let (l, r) = (tree.children_left[0].unwrap(), tree.children_right[0].unwrap());
        assert!((lfv[l].exp() + lfv[r].exp() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_outlier_scores_lower() {
        let mut forest = HalfSpaceForest::new(config(SplitRule::Midpoint));
        let x = clustered(500);
        forest.fit(x.view()).unwrap();
        let probe = ndarray::array![[0.2, 0.21, 0.22], [0.95, 0.95, 0.95]];
        let scores = forest.decision_function(probe.view()).unwrap();
        assert!(scores[1] < scores[0], "{:?}", scores);
    }

    #[test]
    fn test_stream_buffer_swap() {
        let mut forest = HalfSpaceForest::new(config(SplitRule::Midpoint));
        forest.fit(clustered(100).view()).unwrap();
        assert!(forest.supports_streaming());

        forest.add_samples(clustered(30).view()).unwrap();
        assert_eq!(forest.buffered_rows(), 30);
        assert_eq!(forest.trees()[0].n_node_samples[0], 100);

        forest.update_model_from_stream_buffer().unwrap();
        assert_eq!(forest.trees()[0].n_node_samples[0], 30);
        assert_eq!(forest.max_samples(), 30);
        assert_eq!(forest.buffered_rows(), 0);
    }

    #[test]
    fn test_split_rule_for_detector() {
        assert_eq!(SplitRule::for_detector(DetectorType::HsTrees), Some(SplitRule::Midpoint));
        assert_eq!(SplitRule::for_detector(DetectorType::RsForest), Some(SplitRule::Random));
        assert_eq!(SplitRule::for_detector(DetectorType::IForest), None);
    }
}
