//! Array-form decision trees
//!
//! Every ensemble the detector works with is exposed as a list of trees in the
//! parallel-array layout used by most tree libraries: node `i` has optional
//! left/right children, a split feature, a threshold and a training sample
//! count. Node 0 is the root.
//!
//! ## Routing
//!
//! An instance goes left when `x[feature] <= threshold`, right otherwise. This
//! matches the closed region boxes built during extraction: the left child box
//! is `[lo, threshold]`, the right child box is `[threshold, hi]`.
//!
//! ## Malformed Trees
//!
//! Trees produced by external code may contain a node with only one child.
//! Routing then follows whichever child exists. Every traversal is bounded by
//! the node count, so a cycle in the child pointers ends the walk instead of
//! hanging it.

use log::warn;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::errors::{AadError, AadResult};
use crate::traits::TreeEnsemble;

/// Fitted tree in parallel-array layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayTree {
    /// Number of input features the tree was fitted on
    pub n_features: usize,
    /// Left child per node
    pub children_left: Vec<Option<usize>>,
    /// Right child per node
    pub children_right: Vec<Option<usize>>,
    /// Split feature per node (ignored for leaves)
    pub feature: Vec<usize>,
    /// Split threshold per node (ignored for leaves)
    pub threshold: Vec<f64>,
    /// Training samples reaching each node
    pub n_node_samples: Vec<usize>,
    /// Accumulated log fraction of the root volume, when the ensemble tracks it
    pub log_frac_vol: Option<Vec<f64>>,
}

impl ArrayTree {
    /// Root node id
    pub const ROOT: usize = 0;

    /// Single-leaf tree holding `n_samples`
    pub fn leaf(n_features: usize, n_samples: usize) -> Self {
        Self {
            n_features,
            children_left: vec![None],
            children_right: vec![None],
            feature: vec![0],
            threshold: vec![0.0],
            n_node_samples: vec![n_samples],
            log_frac_vol: None,
        }
    }

    /// One split on `feature` at `threshold` with two leaves (ids 1 and 2)
    pub fn stump(
        n_features: usize,
        feature: usize,
        threshold: f64,
        left_samples: usize,
        right_samples: usize,
    ) -> Self {
        Self {
            n_features,
            children_left: vec![Some(1), None, None],
            children_right: vec![Some(2), None, None],
            feature: vec![feature, 0, 0],
            threshold: vec![threshold, 0.0, 0.0],
            n_node_samples: vec![left_samples + right_samples, left_samples, right_samples],
            log_frac_vol: None,
        }
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.children_left.len()
    }

    /// Both children absent
    pub fn is_leaf(&self, node: usize) -> bool {
        self.children_left[node].is_none() && self.children_right[node].is_none()
    }

    /// Exactly one child present
    pub fn is_dubious(&self, node: usize) -> bool {
        self.children_left[node].is_some() != self.children_right[node].is_some()
    }

    /// Log fractional volume of a node, 0 when not tracked
    pub fn node_log_frac_vol(&self, node: usize) -> f64 {
        self.log_frac_vol
            .as_ref()
            .and_then(|v| v.get(node).copied())
            .unwrap_or(0.0)
    }

    /// Check that the parallel arrays agree in length and children are in range
    pub fn validate(&self) -> AadResult<()> {
        let n = self.node_count();
        let lens = [
            self.children_right.len(),
            self.feature.len(),
            self.threshold.len(),
            self.n_node_samples.len(),
        ];
        if let Some(&bad) = lens.iter().find(|&&l| l != n) {
            return Err(AadError::DimensionMismatch { expected: n, actual: bad });
        }
        if let Some(v) = &self.log_frac_vol {
            if v.len() != n {
                return Err(AadError::DimensionMismatch { expected: n, actual: v.len() });
            }
        }
        let out_of_range = self
            .children_left
            .iter()
            .chain(self.children_right.iter())
            .flatten()
            .find(|&&c| c >= n);
        if let Some(&c) = out_of_range {
            return Err(AadError::DimensionMismatch { expected: n, actual: c + 1 });
        }
        self.check_acyclic()
    }

    /// Every node reachable from the root must be reached exactly once
    fn check_acyclic(&self) -> AadResult<()> {
        if self.node_count() == 0 {
            return Ok(());
        }
        let mut seen = vec![false; self.node_count()];
        let mut stack = vec![0];
        while let Some(node) = stack.pop() {
            if seen[node] {
                return Err(AadError::InvalidConfig(format!("tree node {} is reached twice", node)));
            }
            seen[node] = true;
            stack.extend(self.children_right[node]);
            stack.extend(self.children_left[node]);
        }
        Ok(())
    }

    /// Child taken by `x` at an internal node, `None` at a leaf
    pub fn next_node(&self, node: usize, x: ArrayView1<'_, f64>) -> Option<usize> {
        let left = self.children_left[node];
        let right = self.children_right[node];
        if left.is_none() && right.is_none() {
            return None;
        }
        let go_left = x
            .get(self.feature[node])
            .map(|&v| v <= self.threshold[node])
            .unwrap_or(true);
        if go_left {
            left.or(right)
        } else {
            right.or(left)
        }
    }

    /// Nodes visited after the root, ending at the leaf
    pub fn decision_path_full_row(&self, x: ArrayView1<'_, f64>) -> Vec<usize> {
        let mut path = Vec::new();
        let mut node = Self::ROOT;
        for _ in 0..self.node_count() {
            match self.next_node(node, x) {
                Some(next) => {
                    path.push(next);
                    node = next;
                }
                None => return path,
            }
        }
        warn!("no leaf reached within {} steps, child links form a cycle", self.node_count());
        path
    }

    /// Leaf reached by `x`
    pub fn apply_row(&self, x: ArrayView1<'_, f64>) -> usize {
        let mut node = Self::ROOT;
        for _ in 0..self.node_count() {
            match self.next_node(node, x) {
                Some(next) => node = next,
                None => return node,
            }
        }
        warn!("no leaf reached within {} steps, child links form a cycle", self.node_count());
        node
    }

    /// Leaf id per row
    pub fn apply(&self, x: ArrayView2<'_, f64>) -> Vec<usize> {
        x.rows().into_iter().map(|row| self.apply_row(row)).collect()
    }

    /// Full decision path per row (root excluded)
    pub fn decision_path_full(&self, x: ArrayView2<'_, f64>) -> Vec<Vec<usize>> {
        x.rows()
            .into_iter()
            .map(|row| self.decision_path_full_row(row))
            .collect()
    }

    /// Single-element leaf path per row
    pub fn decision_path_leaf(&self, x: ArrayView2<'_, f64>) -> Vec<Vec<usize>> {
        self.apply(x).into_iter().map(|leaf| vec![leaf]).collect()
    }

    /// Depth of every node, `None` for nodes unreachable from the root
    pub fn node_depths(&self) -> Vec<Option<usize>> {
        let mut depths = vec![None; self.node_count()];
        if depths.is_empty() {
            return depths;
        }
        let mut stack = vec![(Self::ROOT, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if depths[node].is_some() {
                continue;
            }
            depths[node] = Some(depth);
            for child in [self.children_left[node], self.children_right[node]].into_iter().flatten() {
                stack.push((child, depth + 1));
            }
        }
        depths
    }
}

/// Trees fitted elsewhere, wrapped so the detector can consume them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticEnsemble {
    trees: Vec<ArrayTree>,
    max_samples: usize,
}

impl StaticEnsemble {
    /// Wrap fitted trees; `max_samples` is the per-tree subsample size
    pub fn new(trees: Vec<ArrayTree>, max_samples: usize) -> AadResult<Self> {
        for tree in &trees {
            tree.validate()?;
        }
        Ok(Self { trees, max_samples })
    }
}

impl TreeEnsemble for StaticEnsemble {
    fn trees(&self) -> &[ArrayTree] {
        &self.trees
    }

    fn max_samples(&self) -> usize {
        self.max_samples
    }

    fn decision_function(&self, x: ArrayView2<'_, f64>) -> AadResult<Vec<f64>> {
        // Mean leaf depth, higher means more normal
        let depths: Vec<Vec<Option<usize>>> = self.trees.iter().map(|t| t.node_depths()).collect();
        let n_trees = self.trees.len().max(1) as f64;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.trees
                    .iter()
                    .zip(&depths)
                    .map(|(t, d)| d[t.apply_row(row)].unwrap_or(0) as f64)
                    .sum::<f64>()
                    / n_trees
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_level_tree() -> ArrayTree {
        // 0: x0 <= 0.5 ? 1 : 2 ; 1: x1 <= 0.3 ? 3 : 4
        ArrayTree {
            n_features: 2,
            children_left: vec![Some(1), Some(3), None, None, None],
            children_right: vec![Some(2), Some(4), None, None, None],
            feature: vec![0, 1, 0, 0, 0],
            threshold: vec![0.5, 0.3, 0.0, 0.0, 0.0],
            n_node_samples: vec![10, 6, 4, 2, 4],
            log_frac_vol: None,
        }
    }

    #[test]
    fn test_apply_routes_on_threshold() {
        let tree = two_level_tree();
        let x = array![[0.2, 0.1], [0.5, 0.9], [0.7, 0.0]];
        assert_eq!(tree.apply(x.view()), vec![3, 4, 2]);
    }

    #[test]
    fn test_decision_path_excludes_root() {
        let tree = two_level_tree();
        let x = array![[0.2, 0.1], [0.9, 0.1]];
        assert_eq!(tree.decision_path_full(x.view()), vec![vec![1, 3], vec![2]]);
        assert_eq!(tree.decision_path_leaf(x.view()), vec![vec![3], vec![2]]);
    }

    #[test]
    fn test_dubious_node_follows_existing_child() {
        let mut tree = two_level_tree();
        tree.children_left[1] = None;
        assert!(tree.is_dubious(1));
        let x = array![[0.2, 0.1]];
        assert_eq!(tree.apply(x.view()), vec![4]);
    }

    #[test]
    fn test_cycle_does_not_hang() {
        let mut tree = ArrayTree::stump(1, 0, 0.5, 1, 1);
        tree.children_left[1] = Some(0);
        tree.children_right[1] = Some(0);
        let x = array![[0.0]];
        let _ = tree.apply(x.view());
        assert!(tree.decision_path_full(x.view())[0].len() <= tree.node_count());
    }

    #[test]
    fn test_validate() {
        assert!(two_level_tree().validate().is_ok());
        let mut bad = two_level_tree();
        bad.threshold.pop();
        assert!(bad.validate().is_err());
        let mut bad = two_level_tree();
        bad.children_right[2] = Some(9);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_revisited_nodes() {
        let mut back_edge = ArrayTree::stump(1, 0, 0.5, 1, 1);
        back_edge.children_left[1] = Some(0);
        back_edge.children_right[1] = Some(2);
        assert!(matches!(back_edge.validate(), Err(AadError::InvalidConfig(_))));

        // two parents sharing a child
        let mut shared = two_level_tree();
        shared.children_right[1] = Some(2);
        assert!(matches!(shared.validate(), Err(AadError::InvalidConfig(_))));

        let cyclic = StaticEnsemble::new(vec![back_edge], 4);
        assert!(cyclic.is_err());
    }

    #[test]
    fn test_node_depths() {
        let d = two_level_tree().node_depths();
        assert_eq!(d, vec![Some(0), Some(1), Some(1), Some(2), Some(2)]);
    }

    #[test]
    fn test_static_ensemble_defaults() {
        let mut ens = StaticEnsemble::new(vec![two_level_tree()], 10).unwrap();
        assert!(!ens.supports_streaming());
        assert_eq!(ens.add_samples(array![[0.0, 0.0]].view()), Err(AadError::StreamingUnsupported));
        let scores = ens.decision_function(array![[0.2, 0.1], [0.9, 0.0]].view()).unwrap();
        assert_eq!(scores, vec![2.0, 1.0]);
    }
}
