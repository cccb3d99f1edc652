//! Isolation tree construction
//!
//! Trees are built by recursively partitioning a subsample on a random
//! feature at a random threshold until a node holds one sample, all its
//! samples are identical, or the depth limit is reached. The result is
//! written straight into the parallel-array [`ArrayTree`] layout.
//!
//! A node's index is reserved before its children are built, so ids follow
//! depth-first pre-order and the root is always node 0.

use aad_core::{AadError, AadResult, ArrayTree};
use ndarray::ArrayView2;
use rand::Rng;

/// Attempts at finding a feature with a non-zero range before giving up
const MAX_SPLIT_ATTEMPTS: usize = 10;

/// Reject training input holding NaN or infinite values
pub(crate) fn check_finite(x: ArrayView2<'_, f64>) -> AadResult<()> {
    match x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        Some(((row, col), v)) => Err(AadError::InvalidConfig(format!(
            "non-finite training value {} at row {}, column {}",
            v, row, col
        ))),
        None => Ok(()),
    }
}

/// Incremental writer for the parallel-array layout
#[derive(Debug)]
pub(crate) struct ArrayTreeBuilder {
    tree: ArrayTree,
}

impl ArrayTreeBuilder {
    pub(crate) fn new(n_features: usize) -> Self {
        Self {
            tree: ArrayTree {
                n_features,
                children_left: Vec::new(),
                children_right: Vec::new(),
                feature: Vec::new(),
                threshold: Vec::new(),
                n_node_samples: Vec::new(),
                log_frac_vol: None,
            },
        }
    }

    /// Append a leaf; also used to reserve an internal node
    pub(crate) fn push_leaf(&mut self, n_samples: usize) -> usize {
        let t = &mut self.tree;
        t.children_left.push(None);
        t.children_right.push(None);
        t.feature.push(0);
        t.threshold.push(0.0);
        t.n_node_samples.push(n_samples);
        t.children_left.len() - 1
    }

    /// Turn a reserved node into a split
    pub(crate) fn set_split(&mut self, node: usize, feature: usize, threshold: f64, left: usize, right: usize) {
        let t = &mut self.tree;
        t.feature[node] = feature;
        t.threshold[node] = threshold;
        t.children_left[node] = Some(left);
        t.children_right[node] = Some(right);
    }

    pub(crate) fn set_log_frac_vol(&mut self, log_frac_vol: Vec<f64>) {
        self.tree.log_frac_vol = Some(log_frac_vol);
    }

    pub(crate) fn finish(self) -> ArrayTree {
        self.tree
    }
}

/// Grow one isolation tree over the given rows of `x`
pub fn build_isolation_tree<R: Rng + ?Sized>(
    x: ArrayView2<'_, f64>,
    rows: &[usize],
    max_depth: usize,
    rng: &mut R,
) -> ArrayTree {
    let mut builder = ArrayTreeBuilder::new(x.ncols());
    grow(&mut builder, x, rows, 0, max_depth, rng);
    builder.finish()
}

fn grow<R: Rng + ?Sized>(
    builder: &mut ArrayTreeBuilder,
    x: ArrayView2<'_, f64>,
    rows: &[usize],
    depth: usize,
    max_depth: usize,
    rng: &mut R,
) -> usize {
    if depth >= max_depth || rows.len() <= 1 {
        return builder.push_leaf(rows.len());
    }
    let Some((feature, threshold)) = select_split(x, rows, rng) else {
        return builder.push_leaf(rows.len());
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
        rows.iter().partition(|&&r| x[[r, feature]] <= threshold);
    if left_rows.is_empty() || right_rows.is_empty() {
        return builder.push_leaf(rows.len());
    }

    // Reserve the parent so ids stay in pre-order
    let node = builder.push_leaf(rows.len());
    let left = grow(builder, x, &left_rows, depth + 1, max_depth, rng);
    let right = grow(builder, x, &right_rows, depth + 1, max_depth, rng);
    builder.set_split(node, feature, threshold, left, right);
    node
}

/// Random feature with a non-degenerate range and a threshold in `[min, max)`
fn select_split<R: Rng + ?Sized>(x: ArrayView2<'_, f64>, rows: &[usize], rng: &mut R) -> Option<(usize, f64)> {
    let n_features = x.ncols();
    if n_features == 0 {
        return None;
    }
    for _ in 0..MAX_SPLIT_ATTEMPTS {
        let feature = rng.gen_range(0..n_features);
        let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            let v = x[[r, feature]];
            (lo.min(v), hi.max(v))
        });
        let span = max - min;
        if span.is_infinite() {
            return Some((feature, min / 2.0 + max / 2.0));
        }
        if span > f64::EPSILON {
            return Some((feature, rng.gen_range(min..max)));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn samples() -> ndarray::Array2<f64> {
        array![
            [20.0, 50.0, 1013.0],
            [22.0, 55.0, 1012.0],
            [21.0, 52.0, 1014.0],
            [19.0, 48.0, 1013.0],
            [35.0, 90.0, 1000.0],
        ]
    }

    #[test]
    fn test_tree_is_valid_and_preorder() {
        let x = samples();
        let mut rng = StdRng::seed_from_u64(123);
        let tree = build_isolation_tree(x.view(), &[0, 1, 2, 3, 4], 5, &mut rng);
        assert!(tree.validate().is_ok());
        assert_eq!(tree.n_node_samples[0], 5);
        for node in 0..tree.node_count() {
            if let (Some(l), Some(r)) = (tree.children_left[node], tree.children_right[node]) {
                assert!(l > node && r > l);
                assert_eq!(tree.n_node_samples[node], tree.n_node_samples[l] + tree.n_node_samples[r]);
            }
        }
    }

    #[test]
    fn test_depth_limit() {
        let x = samples();
        let mut rng = StdRng::seed_from_u64(1);
        let tree = build_isolation_tree(x.view(), &[0, 1, 2, 3, 4], 2, &mut rng);
        assert!(tree.node_depths().iter().flatten().all(|&d| d <= 2));
    }

    #[test]
    fn test_overflowing_span_splits_at_midpoint() {
        let x = array![[-1e308], [1e308], [0.5]];
        let mut rng = StdRng::seed_from_u64(3);
        let tree = build_isolation_tree(x.view(), &[0, 1, 2], 4, &mut rng);
        assert!(tree.validate().is_ok());
        assert_eq!(tree.threshold[0], 0.0);
        assert_eq!(tree.n_node_samples[tree.children_left[0].unwrap()], 1);
    }

    #[test]
    fn test_check_finite() {
        assert!(check_finite(samples().view()).is_ok());
        let x = array![[1.0, f64::NAN]];
        assert!(matches!(check_finite(x.view()), Err(AadError::InvalidConfig(_))));
    }

    #[test]
    fn test_training_rows_reach_their_leaf_counts() {
        let x = samples();
        let mut rng = StdRng::seed_from_u64(7);
        let tree = build_isolation_tree(x.view(), &[0, 1, 2, 3, 4], 10, &mut rng);
        let leaves = tree.apply(x.view());
        for &leaf in &leaves {
            let hits = leaves.iter().filter(|&&l| l == leaf).count();
            assert_eq!(tree.n_node_samples[leaf], hits);
        }
    }

    #[test]
    fn test_identical_rows_make_a_leaf() {
        let x = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = build_isolation_tree(x.view(), &[0, 1, 2], 8, &mut rng);
        assert_eq!(tree.node_count(), 1);
        assert!(tree.is_leaf(0));
    }
}
