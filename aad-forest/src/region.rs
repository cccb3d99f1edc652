//! Region extraction
//!
//! Every node of a fitted tree owns an axis-aligned box: the intersection of
//! the half-spaces on the path from the root. Extraction walks each tree in
//! depth-first pre-order (node, left subtree, right subtree) and emits one
//! [`Region`] per leaf, plus one per internal non-root node unless only
//! leaves are requested.
//!
//! Region ids are global: the regions of tree 0 come first, then tree 1, and
//! so on. [`RegionIndex`] keeps the flat list together with a node-to-region
//! map per tree, which is what the feature transform uses to turn decision
//! paths into column indexes.
//!
//! ## Box Updates
//!
//! ```text
//! left child:  hi[f] = min(hi[f], threshold)
//! right child: lo[f] = max(lo[f], threshold)
//! ```
//!
//! The parent box is cloned once per branch point and the clone handed to the
//! right child; the left child takes the original.

use aad_core::math::average_path_length;
use aad_core::ArrayTree;
use log::warn;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Box of one tree node with the statistics used by region scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Closed `[lo, hi]` interval per input feature
    #[serde(with = "bounds_serde")]
    pub bounds: Vec<(f64, f64)>,
    /// Depth of the node (root = 0)
    pub path_length: usize,
    /// Node id inside its tree
    pub node_id: usize,
    /// Average path length of the node's sample count
    pub sample_score: f64,
    /// Samples that reached the node; refreshed by streaming updates
    pub node_samples: usize,
    /// Log fraction of the root volume, 0 when the tree does not track it
    pub log_frac_vol: f64,
}

impl Region {
    fn from_node(tree: &ArrayTree, node: usize, bounds: Vec<(f64, f64)>, path_length: usize) -> Self {
        let node_samples = tree.n_node_samples[node];
        Self {
            bounds,
            path_length,
            node_id: node,
            sample_score: average_path_length(node_samples),
            node_samples,
            log_frac_vol: tree.node_log_frac_vol(node),
        }
    }

    /// Whether `x` lies inside the closed box
    pub fn contains(&self, x: ArrayView1<'_, f64>) -> bool {
        self.bounds
            .iter()
            .zip(x.iter())
            .all(|(&(lo, hi), &v)| lo <= v && v <= hi)
    }
}

// serde_json has no representation for infinities; unbounded sides go out as null.
mod bounds_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    type Wire = Vec<(Option<f64>, Option<f64>)>;

    pub fn serialize<S: Serializer>(bounds: &[(f64, f64)], serializer: S) -> Result<S::Ok, S::Error> {
        let wire: Wire = bounds
            .iter()
            .map(|&(lo, hi)| (lo.is_finite().then_some(lo), hi.is_finite().then_some(hi)))
            .collect();
        wire.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(f64, f64)>, D::Error> {
        let wire = Wire::deserialize(deserializer)?;
        Ok(wire
            .into_iter()
            .map(|(lo, hi)| (lo.unwrap_or(f64::NEG_INFINITY), hi.unwrap_or(f64::INFINITY)))
            .collect())
    }
}

/// Regions of one tree in depth-first pre-order
pub fn extract_regions(tree: &ArrayTree, leaf_only: bool) -> Vec<Region> {
    let n_nodes = tree.node_count();
    let mut regions = Vec::new();
    if n_nodes == 0 {
        return regions;
    }

    let mut visited = vec![false; n_nodes];
    let root_box = vec![(f64::NEG_INFINITY, f64::INFINITY); tree.n_features];
    let mut stack = vec![(ArrayTree::ROOT, root_box, 0usize)];

    while let Some((node, bounds, depth)) = stack.pop() {
        if std::mem::replace(&mut visited[node], true) {
            warn!("node {} reached twice, skipping subtree", node);
            continue;
        }

        if tree.is_leaf(node) {
            regions.push(Region::from_node(tree, node, bounds, depth));
            continue;
        }
        if tree.is_dubious(node) {
            warn!("dubious node {}: only one child present", node);
        }

        if !leaf_only && node != ArrayTree::ROOT {
            regions.push(Region::from_node(tree, node, bounds.clone(), depth));
        }

        let feature = tree.feature[node];
        let threshold = tree.threshold[node];
        let tighten = feature < bounds.len();
        if !tighten {
            warn!(
                "node {} splits on feature {} but tree has {} features",
                node, feature, tree.n_features
            );
        }

        // Right pushed first so the left subtree is emitted first
        if let Some(right) = tree.children_right[node] {
            let mut right_box = bounds.clone();
            if tighten {
                right_box[feature].0 = right_box[feature].0.max(threshold);
            }
            stack.push((right, right_box, depth + 1));
        }
        if let Some(left) = tree.children_left[node] {
            let mut left_box = bounds;
            if tighten {
                left_box[feature].1 = left_box[feature].1.min(threshold);
            }
            stack.push((left, left_box, depth + 1));
        }
    }

    regions
}

/// Flat region list over a whole forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionIndex {
    regions: Vec<Region>,
    /// Start of each tree's regions, plus the total at the end
    tree_offsets: Vec<usize>,
    /// Per tree, region id of every node (`None` when the node emitted none)
    node_regions: Vec<Vec<Option<usize>>>,
}

impl RegionIndex {
    /// Extract every tree in order
    pub fn build(trees: &[ArrayTree], leaf_only: bool) -> Self {
        let per_tree = trees.iter().map(|t| extract_regions(t, leaf_only)).collect();
        Self::from_tree_regions(trees, per_tree)
    }

    /// Extract trees on the thread pool; identical to [`RegionIndex::build`]
    #[cfg(feature = "parallel")]
    pub fn build_parallel(trees: &[ArrayTree], leaf_only: bool) -> Self {
        let mut tagged: Vec<(usize, Vec<Region>)> = trees
            .par_iter()
            .enumerate()
            .map(|(i, t)| (i, extract_regions(t, leaf_only)))
            .collect();
        tagged.sort_by_key(|(i, _)| *i);
        Self::from_tree_regions(trees, tagged.into_iter().map(|(_, r)| r).collect())
    }

    /// Extract trees on the thread pool; identical to [`RegionIndex::build`]
    #[cfg(not(feature = "parallel"))]
    pub fn build_parallel(trees: &[ArrayTree], leaf_only: bool) -> Self {
        Self::build(trees, leaf_only)
    }

    fn from_tree_regions(trees: &[ArrayTree], per_tree: Vec<Vec<Region>>) -> Self {
        let total = per_tree.iter().map(Vec::len).sum();
        let mut regions = Vec::with_capacity(total);
        let mut tree_offsets = Vec::with_capacity(per_tree.len() + 1);
        let mut node_regions = Vec::with_capacity(per_tree.len());

        for (tree, tree_regions) in trees.iter().zip(per_tree) {
            let mut map = vec![None; tree.node_count()];
            tree_offsets.push(regions.len());
            for region in tree_regions {
                map[region.node_id] = Some(regions.len());
                regions.push(region);
            }
            node_regions.push(map);
        }
        tree_offsets.push(regions.len());

        Self { regions, tree_offsets, node_regions }
    }

    /// Total number of regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// No regions at all
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Number of trees indexed
    pub fn tree_count(&self) -> usize {
        self.node_regions.len()
    }

    /// All regions by global id
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Regions of one tree
    pub fn tree_regions(&self, tree: usize) -> &[Region] {
        &self.regions[self.tree_offsets[tree]..self.tree_offsets[tree + 1]]
    }

    /// Node-to-region map of one tree
    pub fn node_regions(&self, tree: usize) -> &[Option<usize>] {
        &self.node_regions[tree]
    }

    /// Region id of `node` in `tree`
    pub fn region_id(&self, tree: usize, node: usize) -> Option<usize> {
        self.node_regions
            .get(tree)
            .and_then(|m| m.get(node))
            .copied()
            .flatten()
    }

    /// Copy the current node sample counts of each tree into its regions
    pub fn refresh_node_samples(&mut self, trees: &[ArrayTree]) {
        for (tree, map) in trees.iter().zip(&self.node_regions) {
            for (node, region) in map.iter().enumerate() {
                if let (Some(r), Some(&n)) = (region, tree.n_node_samples.get(node)) {
                    self.regions[*r].node_samples = n;
                }
            }
        }
    }
}
