//! Property tests over randomly grown forests

mod common;

use aad_core::math::{average_path_length, dot, uniform_weights};
use aad_core::{AadConfig, Label, ScoreType, TransformConfig, TreeEnsemble};
use aad_forest::{
    extract_regions, forest_aad_weight_update, region_scores, FeatureTransformer, ForestConfig, IsolationForest,
    RegionIndex,
};
use ndarray::Array2;
use proptest::prelude::*;
use proptest::test_runner::Config;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn data(values: &[f64], ncols: usize) -> Array2<f64> {
    let nrows = values.len() / ncols;
    Array2::from_shape_vec((nrows, ncols), values[..nrows * ncols].to_vec()).unwrap()
}

fn forest(x: &Array2<f64>, seed: u64) -> IsolationForest {
    let mut forest = IsolationForest::new(ForestConfig { n_estimators: 5, max_samples: 32, max_depth: None, seed });
    forest.fit(x.view()).unwrap();
    forest
}

proptest! {
    #![proptest_config(Config::with_cases(32))]

    #[test]
    fn prop_boxes_are_ordered_and_hold_their_samples(
        values in prop::collection::vec(-10.0f64..10.0, 24..120),
        seed in 0u64..1000,
        leaf_only in any::<bool>(),
    ) {
        let x = data(&values, 3);
        let forest = forest(&x, seed);
        for tree in forest.trees() {
            let regions = extract_regions(tree, leaf_only);
            for region in &regions {
                prop_assert!(region.bounds.iter().all(|&(lo, hi)| lo <= hi));
            }
            for (row, leaf) in x.rows().into_iter().zip(tree.apply(x.view())) {
                let region = regions.iter().find(|r| r.node_id == leaf).unwrap();
                prop_assert!(region.contains(row));
            }
        }
    }

    #[test]
    fn prop_ids_contiguous_and_parallel_identical(
        values in prop::collection::vec(-5.0f64..5.0, 20..80),
        seed in 0u64..1000,
        leaf_only in any::<bool>(),
    ) {
        let x = data(&values, 2);
        let forest = forest(&x, seed);
        let index = RegionIndex::build(forest.trees(), leaf_only);
        prop_assert_eq!(&index, &RegionIndex::build_parallel(forest.trees(), leaf_only));
        prop_assert_eq!(&index, &RegionIndex::build(forest.trees(), leaf_only));

        let mut ids: Vec<usize> = (0..index.tree_count())
            .flat_map(|t| index.node_regions(t).iter().flatten().copied().collect::<Vec<_>>())
            .collect();
        ids.sort_unstable();
        prop_assert_eq!(ids, (0..index.len()).collect::<Vec<_>>());
    }

    #[test]
    fn prop_dense_and_sparse_agree(
        values in prop::collection::vec(0.0f64..1.0, 20..90),
        seed in 0u64..1000,
        leaf_only in any::<bool>(),
        batch_size in 1usize..16,
    ) {
        let x = data(&values, 2);
        let forest = forest(&x, seed);
        let index = RegionIndex::build(forest.trees(), leaf_only);
        let scores = region_scores(index.regions(), ScoreType::LeafInvSample, forest.max_samples()).unwrap();
        let t = FeatureTransformer::new(forest.trees(), &index, &scores.d, ScoreType::LeafInvSample, leaf_only).unwrap();

        let dense = t.to_dense(x.view()).unwrap();
        let sparse = t.to_sparse(x.view(), batch_size).unwrap();
        prop_assert_eq!(&dense, &sparse.to_dense());
        let parallel = t.transform(x.view(), &TransformConfig { dense: false, batch_size, parallel: true }).unwrap();
        prop_assert_eq!(&dense, &parallel.to_dense());

        if leaf_only {
            for row in dense.rows() {
                prop_assert_eq!(row.iter().filter(|&&v| v != 0.0).count(), forest.trees().len());
            }
        }
    }

    #[test]
    fn prop_updates_are_unit_norm(
        values in prop::collection::vec(0.0f64..1.0, 40..100),
        seed in 0u64..1000,
        n_labeled in 1usize..6,
    ) {
        let x = data(&values, 2);
        let forest = forest(&x, seed);
        let index = RegionIndex::build(forest.trees(), true);
        let scores = region_scores(index.regions(), ScoreType::LeafInvSample, forest.max_samples()).unwrap();
        let t = FeatureTransformer::new(forest.trees(), &index, &scores.d, ScoreType::LeafInvSample, true).unwrap();
        let features = t.transform(x.view(), &TransformConfig::default()).unwrap();

        let n = x.nrows();
        let labels: Vec<Label> = (0..n).map(|i| if i % 3 == 0 { Label::Anomaly } else { Label::Nominal }).collect();
        let hf: Vec<usize> = (0..n_labeled.min(n)).collect();
        let w = uniform_weights(index.len());
        let mut config = AadConfig::default();
        config.weights.solver.max_epochs = 50;
        let mut rng = StdRng::seed_from_u64(seed);

        let w_new = forest_aad_weight_update(&features, &labels, &w, &hf, &w, &config, &mut rng).unwrap();
        prop_assert!((dot(&w_new, &w_new).sqrt() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn prop_average_path_length_increases(n in 2usize..100_000) {
        prop_assert!(average_path_length(n) > average_path_length(n - 1));
    }
}

#[test]
fn test_average_path_length_base_cases() {
    assert_eq!(average_path_length(0), 1.0);
    assert_eq!(average_path_length(1), 1.0);
}
