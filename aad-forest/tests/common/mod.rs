//! Shared fixtures for integration tests
//!
//! - Hand-built stump ensembles with known regions
//! - Seeded clustered data with a handful of labeled anomalies
//! - Detector builders with test-friendly configs

#![allow(dead_code)]

use aad_core::{AadConfig, ArrayTree, Label, ScoreType, StaticEnsemble};
use aad_forest::{AadForest, ForestConfig, IsolationForest};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Samples routed left by every stump
pub const STUMP_LEFT_SAMPLES: usize = 200;
/// Samples routed right by every stump
pub const STUMP_RIGHT_SAMPLES: usize = 56;

/// Three identical stumps splitting feature 0 at 0.5
pub fn three_stumps() -> StaticEnsemble {
    let trees = (0..3)
        .map(|_| ArrayTree::stump(2, 0, 0.5, STUMP_LEFT_SAMPLES, STUMP_RIGHT_SAMPLES))
        .collect();
    StaticEnsemble::new(trees, STUMP_LEFT_SAMPLES + STUMP_RIGHT_SAMPLES).expect("valid stumps")
}

/// Config with the given score policy, leaf-only regions and dense features
pub fn test_config(score_type: ScoreType, leaf_only: bool) -> AadConfig {
    let mut config = AadConfig::default();
    config.detector.score_type = score_type;
    config.detector.leaf_only = leaf_only;
    config.transform.dense = true;
    config
}

/// Labeled data set: a tight nominal cluster plus scattered anomalies
pub struct Dataset {
    pub x: Array2<f64>,
    pub labels: Vec<Label>,
}

impl Dataset {
    pub fn anomaly_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_anomaly()).count()
    }
}

/// `n_nominal` points near (0.3, 0.3) followed by `n_anomaly` points near (0.9, 0.9)
pub fn clustered(n_nominal: usize, n_anomaly: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = n_nominal + n_anomaly;
    let mut x = Array2::zeros((n, 2));
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let (center, spread, label) = if i < n_nominal {
            (0.3, 0.08, Label::Nominal)
        } else {
            (0.9, 0.05, Label::Anomaly)
        };
        for j in 0..2 {
            x[[i, j]] = center + rng.gen_range(-spread..spread);
        }
        labels.push(label);
    }
    Dataset { x, labels }
}

/// Small isolation forest fitted on `x`
pub fn fitted_iforest(x: &Array2<f64>, seed: u64) -> IsolationForest {
    let mut forest = IsolationForest::new(ForestConfig {
        n_estimators: 30,
        max_samples: 64,
        max_depth: None,
        seed,
    });
    forest.fit(x.view()).expect("forest fits");
    forest
}

/// Fitted detector over a fresh isolation forest
pub fn iforest_detector(data: &Dataset, config: AadConfig) -> AadForest<IsolationForest> {
    let forest = fitted_iforest(&data.x, config.detector.seed);
    let mut detector = AadForest::new(forest, config);
    detector.fit().expect("detector fits");
    detector
}

/// Assert two slices match element-wise within `tol`
pub fn assert_close(a: &[f64], b: &[f64], tol: f64) {
    assert_eq!(a.len(), b.len(), "length mismatch");
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() <= tol, "index {}: {} vs {}", i, x, y);
    }
}
