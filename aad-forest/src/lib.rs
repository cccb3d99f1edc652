//! Active anomaly discovery over tree ensembles
//!
//! Turns a fitted ensemble of partitioning trees into a weighted anomaly
//! detector that learns from analyst feedback:
//!
//! 1. Every tree node (or every leaf) becomes a *region* with a bounding box
//! 2. Each region gets a score `d[r]` from the configured score type
//! 3. Instances map to sparse rows over all regions of all trees
//! 4. The score of an instance is `x·w` (or `exp(x·w)`)
//! 5. Each labeled query adjusts `w` so anomalies rank above the top-K
//!    quantile and nominals below it
//!
//! Key constraints:
//! - All mutable state lives in one [`AadForest`]; no globals
//! - Seeded randomness; parallel extraction and transforms are merged in a
//!   fixed order, so results do not depend on the thread pool
//! - Malformed trees are logged and tolerated, numerical failures abort the
//!   round and keep the last good weights
//!
//! ```no_run
//! use aad_forest::{AadForest, ForestConfig, IsolationForest};
//! use aad_core::{AadConfig, Label};
//! use ndarray::Array2;
//!
//! let x = Array2::<f64>::zeros((100, 2));
//! let labels = vec![Label::Nominal; 100];
//!
//! let mut forest = IsolationForest::new(ForestConfig::default());
//! forest.fit(x.view()).unwrap();
//!
//! let mut config = AadConfig::default();
//! config.feedback.budget = 10;
//! let mut detector = AadForest::new(forest, config);
//! detector.fit().unwrap();
//!
//! let features = detector.transform_to_region_features(x.view()).unwrap();
//! let summary = detector.run_aad(x.clone(), labels, features, None).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod detector;
pub mod feedback;
pub mod forest;
pub mod hstrees;
pub mod loss;
pub mod optimizer;
pub mod persist;
pub mod query;
pub mod region;
pub mod scoring;
pub mod transform;
pub mod tree;
pub mod update;

// Public API
pub use detector::AadForest;
pub use feedback::{summarize_num_seen, AadMetrics, AadRunSummary, Ensemble, FeedbackSession, FeedbackState};
pub use forest::{ForestConfig, IsolationForest};
pub use hstrees::{HalfSpaceConfig, HalfSpaceForest, SplitRule};
pub use loss::{AadObjective, ConstraintSet, LossParams};
pub use optimizer::{solver_for, Adam, Momentum, RmsProp, Sgd};
pub use persist::{load_aad_model, load_metrics, save_aad_model, save_metrics};
pub use query::{initial_query_state, DeterministicQuery, RandomQuery, TopRandomQuery};
pub use region::{extract_regions, Region, RegionIndex};
pub use scoring::{region_scores, RegionScores};
pub use transform::FeatureTransformer;
pub use update::{forest_aad_weight_update, BudgetTopK};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
