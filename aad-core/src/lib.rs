//! Core types for Active Anomaly Discovery over tree ensembles
//!
//! Holds everything the detector crate and any external ensemble share:
//! array-form trees, the region feature matrix, labels, configuration, the
//! error enum and the three extension traits.
//!
//! Key properties:
//! - No global state; every mutable piece lives in the detector instance
//! - Closed enums for every mode switch, parsed strictly
//! - Traversals bounded by node count, so malformed trees degrade instead of hanging
//!
//! ```no_run
//! use aad_core::{AadConfig, ArrayTree, StaticEnsemble, TreeEnsemble};
//! use ndarray::array;
//!
//! let config = AadConfig::default();
//! let ensemble = StaticEnsemble::new(vec![ArrayTree::stump(2, 0, 0.5, 30, 2)], 32).unwrap();
//!
//! let x = array![[0.2, 0.7], [0.9, 0.1]];
//! let leaves = ensemble.apply(0, x.view());
//! assert_eq!(leaves, vec![1, 2]);
//! assert_eq!(config.feedback.budget, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod constants;
pub mod errors;
pub mod label;
pub mod math;
pub mod matrix;
pub mod sparse;
pub mod traits;
pub mod tree;

// Public API
pub use config::{
    AadConfig, ConstraintType, DetectorConfig, DetectorType, EnsembleScore, FeedbackConfig,
    QueryType, ScoreType, SolverConfig, SolverKind, TransformConfig, WeightConfig,
};
pub use errors::{AadError, AadResult};
pub use label::Label;
pub use matrix::FeatureMatrix;
pub use sparse::SparseMatrix;
pub use traits::{Objective, QueryContext, QueryStrategy, Solver, TreeEnsemble};
pub use tree::{ArrayTree, StaticEnsemble};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
