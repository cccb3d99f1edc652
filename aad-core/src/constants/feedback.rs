//! Feedback Loop Constants
//!
//! Budget, ranking and loss defaults for one labeling session.

// ===== BUDGET =====

/// Fraction of instances treated as the anomaly budget when `top_k` is unset.
pub const DEFAULT_TAU: f64 = 0.03;

/// Upper bound on the number of feedback rounds in one session.
pub const DEFAULT_MAX_BUDGET: usize = 100;

// ===== LOSS =====

/// Cap on labeled anomalies (and, separately, nominals) entering the loss.
///
/// Larger labeled sets are subsampled uniformly with the detector's RNG.
pub const DEFAULT_MAX_CONSTRAINT_SET: usize = 1000;

/// Cost of an anomaly scoring below the quantile threshold.
pub const DEFAULT_CA: f64 = 100.0;

/// Cost of a nominal scoring above the quantile threshold.
pub const DEFAULT_CN: f64 = 1.0;

/// Cost of violating the margin relative to the tau-ranked instance.
pub const DEFAULT_CX: f64 = 0.001;

/// Variance of the Gaussian prior around the reference weights.
pub const DEFAULT_PRIOR_SIGMA2: f64 = 0.5;

// ===== CHECKS =====

/// Allowed deviation of `‖w‖₂` from 1 after a weight update.
pub const WEIGHT_NORM_TOLERANCE: f64 = 1e-9;
