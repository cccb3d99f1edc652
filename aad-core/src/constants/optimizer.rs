//! Stochastic Solver Constants
//!
//! Hyperparameters for the SGD family used by the weight update. The small
//! fixed learning rate and the epoch cap keep one feedback round bounded.

// ===== SHARED =====

/// Step size for every solver variant.
pub const DEFAULT_LEARNING_RATE: f64 = 0.001;

/// Maximum passes over the labeled set per weight update.
pub const DEFAULT_MAX_EPOCHS: usize = 1000;

/// Mean epoch loss below which the solver stops early.
pub const DEFAULT_TOLERANCE: f64 = 1e-5;

/// Rows per mini-batch. Labeled sets no larger than this are not shuffled.
pub const DEFAULT_SGD_BATCH_SIZE: usize = 100;

// ===== RMSPROP =====

/// Decay of the running squared-gradient average.
pub const RMSPROP_DECAY: f64 = 0.9;

/// Added under the square root to keep the step finite.
pub const RMSPROP_DELTA: f64 = 1e-6;

// ===== MOMENTUM =====

/// Velocity retention for momentum SGD.
pub const MOMENTUM_ALPHA: f64 = 0.9;

// ===== ADAM =====

/// First-moment decay.
pub const ADAM_BETA1: f64 = 0.9;

/// Second-moment decay.
pub const ADAM_BETA2: f64 = 0.999;

/// Numerical stabilizer.
pub const ADAM_DELTA: f64 = 1e-8;
