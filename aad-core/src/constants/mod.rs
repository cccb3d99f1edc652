//! Constants for forest-aad
//!
//! Numeric defaults used across region scoring, the weight optimizer and the
//! feedback loop. The values mirror the reference AAD defaults so that runs
//! are comparable with published results.
//!
//! ## Organization
//!
//! - **Forest**: path-length normalization and transform batching
//! - **Optimizer**: learning rates, epoch caps and adaptive-rate parameters
//! - **Feedback**: budget, top-K and constraint-set defaults

/// Path-length normalization and feature transform parameters.
pub mod forest;

/// Stochastic solver hyperparameters.
pub mod optimizer;

/// Feedback loop and loss defaults.
pub mod feedback;

pub use forest::{EULER_GAMMA, DEFAULT_TRANSFORM_BATCH_SIZE, PROGRESS_LOG_MIN_ROWS};
pub use optimizer::{
    DEFAULT_LEARNING_RATE, DEFAULT_MAX_EPOCHS, DEFAULT_TOLERANCE, DEFAULT_SGD_BATCH_SIZE,
};
pub use feedback::{
    DEFAULT_TAU, DEFAULT_MAX_BUDGET, DEFAULT_MAX_CONSTRAINT_SET, WEIGHT_NORM_TOLERANCE,
};
