//! Forest Region Constants
//!
//! Normalization constants shared by region extraction, region scoring and
//! the feature transform.

// ===== PATH LENGTH =====

/// Euler–Mascheroni constant.
///
/// Used in the harmonic-number approximation `H(n) ≈ ln(n) + γ` that gives the
/// expected path length of an unsuccessful BST search over `n` points.
pub const EULER_GAMMA: f64 = 0.5772156649;

// ===== FEATURE TRANSFORM =====

/// Rows converted per batch when building the sparse region-feature matrix.
///
/// Bounds the size of the intermediate triplet buffers; the finished batches
/// are stacked in row order.
pub const DEFAULT_TRANSFORM_BATCH_SIZE: usize = 10_000;

/// Minimum number of rows before per-batch progress is logged.
pub const PROGRESS_LOG_MIN_ROWS: usize = 100_000;
