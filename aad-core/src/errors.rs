//! Error Types for Active Anomaly Discovery
//!
//! ## Error Categories
//!
//! Errors fall into five groups, and each group has a fixed propagation rule:
//!
//! ### Configuration
//! - `UnknownScoreType` / `UnknownDetectorType`: a mode name that does not map
//!   to any variant
//! - `InvalidConfig`: a numeric parameter outside its valid range, or a config
//!   document that does not parse
//! - `UnsupportedConfig`: a valid mode used where it has no meaning (e.g. the
//!   original-tree score type in a feature transform)
//!
//! ### Capability
//! - `StreamingUnsupported`: streaming refresh on an ensemble without a stream
//!   buffer
//!
//! ### Numerical
//! - `Numerical`: NaN or zero-norm weights after an optimizer run. The current
//!   feedback round aborts and the stored weights are left untouched.
//!
//! ### Usage
//! - `NotFitted`, `DimensionMismatch`, `InvalidQuery`
//!
//! ### Persistence
//! - `Persistence`: model blob could not be written, read or decoded
//!
//! Configuration and numerical errors always propagate to the caller. Malformed
//! tree nodes and missing result directories are *not* errors; they are logged
//! and the operation degrades gracefully.
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use aad_core::{AadError, AadResult};
//!
//! fn round(result: AadResult<Vec<f64>>) {
//!     match result {
//!         Ok(_w) => {
//!             // Weights updated - continue with the next query
//!         }
//!         Err(AadError::Numerical { .. }) => {
//!             // Session aborted - caller decides whether to restart
//!         }
//!         Err(_) => {
//!             // Configuration or usage problem - fix and rerun
//!         }
//!     }
//! }
//! ```

use thiserror_no_std::Error;

/// Result type for detector operations
pub type AadResult<T> = Result<T, AadError>;

/// Errors raised by the detector, the optimizer and the feedback loop
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AadError {
    /// Score type name does not match any scoring policy
    #[error("Unknown score type: {0}")]
    UnknownScoreType(String),

    /// Detector type name does not match any supported ensemble family
    #[error("Unknown detector type: {0}")]
    UnknownDetectorType(String),

    /// Configuration value out of range or unparseable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Valid configuration used by an operation that cannot honour it
    #[error("Unsupported configuration: {reason}")]
    UnsupportedConfig {
        /// Which combination was rejected
        reason: &'static str,
    },

    /// Streaming update requested on an ensemble without streaming support
    #[error("Detector does not support incremental update")]
    StreamingUnsupported,

    /// Weight update produced an unusable vector
    #[error("Numerical error: {reason}")]
    Numerical {
        /// What went wrong (NaN loss, NaN weights, zero norm)
        reason: &'static str,
    },

    /// Operation needs regions or weights that have not been built yet
    #[error("Model not fitted: {0}")]
    NotFitted(&'static str),

    /// Input matrix or vector has the wrong shape
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Required size
        expected: usize,
        /// Provided size
        actual: usize,
    },

    /// Query strategy returned an index that cannot be labeled
    #[error("Invalid query index {index}: {reason}")]
    InvalidQuery {
        /// Index returned by the strategy
        index: usize,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Model or metrics could not be saved or loaded
    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl AadError {
    /// True for errors that abort a feedback session
    pub fn is_fatal_numerical(&self) -> bool {
        matches!(self, Self::Numerical { .. })
    }

    /// True for configuration-class errors
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::UnknownScoreType(_)
                | Self::UnknownDetectorType(_)
                | Self::InvalidConfig(_)
                | Self::UnsupportedConfig { .. }
        )
    }
}

impl From<std::io::Error> for AadError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for AadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(AadError::Numerical { reason: "nan" }.is_fatal_numerical());
        assert!(AadError::UnknownScoreType("x".into()).is_config());
        assert!(AadError::UnsupportedConfig { reason: "r" }.is_config());
        assert!(!AadError::StreamingUnsupported.is_config());
    }

    #[test]
    fn test_error_display() {
        let err = AadError::DimensionMismatch { expected: 3, actual: 2 };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 3, got 2");
    }
}
