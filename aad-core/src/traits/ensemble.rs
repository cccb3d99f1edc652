//! Tree Ensemble Trait
//!
//! The detector never fits trees itself. It reads the array form of each
//! fitted tree, routes instances through them, and optionally asks the
//! ensemble to refresh its node counts from a stream buffer.
//!
//! ## Streaming
//!
//! Only some ensembles keep a stream buffer. The default implementations of
//! `add_samples` and `update_model_from_stream_buffer` return
//! `AadError::StreamingUnsupported`, and callers are expected to check
//! `supports_streaming()` first.

use ndarray::ArrayView2;

use crate::errors::{AadError, AadResult};
use crate::tree::ArrayTree;

/// Fitted ensemble of partitioning trees
pub trait TreeEnsemble {
    /// Fitted trees, in estimator order
    fn trees(&self) -> &[ArrayTree];

    /// Per-tree subsample size used during fitting
    fn max_samples(&self) -> usize;

    /// Leaf id of every row in tree `tree`
    fn apply(&self, tree: usize, x: ArrayView2<'_, f64>) -> Vec<usize> {
        self.trees()[tree].apply(x)
    }

    /// Native anomaly score of the unweighted ensemble, lower = more anomalous
    fn decision_function(&self, x: ArrayView2<'_, f64>) -> AadResult<Vec<f64>>;

    /// Whether `add_samples` / `update_model_from_stream_buffer` are available
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Route new instances into the stream buffer
    fn add_samples(&mut self, _x: ArrayView2<'_, f64>) -> AadResult<()> {
        Err(AadError::StreamingUnsupported)
    }

    /// Replace node counts with the stream buffer and clear it
    fn update_model_from_stream_buffer(&mut self) -> AadResult<()> {
        Err(AadError::StreamingUnsupported)
    }

    /// Input dimensionality shared by all trees
    fn n_features(&self) -> usize {
        self.trees().iter().map(|t| t.n_features).max().unwrap_or(0)
    }
}
