//! Stochastic Solver Traits
//!
//! The weight update is a small regularized minimization solved once per
//! feedback round. The loss is defined over the labeled rows only, so the
//! objective is addressed by *row positions* in its own restricted set; the
//! solver decides the batching and the order.
//!
//! ## Implementation Guidelines
//!
//! 1. **Determinism**: all randomness comes from the `rng` argument
//! 2. **Pocket weights**: return the best weights seen, not the last
//! 3. **Error Handling**: a NaN loss is `AadError::Numerical`, never a panic

use rand::RngCore;

use crate::errors::AadResult;

/// Differentiable loss over a restricted labeled set
pub trait Objective {
    /// Number of rows in the restricted set
    fn num_rows(&self) -> usize;

    /// Loss at `w` over the given row positions
    fn loss(&self, w: &[f64], rows: &[usize]) -> f64;

    /// (Sub)gradient at `w` over the given row positions
    fn gradient(&self, w: &[f64], rows: &[usize]) -> Vec<f64>;
}

/// Minimizer for an `Objective`
pub trait Solver {
    /// Run from `w0` until convergence or the epoch cap
    fn minimize(
        &self,
        w0: &[f64],
        objective: &dyn Objective,
        rng: &mut dyn RngCore,
    ) -> AadResult<Vec<f64>>;
}
