//! Query Strategy Trait
//!
//! A query strategy picks the next instance to show the analyst. It sees the
//! current ranking, the query history and the model state, and it is told
//! after each label whether the pick was rewarded (turned out anomalous).
//!
//! ## Contract
//!
//! - `next_query` must return an index below `ordered_indexes.len()` that is
//!   not in `queried`; the feedback loop rejects anything else with
//!   `AadError::InvalidQuery`.
//! - Strategies that need randomness own their RNG. They must not share the
//!   optimizer's random source.

use crate::errors::AadResult;
use crate::label::Label;
use crate::matrix::FeatureMatrix;

/// Everything a strategy may inspect when choosing the next query
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    /// Instance indexes ranked by descending score
    pub ordered_indexes: &'a [usize],
    /// Indexes already queried in this session, in query order
    pub queried: &'a [usize],
    /// Region features of all instances
    pub x: &'a FeatureMatrix,
    /// Ground truth, possibly `Unknown`
    pub labels: &'a [Label],
    /// Current ensemble scores
    pub scores: &'a [f64],
    /// Current weights
    pub w: &'a [f64],
    /// Labeled indexes used by the last weight update (`ha ++ hn`)
    pub hf: &'a [usize],
    /// Rounds left including this one
    pub remaining_budget: usize,
}

/// Stateful query selection
pub trait QueryStrategy {
    /// Index of the next instance to label
    fn next_query(&mut self, ctx: &QueryContext<'_>) -> AadResult<usize>;

    /// Feedback on the last query
    fn update_query_state(&mut self, rewarded: bool);

    /// Held-out indexes the strategy evaluated on, if any
    fn test_indexes(&self) -> Vec<usize> {
        Vec::new()
    }
}
