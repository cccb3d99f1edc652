//! Built-in query strategies
//!
//! - [`DeterministicQuery`]: the highest-ranked instance not yet queried
//! - [`TopRandomQuery`]: uniform among the top `top_k` unqueried instances
//! - [`RandomQuery`]: uniform among all unqueried instances
//!
//! Randomized strategies own an RNG seeded from the detector seed mixed with
//! a fixed salt, so they never draw from the optimizer's stream.

use aad_core::{AadError, AadResult, QueryContext, QueryStrategy, QueryType};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

const QUERY_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Unqueried indexes in rank order
fn unqueried<'a>(ctx: &'a QueryContext<'a>) -> impl Iterator<Item = usize> + 'a {
    ctx.ordered_indexes
        .iter()
        .copied()
        .filter(move |i| !ctx.queried.contains(i))
}

fn exhausted(ctx: &QueryContext<'_>) -> AadError {
    AadError::InvalidQuery {
        index: ctx.ordered_indexes.len(),
        reason: "no unqueried instance left",
    }
}

fn check_budget(remaining: &mut usize, ctx: &QueryContext<'_>) -> AadResult<()> {
    if *remaining == 0 {
        return Err(AadError::InvalidQuery {
            index: ctx.queried.len(),
            reason: "query budget exhausted",
        });
    }
    *remaining -= 1;
    Ok(())
}

/// Always the top-ranked unqueried instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterministicQuery {
    remaining: usize,
}

impl DeterministicQuery {
    /// Strategy allowed `budget` queries
    pub fn new(budget: usize) -> Self {
        Self { remaining: budget }
    }
}

impl QueryStrategy for DeterministicQuery {
    fn next_query(&mut self, ctx: &QueryContext<'_>) -> AadResult<usize> {
        check_budget(&mut self.remaining, ctx)?;
        unqueried(ctx).next().ok_or_else(|| exhausted(ctx))
    }

    fn update_query_state(&mut self, _rewarded: bool) {}
}

/// Uniform pick among the `top_k` best unqueried instances
#[derive(Debug, Clone)]
pub struct TopRandomQuery {
    top_k: usize,
    remaining: usize,
    rng: StdRng,
}

impl TopRandomQuery {
    /// Strategy over the first `top_k` candidates (at least one)
    pub fn new(top_k: usize, budget: usize, seed: u64) -> Self {
        Self {
            top_k: top_k.max(1),
            remaining: budget,
            rng: StdRng::seed_from_u64(seed ^ QUERY_SEED_SALT),
        }
    }
}

impl QueryStrategy for TopRandomQuery {
    fn next_query(&mut self, ctx: &QueryContext<'_>) -> AadResult<usize> {
        check_budget(&mut self.remaining, ctx)?;
        let candidates: Vec<usize> = unqueried(ctx).take(self.top_k).collect();
        candidates.choose(&mut self.rng).copied().ok_or_else(|| exhausted(ctx))
    }

    fn update_query_state(&mut self, _rewarded: bool) {}
}

/// Uniform pick among every unqueried instance
#[derive(Debug, Clone)]
pub struct RandomQuery {
    remaining: usize,
    rng: StdRng,
}

impl RandomQuery {
    /// Strategy allowed `budget` queries
    pub fn new(budget: usize, seed: u64) -> Self {
        Self {
            remaining: budget,
            rng: StdRng::seed_from_u64(seed ^ QUERY_SEED_SALT),
        }
    }
}

impl QueryStrategy for RandomQuery {
    fn next_query(&mut self, ctx: &QueryContext<'_>) -> AadResult<usize> {
        check_budget(&mut self.remaining, ctx)?;
        let candidates: Vec<usize> = unqueried(ctx).collect();
        candidates.choose(&mut self.rng).copied().ok_or_else(|| exhausted(ctx))
    }

    fn update_query_state(&mut self, _rewarded: bool) {}
}

/// Strategy for a feedback session
pub fn initial_query_state(query_type: QueryType, top_k: usize, budget: usize, seed: u64) -> Box<dyn QueryStrategy> {
    match query_type {
        QueryType::Deterministic => Box::new(DeterministicQuery::new(budget)),
        QueryType::TopRandom => Box::new(TopRandomQuery::new(top_k, budget, seed)),
        QueryType::Random => Box::new(RandomQuery::new(budget, seed)),
    }
}
