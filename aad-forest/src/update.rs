//! One weight update
//!
//! Given the labeled indexes of a feedback round, builds the margin loss and
//! runs the configured solver:
//!
//! 1. `topK` from the config, or `round(tau·n)` when unset
//! 2. `q`: the `(1 - topK/n)` quantile of the linear scores `x·w`
//! 3. Constraint set, truncated to the configured caps
//! 4. Tau anchor: the instance ranked `topK` under the current weights
//! 5. Solve from the current weights, then rescale to unit norm

use aad_core::math::{dot, order_descending, quantile, round_count};
use aad_core::{AadConfig, AadError, AadResult, ConstraintType, FeatureMatrix, FeedbackConfig, Label};
use rand::Rng;

use crate::loss::{truncated_constraint_set, AadObjective, LossParams};
use crate::optimizer::solver_for;

/// Query budget and anomaly budget for `n` instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetTopK {
    /// Feedback rounds, clamped to `max_budget` and to `n`
    pub budget: usize,
    /// Instances treated as the expected anomaly count
    pub top_k: usize,
}

impl BudgetTopK {
    /// Resolve the budgets from the feedback config
    pub fn new(n: usize, config: &FeedbackConfig) -> Self {
        let top_k = if config.top_k > 0 {
            config.top_k
        } else {
            round_count(config.tau * n as f64)
        };
        let budget = config.budget.min(config.max_budget).min(n);
        Self { budget, top_k }
    }
}

/// Score threshold above which the top `top_k` linear scores lie
pub fn aatp_quantile(x: &FeatureMatrix, w: &[f64], top_k: usize) -> f64 {
    let n = x.nrows();
    if n == 0 {
        return f64::NAN;
    }
    quantile(&x.dot(w), 1.0 - top_k as f64 / n as f64)
}

/// Instance at rank `tau_rank` (clamped to the last) by descending score
pub fn tau_ranked_instance(scores: &[f64], tau_rank: usize) -> Option<usize> {
    if scores.is_empty() {
        return None;
    }
    let order = order_descending(scores);
    Some(order[tau_rank.min(scores.len() - 1)])
}

/// Rescale to unit length
///
/// Components are divided by the largest magnitude first so the squared
/// norm stays finite for large weights.
pub fn normalize_weights(mut w: Vec<f64>) -> AadResult<Vec<f64>> {
    if w.iter().any(|v| v.is_nan()) {
        return Err(AadError::Numerical { reason: "weight vector contains NaN" });
    }
    if w.iter().any(|v| v.is_infinite()) {
        return Err(AadError::Numerical { reason: "weight vector is not finite" });
    }
    let scale = w.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if scale == 0.0 {
        return Err(AadError::Numerical { reason: "weight vector has zero norm" });
    }
    for v in &mut w {
        *v /= scale;
    }
    let norm = dot(&w, &w).sqrt();
    for v in &mut w {
        *v /= norm;
    }
    Ok(w)
}

/// Minimize the margin loss over `hf` starting from `w` and return the
/// normalized result. `w` itself is not modified.
pub fn forest_aad_weight_update<R: Rng>(
    x: &FeatureMatrix,
    labels: &[Label],
    w: &[f64],
    hf: &[usize],
    w_prior: &[f64],
    config: &AadConfig,
    rng: &mut R,
) -> AadResult<Vec<f64>> {
    let n = x.nrows();
    if w.len() != x.ncols() {
        return Err(AadError::DimensionMismatch { expected: x.ncols(), actual: w.len() });
    }
    if labels.len() != n {
        return Err(AadError::DimensionMismatch { expected: n, actual: labels.len() });
    }
    if let Some(&bad) = hf.iter().find(|&&i| i >= n) {
        return Err(AadError::InvalidQuery { index: bad, reason: "labeled index out of range" });
    }

    let wc = &config.weights;
    let bt = BudgetTopK::new(n, &config.feedback);
    let qval = aatp_quantile(x, w, bt.top_k);

    let constraints = truncated_constraint_set(
        labels,
        hf,
        wc.max_anomalies_in_constraint_set,
        wc.max_nominals_in_constraint_set,
        rng,
    );

    let tau_instance = match wc.constraint_type {
        ConstraintType::TauInstance => tau_ranked_instance(&x.dot(w), bt.top_k),
        ConstraintType::None => None,
    };

    let params = LossParams {
        ca: wc.ca,
        cn: wc.cn,
        cx: wc.cx,
        prior: wc.with_prior.then_some((w_prior, wc.prior_sigma2)),
    };
    let objective = AadObjective::new(
        x,
        labels,
        constraints,
        qval,
        tau_instance,
        params,
        config.detector.ensemble_score,
    );

    let raw = solver_for(&wc.solver).minimize(w, &objective, rng)?;
    normalize_weights(raw)
}
