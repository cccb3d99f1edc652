//! Margin loss for the weight update
//!
//! The loss pushes labeled anomalies above the score threshold `q` and
//! labeled nominals below it, where `q` is the `(1 - topK/n)` quantile of the
//! current linear scores. With a tau anchor, the score `t = x_tau·w` of the
//! instance ranked `topK` acts as a second, moving threshold.
//!
//! ```text
//! anomaly  s < q:  ca·(q - s)        anomaly  s < t:  cx·(t - s)
//! nominal  s >= q: cn·(s - q)        nominal  s >= t: cx·(s - t)
//!
//! loss = La / max(1, nA) + Ln / max(1, nN) [+ ‖w - w_prior‖² / (2σ²)]
//! ```
//!
//! `nA` and `nN` count the active (violated) terms. `q` is fixed for one
//! update; `t` moves with `w` and contributes to the gradient.
//!
//! The exponential variant applies the same terms to `exp(s)`, `exp(q)` and
//! `exp(t)`.

use aad_core::{EnsembleScore, FeatureMatrix, Label, Objective};
use rand::seq::index::sample;
use rand::Rng;

/// Labeled rows entering the loss and which of them are active
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSet {
    /// Instance indexes, in loss-row order
    pub hf: Vec<usize>,
    /// Membership flag per entry of `hf`
    pub in_set: Vec<bool>,
}

impl ConstraintSet {
    /// Every row is a member
    pub fn all(hf: Vec<usize>) -> Self {
        let in_set = vec![true; hf.len()];
        Self { hf, in_set }
    }

    /// Number of member rows
    pub fn members(&self) -> usize {
        self.in_set.iter().filter(|&&m| m).count()
    }
}

/// Cap the labeled anomalies and nominals in the loss.
///
/// Below both caps every row is kept in its original order. Otherwise `hf`
/// is reordered to anomalies then nominals, and a uniform random subset of
/// each side no larger than its cap is marked as member.
pub fn truncated_constraint_set<R: Rng + ?Sized>(
    labels: &[Label],
    hf: &[usize],
    max_anomalies: usize,
    max_nominals: usize,
    rng: &mut R,
) -> ConstraintSet {
    let (ha, hn): (Vec<usize>, Vec<usize>) = hf.iter().partition(|&&i| labels[i].is_anomaly());
    if ha.len() <= max_anomalies && hn.len() <= max_nominals {
        return ConstraintSet::all(hf.to_vec());
    }

    let mut in_set = Vec::with_capacity(hf.len());
    in_set.extend(member_mask(ha.len(), max_anomalies, rng));
    in_set.extend(member_mask(hn.len(), max_nominals, rng));

    let mut reordered = ha;
    reordered.extend(hn);
    ConstraintSet { hf: reordered, in_set }
}

fn member_mask<R: Rng + ?Sized>(len: usize, cap: usize, rng: &mut R) -> Vec<bool> {
    if len <= cap {
        return vec![true; len];
    }
    let mut mask = vec![false; len];
    for i in sample(rng, len, cap).iter() {
        mask[i] = true;
    }
    mask
}

/// Costs and prior of one weight update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossParams<'a> {
    /// Anomaly-below-threshold cost
    pub ca: f64,
    /// Nominal-above-threshold cost
    pub cn: f64,
    /// Tau-anchor margin cost
    pub cx: f64,
    /// Gaussian prior mean and variance, when enabled
    pub prior: Option<(&'a [f64], f64)>,
}

/// Loss over a constraint set of the region feature matrix
#[derive(Debug, Clone)]
pub struct AadObjective<'a> {
    x: &'a FeatureMatrix,
    labels: &'a [Label],
    constraints: ConstraintSet,
    qval: f64,
    tau_instance: Option<usize>,
    params: LossParams<'a>,
    ensemble_score: EnsembleScore,
}

// Running sums of one loss or gradient evaluation
struct Terms {
    anomaly: f64,
    nominal: f64,
    n_anomaly: usize,
    n_nominal: usize,
}

impl<'a> AadObjective<'a> {
    /// Bind the data and threshold of one weight update
    pub fn new(
        x: &'a FeatureMatrix,
        labels: &'a [Label],
        constraints: ConstraintSet,
        qval: f64,
        tau_instance: Option<usize>,
        params: LossParams<'a>,
        ensemble_score: EnsembleScore,
    ) -> Self {
        Self { x, labels, constraints, qval, tau_instance, params, ensemble_score }
    }

    /// Instance indexes the loss is defined over
    pub fn hf(&self) -> &[usize] {
        &self.constraints.hf
    }

    fn link(&self, s: f64) -> f64 {
        match self.ensemble_score {
            EnsembleScore::Linear => s,
            EnsembleScore::Exponential => s.exp(),
        }
    }

    fn prior_loss(&self, w: &[f64]) -> f64 {
        match self.params.prior {
            Some((w_prior, sigma2)) => aad_core::math::squared_distance(w, w_prior) / (2.0 * sigma2),
            None => 0.0,
        }
    }

    // Calls `on_term(row, coef, is_anomaly)` for every row a term depends on;
    // `coef` multiplies the link derivative of that row's score. A tau term
    // reports both the instance and the anchor row.
    fn visit_terms<F>(&self, w: &[f64], rows: &[usize], mut on_term: F) -> Terms
    where
        F: FnMut(usize, f64, bool),
    {
        let p = &self.params;
        let q = self.link(self.qval);
        let anchor = self.tau_instance.map(|i| (i, self.link(self.x.row_dot(i, w))));
        let mut terms = Terms { anomaly: 0.0, nominal: 0.0, n_anomaly: 0, n_nominal: 0 };

        for &pos in rows {
            if !self.constraints.in_set[pos] {
                continue;
            }
            let i = self.constraints.hf[pos];
            let s = self.link(self.x.row_dot(i, w));
            let anomaly = self.labels[i].is_anomaly();

            if anomaly && s < q {
                terms.anomaly += p.ca * (q - s);
                terms.n_anomaly += 1;
                on_term(i, -p.ca, true);
            } else if !anomaly && s >= q {
                terms.nominal += p.cn * (s - q);
                terms.n_nominal += 1;
                on_term(i, p.cn, false);
            }

            if let Some((tau, t)) = anchor {
                if anomaly && s < t {
                    terms.anomaly += p.cx * (t - s);
                    terms.n_anomaly += 1;
                    on_term(i, -p.cx, true);
                    on_term(tau, p.cx, true);
                } else if !anomaly && s >= t {
                    terms.nominal += p.cx * (s - t);
                    terms.n_nominal += 1;
                    on_term(i, p.cx, false);
                    on_term(tau, -p.cx, false);
                }
            }
        }
        terms
    }
}

impl Objective for AadObjective<'_> {
    fn num_rows(&self) -> usize {
        self.constraints.hf.len()
    }

    fn loss(&self, w: &[f64], rows: &[usize]) -> f64 {
        let terms = self.visit_terms(w, rows, |_, _, _| {});
        terms.anomaly / terms.n_anomaly.max(1) as f64
            + terms.nominal / terms.n_nominal.max(1) as f64
            + self.prior_loss(w)
    }

    fn gradient(&self, w: &[f64], rows: &[usize]) -> Vec<f64> {
        let m = w.len();
        let mut grad_a = vec![0.0; m];
        let mut grad_n = vec![0.0; m];
        let exponential = self.ensemble_score == EnsembleScore::Exponential;

        let terms = self.visit_terms(w, rows, |row, coef, is_anomaly| {
            let scale = if exponential { self.x.row_dot(row, w).exp() } else { 1.0 };
            let out = if is_anomaly { &mut grad_a } else { &mut grad_n };
            self.x.add_scaled_row(row, coef * scale, out);
        });

        let na = terms.n_anomaly.max(1) as f64;
        let nn = terms.n_nominal.max(1) as f64;
        let mut grad: Vec<f64> = grad_a.iter().zip(&grad_n).map(|(a, n)| a / na + n / nn).collect();

        if let Some((w_prior, sigma2)) = self.params.prior {
            for ((g, wi), pi) in grad.iter_mut().zip(w).zip(w_prior) {
                *g += (wi - pi) / sigma2;
            }
        }
        grad
    }
}
