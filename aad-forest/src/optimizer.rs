//! Stochastic solvers for the weight update
//!
//! Every variant shares one epoch loop and differs only in the per-step
//! update rule:
//!
//! - **SGD**: `w -= lr·g`
//! - **Momentum**: `v = α·v - lr·g; w += v`
//! - **RMSProp** (default): `r = ρ·r + (1-ρ)·g²; w -= lr·g / sqrt(δ + r)`
//! - **Adam**: bias-corrected first and second moments
//!
//! ## Epoch Loop
//!
//! 1. Shuffle the row positions with the caller's RNG, unless everything fits
//!    in one mini-batch
//! 2. Step once per mini-batch of `batch_size` rows
//! 3. Evaluate the loss over all rows; a NaN aborts with `AadError::Numerical`
//! 4. Keep the best weights seen (pocket), stop once the loss drops below
//!    the tolerance
//!
//! The initial weights are evaluated too, so a run never returns anything
//! worse than `w0`.

use aad_core::constants::optimizer::{
    ADAM_BETA1, ADAM_BETA2, ADAM_DELTA, MOMENTUM_ALPHA, RMSPROP_DECAY, RMSPROP_DELTA,
};
use aad_core::{AadError, AadResult, Objective, Solver, SolverConfig, SolverKind};
use log::debug;
use rand::seq::SliceRandom;
use rand::RngCore;

/// Per-step update with its own running state
trait UpdateRule {
    fn step(&mut self, w: &mut [f64], grad: &[f64], learning_rate: f64);
}

fn run_epochs<U: UpdateRule>(
    name: &str,
    config: &SolverConfig,
    mut rule: U,
    w0: &[f64],
    objective: &dyn Objective,
    rng: &mut dyn RngCore,
) -> AadResult<Vec<f64>> {
    let n = objective.num_rows();
    if n == 0 {
        return Ok(w0.to_vec());
    }

    let all: Vec<usize> = (0..n).collect();
    let mut positions = all.clone();
    let batch_size = config.batch_size.max(1);

    let mut w = w0.to_vec();
    let mut best_w = w.clone();
    let mut best_loss = objective.loss(&w, &all);
    if best_loss.is_nan() {
        return Err(AadError::Numerical { reason: "loss is NaN at initial weights" });
    }

    let mut epochs = 0;
    while epochs < config.max_epochs && best_loss >= config.tolerance {
        epochs += 1;
        if config.shuffle && n > batch_size {
            positions.shuffle(rng);
        }
        for batch in positions.chunks(batch_size) {
            let grad = objective.gradient(&w, batch);
            rule.step(&mut w, &grad, config.learning_rate);
        }

        let loss = objective.loss(&w, &all);
        if loss.is_nan() {
            return Err(AadError::Numerical { reason: "loss became NaN" });
        }
        if loss < best_loss {
            best_loss = loss;
            best_w.copy_from_slice(&w);
        }
    }

    debug!("{}: {} rows, {} epochs, best loss {:.6}", name, n, epochs, best_loss);
    Ok(best_w)
}

struct PlainStep;

impl UpdateRule for PlainStep {
    fn step(&mut self, w: &mut [f64], grad: &[f64], learning_rate: f64) {
        for (wi, g) in w.iter_mut().zip(grad) {
            *wi -= learning_rate * g;
        }
    }
}

struct MomentumStep {
    velocity: Vec<f64>,
    alpha: f64,
}

impl UpdateRule for MomentumStep {
    fn step(&mut self, w: &mut [f64], grad: &[f64], learning_rate: f64) {
        for ((wi, vi), g) in w.iter_mut().zip(self.velocity.iter_mut()).zip(grad) {
            *vi = self.alpha * *vi - learning_rate * g;
            *wi += *vi;
        }
    }
}

struct RmsPropStep {
    mean_square: Vec<f64>,
    decay: f64,
    delta: f64,
}

impl UpdateRule for RmsPropStep {
    fn step(&mut self, w: &mut [f64], grad: &[f64], learning_rate: f64) {
        for ((wi, ri), g) in w.iter_mut().zip(self.mean_square.iter_mut()).zip(grad) {
            *ri = self.decay * *ri + (1.0 - self.decay) * g * g;
            *wi -= learning_rate * g / (self.delta + *ri).sqrt();
        }
    }
}

struct AdamStep {
    m: Vec<f64>,
    v: Vec<f64>,
    t: i32,
    beta1: f64,
    beta2: f64,
    delta: f64,
}

impl UpdateRule for AdamStep {
    fn step(&mut self, w: &mut [f64], grad: &[f64], learning_rate: f64) {
        self.t = self.t.saturating_add(1);
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);
        for (i, (wi, g)) in w.iter_mut().zip(grad).enumerate() {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * g;
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * g * g;
            let m_hat = self.m[i] / bias1;
            let v_hat = self.v[i] / bias2;
            *wi -= learning_rate * m_hat / (v_hat.sqrt() + self.delta);
        }
    }
}

/// Mini-batch gradient descent
#[derive(Debug, Clone, PartialEq)]
pub struct Sgd {
    config: SolverConfig,
}

impl Sgd {
    /// Solver with the given loop settings
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }
}

impl Solver for Sgd {
    fn minimize(&self, w0: &[f64], objective: &dyn Objective, rng: &mut dyn RngCore) -> AadResult<Vec<f64>> {
        run_epochs("sgd", &self.config, PlainStep, w0, objective, rng)
    }
}

/// Gradient descent with momentum
#[derive(Debug, Clone, PartialEq)]
pub struct Momentum {
    config: SolverConfig,
    alpha: f64,
}

impl Momentum {
    /// Solver with the given loop settings and the default momentum
    pub fn new(config: SolverConfig) -> Self {
        Self { config, alpha: MOMENTUM_ALPHA }
    }
}

impl Solver for Momentum {
    fn minimize(&self, w0: &[f64], objective: &dyn Objective, rng: &mut dyn RngCore) -> AadResult<Vec<f64>> {
        let rule = MomentumStep { velocity: vec![0.0; w0.len()], alpha: self.alpha };
        run_epochs("momentum", &self.config, rule, w0, objective, rng)
    }
}

/// RMSProp adaptive step size
#[derive(Debug, Clone, PartialEq)]
pub struct RmsProp {
    config: SolverConfig,
    decay: f64,
    delta: f64,
}

impl RmsProp {
    /// Solver with the given loop settings and default decay
    pub fn new(config: SolverConfig) -> Self {
        Self { config, decay: RMSPROP_DECAY, delta: RMSPROP_DELTA }
    }
}

impl Solver for RmsProp {
    fn minimize(&self, w0: &[f64], objective: &dyn Objective, rng: &mut dyn RngCore) -> AadResult<Vec<f64>> {
        let rule = RmsPropStep { mean_square: vec![0.0; w0.len()], decay: self.decay, delta: self.delta };
        run_epochs("rmsprop", &self.config, rule, w0, objective, rng)
    }
}

/// Adam
#[derive(Debug, Clone, PartialEq)]
pub struct Adam {
    config: SolverConfig,
    beta1: f64,
    beta2: f64,
    delta: f64,
}

impl Adam {
    /// Solver with the given loop settings and default moment decays
    pub fn new(config: SolverConfig) -> Self {
        Self { config, beta1: ADAM_BETA1, beta2: ADAM_BETA2, delta: ADAM_DELTA }
    }
}

impl Solver for Adam {
    fn minimize(&self, w0: &[f64], objective: &dyn Objective, rng: &mut dyn RngCore) -> AadResult<Vec<f64>> {
        let rule = AdamStep {
            m: vec![0.0; w0.len()],
            v: vec![0.0; w0.len()],
            t: 0,
            beta1: self.beta1,
            beta2: self.beta2,
            delta: self.delta,
        };
        run_epochs("adam", &self.config, rule, w0, objective, rng)
    }
}

/// Solver selected by `config.kind`
pub fn solver_for(config: &SolverConfig) -> Box<dyn Solver> {
    match config.kind {
        SolverKind::Sgd => Box::new(Sgd::new(config.clone())),
        SolverKind::Momentum => Box::new(Momentum::new(config.clone())),
        SolverKind::RmsProp => Box::new(RmsProp::new(config.clone())),
        SolverKind::Adam => Box::new(Adam::new(config.clone())),
    }
}
