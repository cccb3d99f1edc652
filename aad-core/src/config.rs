//! Detector and session configuration
//!
//! All mode switches are closed enums. Names are parsed with `FromStr` (or
//! through serde in [`AadConfig::from_json_str`]); a name that matches no
//! variant is a configuration error at parse time, never a silent fallback.
//!
//! ## Sections
//!
//! - `detector`: ensemble family, region score policy, ensemble score, seed
//! - `weights`: loss costs, prior, constraint set caps and the solver
//! - `feedback`: budget, top-K, query strategy and feedback variants
//! - `transform`: feature representation and batching
//!
//! ```rust
//! use aad_core::config::{AadConfig, ScoreType};
//!
//! let config = AadConfig::from_json_str(r#"{
//!     "detector": { "score_type": "hst", "leaf_only": true },
//!     "feedback": { "budget": 20 }
//! }"#).unwrap();
//! assert_eq!(config.detector.score_type, ScoreType::Hst);
//! assert_eq!(config.feedback.budget, 20);
//! assert_eq!(config.weights.ca, 100.0);
//! ```

use core::fmt;
use core::str::FromStr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::feedback::{DEFAULT_CA, DEFAULT_CN, DEFAULT_CX, DEFAULT_PRIOR_SIGMA2};
use crate::constants::{
    DEFAULT_LEARNING_RATE, DEFAULT_MAX_BUDGET, DEFAULT_MAX_CONSTRAINT_SET, DEFAULT_MAX_EPOCHS,
    DEFAULT_SGD_BATCH_SIZE, DEFAULT_TAU, DEFAULT_TOLERANCE, DEFAULT_TRANSFORM_BATCH_SIZE,
};
use crate::errors::{AadError, AadResult};

/// Policy assigning an anomaly contribution to each region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    /// `1 / path_length`
    InvPathLen,
    /// `2^-path_length`
    InvPathLenExp,
    /// `-1` for every region
    Const,
    /// `-path_length`
    NegPathLen,
    /// `-ln(samples + 1) + path_length`
    Hst,
    /// `-samples · exp(log_frac_vol)`
    Rsf,
    /// `-ln(samples + 1) - log_frac_vol`
    RsfLog,
    /// `1 / (path_length + average_path_length(samples))`
    #[default]
    LeafInvSample,
    /// Use the ensemble's own score; no regions are extracted
    OrigTree,
}

impl ScoreType {
    /// All policies
    pub const ALL: [ScoreType; 9] = [
        Self::InvPathLen,
        Self::InvPathLenExp,
        Self::Const,
        Self::NegPathLen,
        Self::Hst,
        Self::Rsf,
        Self::RsfLog,
        Self::LeafInvSample,
        Self::OrigTree,
    ];

    /// Name used in configs and logs
    pub fn name(self) -> &'static str {
        match self {
            Self::InvPathLen => "inv_path_len",
            Self::InvPathLenExp => "inv_path_len_exp",
            Self::Const => "const",
            Self::NegPathLen => "neg_path_len",
            Self::Hst => "hst",
            Self::Rsf => "rsf",
            Self::RsfLog => "rsf_log",
            Self::LeafInvSample => "leaf_inv_sample",
            Self::OrigTree => "orig_tree",
        }
    }

    /// Region value is used as-is in the transform, without path normalization
    pub fn is_unnormalized(self) -> bool {
        matches!(self, Self::Const | Self::Hst | Self::Rsf | Self::RsfLog)
    }
}

impl fmt::Display for ScoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScoreType {
    type Err = AadError;

    fn from_str(s: &str) -> AadResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| AadError::UnknownScoreType(s.to_string()))
    }
}

/// How region scores combine into an instance score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleScore {
    /// `x·w`
    #[default]
    Linear,
    /// `exp(x·w)`
    Exponential,
}

/// Family of the underlying tree ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorType {
    /// Isolation forest
    #[default]
    IForest,
    /// Half-space trees
    HsTrees,
    /// Random split forest
    RsForest,
    /// Isolation forest with tree-gradient weight learning (no forest update)
    AtgpIForest,
}

impl DetectorType {
    /// All families
    pub const ALL: [DetectorType; 4] = [Self::IForest, Self::HsTrees, Self::RsForest, Self::AtgpIForest];

    /// Name used in configs and logs
    pub fn name(self) -> &'static str {
        match self {
            Self::IForest => "iforest",
            Self::HsTrees => "hs_trees",
            Self::RsForest => "rs_forest",
            Self::AtgpIForest => "atgp_iforest",
        }
    }

    /// Whether the forest margin-loss weight update applies
    pub fn supports_forest_update(self) -> bool {
        matches!(self, Self::IForest | Self::HsTrees | Self::RsForest)
    }
}

impl fmt::Display for DetectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DetectorType {
    type Err = AadError;

    fn from_str(s: &str) -> AadResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| AadError::UnknownDetectorType(s.to_string()))
    }
}

/// Extra margin constraints in the weight loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    /// Quantile margin only
    None,
    /// Also enforce a margin relative to the instance ranked at `top_k`
    #[default]
    TauInstance,
}

/// Built-in query strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Highest-ranked unqueried instance
    #[default]
    Deterministic,
    /// Uniform pick among the top-K unqueried instances
    TopRandom,
    /// Uniform pick among all unqueried instances
    Random,
}

/// Stochastic solver variant for the weight update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Plain mini-batch SGD
    Sgd,
    /// SGD with momentum
    Momentum,
    /// RMSProp adaptive learning rate
    #[default]
    RmsProp,
    /// Adam
    Adam,
}

/// Detector construction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Ensemble family
    pub detector_type: DetectorType,
    /// Region score policy
    pub score_type: ScoreType,
    /// Instance score combination
    pub ensemble_score: EnsembleScore,
    /// Extract leaf regions only
    pub leaf_only: bool,
    /// Seed for the detector's random source
    pub seed: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            detector_type: DetectorType::IForest,
            score_type: ScoreType::LeafInvSample,
            ensemble_score: EnsembleScore::Linear,
            leaf_only: false,
            seed: 42,
        }
    }
}

/// Stochastic solver parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Variant
    pub kind: SolverKind,
    /// Step size
    pub learning_rate: f64,
    /// Epoch cap
    pub max_epochs: usize,
    /// Mean epoch loss that counts as converged
    pub tolerance: f64,
    /// Rows per mini-batch
    pub batch_size: usize,
    /// Shuffle the labeled rows every epoch
    pub shuffle: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::RmsProp,
            learning_rate: DEFAULT_LEARNING_RATE,
            max_epochs: DEFAULT_MAX_EPOCHS,
            tolerance: DEFAULT_TOLERANCE,
            batch_size: DEFAULT_SGD_BATCH_SIZE,
            shuffle: true,
        }
    }
}

/// Weight-update loss parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    /// Cost for anomalies below the threshold
    pub ca: f64,
    /// Cost for nominals above the threshold
    pub cn: f64,
    /// Cost for tau-instance margin violations
    pub cx: f64,
    /// Prior variance
    pub prior_sigma2: f64,
    /// Add the Gaussian prior term
    pub with_prior: bool,
    /// Use the uniform prior instead of the current weights
    pub unif_prior: bool,
    /// Margin constraint family
    pub constraint_type: ConstraintType,
    /// Cap on labeled anomalies in the loss
    pub max_anomalies_in_constraint_set: usize,
    /// Cap on labeled nominals in the loss
    pub max_nominals_in_constraint_set: usize,
    /// Solver
    pub solver: SolverConfig,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            ca: DEFAULT_CA,
            cn: DEFAULT_CN,
            cx: DEFAULT_CX,
            prior_sigma2: DEFAULT_PRIOR_SIGMA2,
            with_prior: true,
            unif_prior: true,
            constraint_type: ConstraintType::TauInstance,
            max_anomalies_in_constraint_set: DEFAULT_MAX_CONSTRAINT_SET,
            max_nominals_in_constraint_set: DEFAULT_MAX_CONSTRAINT_SET,
            solver: SolverConfig::default(),
        }
    }
}

/// Feedback session parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Feedback rounds; 0 disables the loop, negative-like "unset" is not allowed
    pub budget: usize,
    /// Anomaly budget for the quantile threshold; 0 means `round(tau · n)`
    pub top_k: usize,
    /// Fraction of instances used when `top_k` is 0
    pub tau: f64,
    /// Upper bound on rounds
    pub max_budget: usize,
    /// Strategy picking the next query
    pub query_type: QueryType,
    /// Forget earlier feedback and update on the latest label only
    pub single_inst_feedback: bool,
    /// Replace feedback with the labeled top-`i` ranked instances
    pub batch: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            budget: 1,
            top_k: 0,
            tau: DEFAULT_TAU,
            max_budget: DEFAULT_MAX_BUDGET,
            query_type: QueryType::Deterministic,
            single_inst_feedback: false,
            batch: false,
        }
    }
}

/// Feature transform parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Produce a dense matrix instead of CSR
    pub dense: bool,
    /// Rows per sparse batch
    pub batch_size: usize,
    /// Compute decision paths per tree on the thread pool
    pub parallel: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            dense: false,
            batch_size: DEFAULT_TRANSFORM_BATCH_SIZE,
            parallel: false,
        }
    }
}

/// Complete configuration of one detector and its feedback sessions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AadConfig {
    /// Detector construction
    pub detector: DetectorConfig,
    /// Weight update
    pub weights: WeightConfig,
    /// Feedback loop
    pub feedback: FeedbackConfig,
    /// Feature transform
    pub transform: TransformConfig,
    /// Where metrics are written; unset or missing skips the save
    pub results_dir: Option<PathBuf>,
    /// Dataset name used in logs and metric file names
    pub dataset: String,
    /// File id within the dataset
    pub fid: usize,
    /// Rerun index
    pub runidx: usize,
}

impl AadConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(s: &str) -> AadResult<Self> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| AadError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check numeric ranges
    pub fn validate(&self) -> AadResult<()> {
        let w = &self.weights;
        if w.ca < 0.0 || w.cn < 0.0 || w.cx < 0.0 {
            return Err(AadError::InvalidConfig("costs must be non-negative".into()));
        }
        if w.solver.learning_rate <= 0.0 || !w.solver.learning_rate.is_finite() {
            return Err(AadError::InvalidConfig("learning_rate must be positive".into()));
        }
        if w.solver.batch_size == 0 {
            return Err(AadError::InvalidConfig("solver batch_size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.feedback.tau) {
            return Err(AadError::InvalidConfig(format!("tau {} outside [0, 1]", self.feedback.tau)));
        }
        if self.transform.batch_size == 0 {
            return Err(AadError::InvalidConfig("transform batch_size must be positive".into()));
        }
        Ok(())
    }

    /// File name for this run's metrics
    pub fn metrics_file_name(&self) -> String {
        let dataset = if self.dataset.is_empty() { "aad" } else { self.dataset.as_str() };
        format!("{}-metrics-fid{}-run{}.json", dataset, self.fid, self.runidx)
    }
}
