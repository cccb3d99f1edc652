//! Budgeted feedback loop
//!
//! Each round ranks all instances under the current weights, asks the query
//! strategy for one unqueried instance, reveals its label and updates the
//! weights from every label seen so far.
//!
//! ```text
//! Init -> Querying -> Updating -> Querying -> ... -> Done
//!                  \           \
//!                   `-----------`--> Aborted   (error in a round)
//! ```
//!
//! An aborted session keeps the weights of the last successful round.

use std::time::Instant;

use aad_core::math::order_descending;
use aad_core::{AadConfig, AadError, AadResult, FeatureMatrix, Label, QueryContext, QueryStrategy, TreeEnsemble};
use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::detector::AadForest;
use crate::persist::save_metrics;
use crate::query::initial_query_state;
use crate::update::BudgetTopK;

/// Position in the feedback state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeedbackState {
    /// Created, no round started
    #[default]
    Init,
    /// Choosing the next instance
    Querying,
    /// Running the weight update
    Updating,
    /// Budget used up
    Done,
    /// A round failed
    Aborted,
}

/// Labels gathered in one session
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackSession {
    ha: Vec<usize>,
    hn: Vec<usize>,
    queried: Vec<usize>,
    budget: usize,
    state: FeedbackState,
}

impl FeedbackSession {
    /// Session allowed `budget` rounds
    pub fn new(budget: usize) -> Self {
        Self { ha: Vec::new(), hn: Vec::new(), queried: Vec::new(), budget, state: FeedbackState::Init }
    }

    /// Current state
    pub fn state(&self) -> FeedbackState {
        self.state
    }

    /// Labeled anomalies used by the next update
    pub fn ha(&self) -> &[usize] {
        &self.ha
    }

    /// Labeled nominals used by the next update
    pub fn hn(&self) -> &[usize] {
        &self.hn
    }

    /// Every queried index in query order
    pub fn queried(&self) -> &[usize] {
        &self.queried
    }

    /// Round budget
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Rounds not yet started
    pub fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.queried.len())
    }

    fn hf(&self) -> Vec<usize> {
        self.ha.iter().chain(&self.hn).copied().collect()
    }

    fn record(&mut self, index: usize, label: Label, single_instance: bool) {
        self.queried.push(index);
        if single_instance {
            self.ha.clear();
            self.hn.clear();
        }
        if label.is_anomaly() {
            self.ha.push(index);
        } else {
            self.hn.push(index);
        }
    }

    /// Replace the labeled sets with the given ranked instances, split by label
    fn replace_with_ranked(&mut self, ranked: &[usize], labels: &[Label]) {
        let (ha, hn) = ranked.iter().copied().partition(|&i| labels[i].is_anomaly());
        self.ha = ha;
        self.hn = hn;
    }
}

/// Labeled data set and its region features for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble {
    /// Raw instances
    pub samples: Array2<f64>,
    /// Revealed labels
    pub labels: Vec<Label>,
    /// Region features
    pub scores: FeatureMatrix,
    /// Weights the aggregate scores were computed with
    pub weights: Option<Vec<f64>>,
    /// Initial weighted scores
    pub agg_scores: Vec<f64>,
    /// Row index of every instance in the source data
    pub original_indexes: Vec<usize>,
    /// Not computed; kept for metric files
    pub auc: f64,
}

impl Ensemble {
    /// Bundle a run's data; all row counts must agree
    pub fn new(
        samples: Array2<f64>,
        labels: Vec<Label>,
        scores: FeatureMatrix,
        weights: Option<Vec<f64>>,
        agg_scores: Vec<f64>,
    ) -> AadResult<Self> {
        let n = samples.nrows();
        for actual in [labels.len(), scores.nrows(), agg_scores.len()] {
            if actual != n {
                return Err(AadError::DimensionMismatch { expected: n, actual });
            }
        }
        Ok(Self {
            samples,
            labels,
            scores,
            weights,
            agg_scores,
            original_indexes: (0..n).collect(),
            auc: 0.0,
        })
    }

    /// Number of instances
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// No instances
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Per-round record of a session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AadMetrics {
    /// Dataset name
    pub dataset: String,
    /// File id
    pub fid: usize,
    /// Rerun index
    pub runidx: usize,
    /// Round budget
    pub budget: usize,
    /// Weights at the start of each round
    pub all_weights: Vec<Vec<f64>>,
    /// Queried indexes in query order
    pub queried: Vec<usize>,
    /// Labeled indexes handed to the optimizer in each round
    pub num_labeled: Vec<usize>,
    /// Held-out indexes reported by the query strategy in each round
    pub test_indexes: Vec<Vec<usize>>,
}

impl AadMetrics {
    fn new(config: &AadConfig, budget: usize) -> Self {
        Self {
            dataset: config.dataset.clone(),
            fid: config.fid,
            runidx: config.runidx,
            budget,
            all_weights: Vec::with_capacity(budget),
            queried: Vec::with_capacity(budget),
            num_labeled: Vec::with_capacity(budget),
            test_indexes: Vec::with_capacity(budget),
        }
    }
}

/// Anomalies discovered per query, against the unweighted ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AadRunSummary {
    /// `num_seen[i]`: true anomalies among the first `i + 1` queries
    pub num_seen: Vec<usize>,
    /// Same count over the initial ranking
    pub num_seen_baseline: Vec<usize>,
    /// Queried indexes in query order
    pub queried_indexes: Vec<usize>,
    /// Top of the initial ranking, one per round
    pub queried_indexes_baseline: Vec<usize>,
}

fn cumulative_anomalies(indexes: &[usize], labels: &[Label]) -> Vec<usize> {
    indexes
        .iter()
        .scan(0, |seen, &i| {
            if labels[i].is_anomaly() {
                *seen += 1;
            }
            Some(*seen)
        })
        .collect()
}

/// Compare a session's queries with simply walking down the initial ranking
pub fn summarize_num_seen(ensemble: &Ensemble, metrics: &AadMetrics) -> AadRunSummary {
    let queried_indexes = metrics.queried.clone();
    let queried_indexes_baseline: Vec<usize> = order_descending(&ensemble.agg_scores)
        .into_iter()
        .take(queried_indexes.len())
        .collect();
    AadRunSummary {
        num_seen: cumulative_anomalies(&queried_indexes, &ensemble.labels),
        num_seen_baseline: cumulative_anomalies(&queried_indexes_baseline, &ensemble.labels),
        queried_indexes,
        queried_indexes_baseline,
    }
}

impl<E: TreeEnsemble> AadForest<E> {
    /// Run a full session with the configured query strategy.
    ///
    /// Returns `None` without touching the weights when the budget is zero.
    pub fn learn_ensemble_weights_with_budget(&mut self, ensemble: &Ensemble) -> AadResult<Option<AadMetrics>> {
        let bt = BudgetTopK::new(ensemble.len(), &self.config().feedback);
        if bt.budget == 0 {
            debug!("feedback budget is zero, skipping session");
            return Ok(None);
        }
        let mut session = FeedbackSession::new(bt.budget);
        let mut query = initial_query_state(
            self.config().feedback.query_type,
            bt.top_k,
            bt.budget,
            self.config().detector.seed,
        );
        self.run_feedback_session(ensemble, &mut session, query.as_mut()).map(Some)
    }

    /// Run `session` to completion with a caller-supplied strategy
    pub fn run_feedback_session(
        &mut self,
        ensemble: &Ensemble,
        session: &mut FeedbackSession,
        query: &mut dyn QueryStrategy,
    ) -> AadResult<AadMetrics> {
        self.weights()?;
        if ensemble.scores.ncols() != self.n_regions() {
            return Err(AadError::DimensionMismatch { expected: self.n_regions(), actual: ensemble.scores.ncols() });
        }

        let mut metrics = AadMetrics::new(self.config(), session.budget);
        match self.feedback_rounds(ensemble, session, query, &mut metrics) {
            Ok(()) => {
                session.state = FeedbackState::Done;
                Ok(metrics)
            }
            Err(err) => {
                session.state = FeedbackState::Aborted;
                Err(err)
            }
        }
    }

    fn feedback_rounds(
        &mut self,
        ensemble: &Ensemble,
        session: &mut FeedbackSession,
        query: &mut dyn QueryStrategy,
        metrics: &mut AadMetrics,
    ) -> AadResult<()> {
        let n = ensemble.len();
        let feedback = self.config().feedback.clone();

        for i in session.queried.len()..session.budget {
            let started = Instant::now();
            session.state = FeedbackState::Querying;

            let w = self.weights()?.to_vec();
            let (order, scores) = self.order_by_score(&ensemble.scores, Some(&w))?;
            metrics.all_weights.push(w.clone());
            let hf = session.hf();
            let ctx = QueryContext {
                ordered_indexes: &order,
                queried: &session.queried,
                x: &ensemble.scores,
                labels: &ensemble.labels,
                scores: &scores,
                w: &w,
                hf: &hf,
                remaining_budget: session.budget - i,
            };
            let xi = query.next_query(&ctx)?;
            if xi >= n {
                return Err(AadError::InvalidQuery { index: xi, reason: "index out of range" });
            }
            if session.queried.contains(&xi) {
                return Err(AadError::InvalidQuery { index: xi, reason: "instance already queried" });
            }

            let label = ensemble.labels[xi];
            session.record(xi, label, feedback.single_inst_feedback);
            metrics.queried.push(xi);
            metrics.test_indexes.push(query.test_indexes());
            query.update_query_state(label.is_anomaly());

            if feedback.batch {
                session.replace_with_ranked(&order[..i], &ensemble.labels);
            }
            metrics.num_labeled.push(session.ha.len() + session.hn.len());

            session.state = FeedbackState::Updating;
            self.update_weights(&ensemble.scores, &ensemble.labels, &session.ha, &session.hn)?;

            let config = self.config();
            debug!(
                "Completed [{}] fid {} rerun {} feedback {} in {:?}",
                config.dataset,
                config.fid,
                config.runidx,
                i,
                started.elapsed()
            );
        }
        Ok(())
    }

    /// Score, run a session, save its metrics and summarize discoveries.
    ///
    /// `w` only affects the initial aggregate scores; the session starts from
    /// the detector's current weights. Returns `None` for a zero budget.
    pub fn run_aad(
        &mut self,
        samples: Array2<f64>,
        labels: Vec<Label>,
        x: FeatureMatrix,
        w: Option<Vec<f64>>,
    ) -> AadResult<Option<AadRunSummary>> {
        let started = Instant::now();
        let agg_scores = self.get_score(&x, w.as_deref())?;
        let ensemble = Ensemble::new(samples, labels, x, w, agg_scores)?;

        let Some(metrics) = self.learn_ensemble_weights_with_budget(&ensemble)? else {
            return Ok(None);
        };
        let config = self.config();
        save_metrics(&metrics, config.results_dir.as_deref(), &config.metrics_file_name())?;

        let summary = summarize_num_seen(&ensemble, &metrics);
        debug!("baseline: {:?}", summary.num_seen_baseline);
        debug!("num_seen: {:?}", summary.num_seen);
        info!(
            "Processed [{}] file {}, {} queries, {} anomalies found ({} baseline) in {:?}",
            config.dataset,
            config.fid,
            summary.queried_indexes.len(),
            summary.num_seen.last().copied().unwrap_or(0),
            summary.num_seen_baseline.last().copied().unwrap_or(0),
            started.elapsed()
        );
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aad_core::{ArrayTree, ScoreType, StaticEnsemble};
    use ndarray::array;

    fn detector(budget: usize) -> AadForest<StaticEnsemble> {
        let ensemble = StaticEnsemble::new(
            vec![
                ArrayTree::stump(2, 0, 0.5, 8, 2),
                ArrayTree::stump(2, 1, 0.5, 8, 2),
            ],
            10,
        )
        .unwrap();
        let mut config = AadConfig::default();
        config.detector.score_type = ScoreType::LeafInvSample;
        config.detector.leaf_only = true;
        config.feedback.budget = budget;
        config.feedback.top_k = 1;
        let mut det = AadForest::new(ensemble, config);
        det.fit().unwrap();
        det
    }

    fn data(det: &AadForest<StaticEnsemble>) -> Ensemble {
        let samples = array![[0.1, 0.1], [0.2, 0.3], [0.9, 0.9], [0.3, 0.2], [0.1, 0.9]];
        let labels = vec![Label::Nominal, Label::Nominal, Label::Anomaly, Label::Nominal, Label::Nominal];
        let x = det.transform_to_region_features(samples.view()).unwrap();
        let agg = det.get_score(&x, None).unwrap();
        Ensemble::new(samples, labels, x, None, agg).unwrap()
    }

    struct Repeating;

    impl QueryStrategy for Repeating {
        fn next_query(&mut self, _ctx: &QueryContext<'_>) -> AadResult<usize> {
            Ok(0)
        }

        fn update_query_state(&mut self, _rewarded: bool) {}
    }

    #[test]
    fn test_zero_budget_returns_none() {
        let mut det = detector(0);
        let ens = data(&det);
        let before = det.weights().unwrap().to_vec();
        assert_eq!(det.learn_ensemble_weights_with_budget(&ens).unwrap(), None);
        assert_eq!(det.weights().unwrap(), &before[..]);
    }

    #[test]
    fn test_session_records_rounds() {
        let mut det = detector(3);
        let ens = data(&det);
        let metrics = det.learn_ensemble_weights_with_budget(&ens).unwrap().unwrap();
        assert_eq!(metrics.all_weights.len(), 3);
        assert_eq!(metrics.queried.len(), 3);
        assert_eq!(metrics.num_labeled, vec![1, 2, 3]);
        let mut unique = metrics.queried.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_requeried_index_aborts() {
        let mut det = detector(2);
        let ens = data(&det);
        let mut session = FeedbackSession::new(2);
        let err = det.run_feedback_session(&ens, &mut session, &mut Repeating).unwrap_err();
        assert!(matches!(err, AadError::InvalidQuery { index: 0, .. }));
        assert_eq!(session.state(), FeedbackState::Aborted);
        assert_eq!(session.queried(), &[0]);
    }

    #[test]
    fn test_single_instance_feedback() {
        let mut det = detector(3);
        det.config_mut().feedback.single_inst_feedback = true;
        let ens = data(&det);
        let metrics = det.learn_ensemble_weights_with_budget(&ens).unwrap().unwrap();
        assert_eq!(metrics.num_labeled, vec![1, 1, 1]);
    }

    #[test]
    fn test_batch_feedback_uses_top_ranked() {
        let mut det = detector(3);
        det.config_mut().feedback.batch = true;
        let ens = data(&det);
        let metrics = det.learn_ensemble_weights_with_budget(&ens).unwrap().unwrap();
        assert_eq!(metrics.num_labeled, vec![0, 1, 2]);
    }

    #[test]
    fn test_summary_counts() {
        let ens = Ensemble::new(
            array![[0.0], [0.0], [0.0]],
            vec![Label::Anomaly, Label::Nominal, Label::Anomaly],
            FeatureMatrix::Dense(array![[1.0], [2.0], [3.0]]),
            None,
            vec![0.5, 0.9, 0.1],
        )
        .unwrap();
        let metrics = AadMetrics { queried: vec![2, 0], ..AadMetrics::default() };
        let summary = summarize_num_seen(&ens, &metrics);
        assert_eq!(summary.num_seen, vec![1, 2]);
        assert_eq!(summary.queried_indexes_baseline, vec![1, 0]);
        assert_eq!(summary.num_seen_baseline, vec![0, 1]);
    }

    #[test]
    fn test_ensemble_shape_check() {
        let err = Ensemble::new(
            array![[0.0], [0.0]],
            vec![Label::Anomaly],
            FeatureMatrix::Dense(array![[1.0], [2.0]]),
            None,
            vec![0.0, 0.0],
        )
        .unwrap_err();
        assert_eq!(err, AadError::DimensionMismatch { expected: 2, actual: 1 });
    }
}
