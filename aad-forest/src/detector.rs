//! Active anomaly detector over a tree ensemble
//!
//! [`AadForest`] owns everything that changes while an analyst gives
//! feedback: the region index extracted from the ensemble, the region scores
//! `d`, the current weights `w`, the uniform prior and the seeded RNG used by
//! the weight optimizer. The ensemble itself is only read, except for
//! streaming refreshes.
//!
//! ## Lifecycle
//!
//! ```text
//! new(ensemble, config) -> fit() -> transform_to_region_features(x)
//!                                -> get_score / order_by_score
//!                                -> update_weights(x, labels, ha, hn)   (repeated)
//! ```
//!
//! With `ScoreType::OrigTree` no regions are extracted and only the
//! ensemble's own `decision_function` is meaningful.

use std::time::Instant;

use aad_core::math::{order_descending, uniform_weights};
use aad_core::{
    AadConfig, AadError, AadResult, EnsembleScore, FeatureMatrix, Label, ScoreType, TreeEnsemble,
};
use log::{debug, info};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::region::RegionIndex;
use crate::scoring::{region_scores, RegionScores};
use crate::transform::FeatureTransformer;
use crate::update::forest_aad_weight_update;

/// Detector state for one ensemble
#[derive(Debug, Clone)]
pub struct AadForest<E: TreeEnsemble> {
    ensemble: E,
    config: AadConfig,
    regions: Option<RegionIndex>,
    scores: RegionScores,
    w: Option<Vec<f64>>,
    w_unif_prior: Option<Vec<f64>>,
    rng: StdRng,
}

impl<E: TreeEnsemble> AadForest<E> {
    /// Wrap a fitted ensemble; call [`AadForest::fit`] before use
    pub fn new(ensemble: E, config: AadConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.detector.seed);
        Self {
            ensemble,
            config,
            regions: None,
            scores: RegionScores::default(),
            w: None,
            w_unif_prior: None,
            rng,
        }
    }

    /// Rebuild a detector from persisted parts, recomputing region scores
    pub(crate) fn from_parts(
        ensemble: E,
        config: AadConfig,
        regions: Option<RegionIndex>,
        w: Option<Vec<f64>>,
        w_unif_prior: Option<Vec<f64>>,
    ) -> AadResult<Self> {
        let mut detector = Self::new(ensemble, config);
        if let Some(index) = &regions {
            detector.scores = region_scores(
                index.regions(),
                detector.config.detector.score_type,
                detector.ensemble.max_samples(),
            )?;
            for v in [&w, &w_unif_prior].into_iter().flatten() {
                if v.len() != index.len() {
                    return Err(AadError::Persistence(format!(
                        "weight vector has {} entries for {} regions",
                        v.len(),
                        index.len()
                    )));
                }
            }
        }
        detector.regions = regions;
        detector.w = w;
        detector.w_unif_prior = w_unif_prior;
        Ok(detector)
    }

    /// Extract regions, score them and start from uniform weights
    pub fn fit(&mut self) -> AadResult<()> {
        if self.ensemble.trees().is_empty() {
            return Err(AadError::NotFitted("ensemble has no trees"));
        }
        let score_type = self.config.detector.score_type;
        if score_type == ScoreType::OrigTree {
            info!("orig_tree score type: using the ensemble's own scores, no regions extracted");
            self.regions = None;
            self.scores = RegionScores::default();
            self.w = None;
            self.w_unif_prior = None;
            return Ok(());
        }

        let started = Instant::now();
        let trees = self.ensemble.trees();
        let leaf_only = self.config.detector.leaf_only;
        let index = if self.config.transform.parallel {
            RegionIndex::build_parallel(trees, leaf_only)
        } else {
            RegionIndex::build(trees, leaf_only)
        };
        self.scores = region_scores(index.regions(), score_type, self.ensemble.max_samples())?;

        let prior = uniform_weights(index.len());
        self.w = Some(prior.clone());
        self.w_unif_prior = Some(prior);
        info!(
            "extracted {} regions from {} trees ({}, leaf_only={}) in {:?}",
            index.len(),
            trees.len(),
            score_type,
            leaf_only,
            started.elapsed()
        );
        self.regions = Some(index);
        Ok(())
    }

    fn transformer(&self) -> AadResult<FeatureTransformer<'_>> {
        let index = self.regions.as_ref().ok_or_else(|| self.no_regions())?;
        FeatureTransformer::new(
            self.ensemble.trees(),
            index,
            &self.scores.d,
            self.config.detector.score_type,
            self.config.detector.leaf_only,
        )
    }

    fn no_regions(&self) -> AadError {
        if self.config.detector.score_type == ScoreType::OrigTree {
            AadError::UnsupportedConfig { reason: "orig_tree detectors have no region features" }
        } else {
            AadError::NotFitted("detector regions not extracted")
        }
    }

    /// Region feature matrix of `x`, laid out per the transform config
    pub fn transform_to_region_features(&self, x: ArrayView2<'_, f64>) -> AadResult<FeatureMatrix> {
        self.transformer()?.transform(x, &self.config.transform)
    }

    /// Weighted ensemble score of every row; `None` uses the current weights
    pub fn get_score(&self, x: &FeatureMatrix, w: Option<&[f64]>) -> AadResult<Vec<f64>> {
        let w = match w {
            Some(w) => w,
            None => self.weights()?,
        };
        if w.len() != x.ncols() {
            return Err(AadError::DimensionMismatch { expected: x.ncols(), actual: w.len() });
        }
        let linear = x.dot(w);
        Ok(match self.config.detector.ensemble_score {
            EnsembleScore::Linear => linear,
            EnsembleScore::Exponential => linear.into_iter().map(f64::exp).collect(),
        })
    }

    /// Row indexes by descending score, ties by index, with the scores
    pub fn order_by_score(&self, x: &FeatureMatrix, w: Option<&[f64]>) -> AadResult<(Vec<usize>, Vec<f64>)> {
        let scores = self.get_score(x, w)?;
        Ok((order_descending(&scores), scores))
    }

    /// One feedback update from labeled anomalies `ha` and nominals `hn`.
    ///
    /// Stored weights change only when the update succeeds.
    pub fn update_weights(&mut self, x: &FeatureMatrix, labels: &[Label], ha: &[usize], hn: &[usize]) -> AadResult<()> {
        let detector_type = self.config.detector.detector_type;
        if !detector_type.supports_forest_update() {
            return Err(AadError::UnsupportedConfig {
                reason: "detector type has no forest weight update",
            });
        }
        let w = self.w.as_deref().ok_or_else(|| self.no_regions())?;
        let unif = self.w_unif_prior.as_deref().ok_or_else(|| self.no_regions())?;
        let prior = if self.config.weights.unif_prior { unif } else { w };
        let hf: Vec<usize> = ha.iter().chain(hn).copied().collect();

        let w_new = forest_aad_weight_update(x, labels, w, &hf, prior, &self.config, &mut self.rng)?;
        debug!("weights updated from {} anomalies and {} nominals", ha.len(), hn.len());
        self.w = Some(w_new);
        Ok(())
    }

    /// Replace the current weights
    pub fn set_weights(&mut self, w: Vec<f64>) -> AadResult<()> {
        let n = self.n_regions();
        if self.regions.is_none() {
            return Err(self.no_regions());
        }
        if w.len() != n {
            return Err(AadError::DimensionMismatch { expected: n, actual: w.len() });
        }
        self.w = Some(w);
        Ok(())
    }

    /// Whether the ensemble keeps a stream buffer
    pub fn supports_streaming(&self) -> bool {
        self.ensemble.supports_streaming()
    }

    /// Buffer new instances in the ensemble
    pub fn add_samples(&mut self, x: ArrayView2<'_, f64>) -> AadResult<()> {
        if !self.supports_streaming() {
            return Err(AadError::StreamingUnsupported);
        }
        self.ensemble.add_samples(x)
    }

    /// Swap the buffered counts into the ensemble and rescore regions
    pub fn update_model_from_stream_buffer(&mut self) -> AadResult<()> {
        if !self.supports_streaming() {
            return Err(AadError::StreamingUnsupported);
        }
        self.ensemble.update_model_from_stream_buffer()?;
        self.update_region_scores()
    }

    /// Copy node counts into regions and recompute `d`
    pub fn update_region_scores(&mut self) -> AadResult<()> {
        let Some(index) = self.regions.as_mut() else {
            return Ok(());
        };
        index.refresh_node_samples(self.ensemble.trees());
        self.scores = region_scores(index.regions(), self.config.detector.score_type, self.ensemble.max_samples())?;
        debug!("rescored {} regions after stream refresh", index.len());
        Ok(())
    }

    /// Underlying ensemble
    pub fn ensemble(&self) -> &E {
        &self.ensemble
    }

    /// Detector configuration
    pub fn config(&self) -> &AadConfig {
        &self.config
    }

    /// Mutable configuration, for changing feedback settings between sessions
    pub fn config_mut(&mut self) -> &mut AadConfig {
        &mut self.config
    }

    /// Extracted regions, `None` before fit or with `OrigTree`
    pub fn regions(&self) -> Option<&RegionIndex> {
        self.regions.as_ref()
    }

    /// Region scores `d`
    pub fn d(&self) -> &[f64] {
        &self.scores.d
    }

    /// Region scores with their sample counts
    pub fn region_scores(&self) -> &RegionScores {
        &self.scores
    }

    /// Current weights
    pub fn weights(&self) -> AadResult<&[f64]> {
        self.w.as_deref().ok_or_else(|| self.no_regions())
    }

    /// Uniform unit-norm prior
    pub fn uniform_prior(&self) -> Option<&[f64]> {
        self.w_unif_prior.as_deref()
    }

    /// Number of region features
    pub fn n_regions(&self) -> usize {
        self.regions.as_ref().map_or(0, RegionIndex::len)
    }
}
