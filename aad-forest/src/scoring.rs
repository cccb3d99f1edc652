//! Region scoring
//!
//! Turns each extracted region into a scalar anomaly contribution `d[r]`.
//! Larger values mean more anomalous. The policy is chosen once per detector
//! through [`ScoreType`].
//!
//! | Score type        | `d[r]`                                          |
//! |-------------------|-------------------------------------------------|
//! | `InvPathLen`      | `1 / path_length`                               |
//! | `InvPathLenExp`   | `2^-path_length`                                |
//! | `Const`           | `-1`                                            |
//! | `NegPathLen`      | `-path_length`                                  |
//! | `Hst`             | `-ln(samples + 1) + path_length`                |
//! | `Rsf`             | `-samples · exp(log_frac_vol)`                  |
//! | `RsfLog`          | `-ln(samples + 1) - log_frac_vol`               |
//! | `LeafInvSample`   | `1 / (path_length + c(samples))`                |
//!
//! `c(n)` is [`average_path_length`]. `OrigTree` has no per-region value.

use aad_core::math::average_path_length;
use aad_core::{AadError, AadResult, ScoreType};

use crate::region::Region;

/// Region scores and the counts they were computed from
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegionScores {
    /// Anomaly contribution per region
    pub d: Vec<f64>,
    /// Sample count per region
    pub node_samples: Vec<usize>,
    /// Sample count over the per-tree subsample size
    pub frac_instances: Vec<f64>,
}

/// Contribution of a single region
pub fn region_score(region: &Region, score_type: ScoreType) -> AadResult<f64> {
    let depth = region.path_length as f64;
    let samples = region.node_samples as f64;
    let d = match score_type {
        ScoreType::InvPathLen => 1.0 / depth,
        ScoreType::InvPathLenExp => 2f64.powf(-depth),
        ScoreType::Const => -1.0,
        ScoreType::NegPathLen => -depth,
        ScoreType::Hst => -(samples + 1.0).ln() + depth,
        ScoreType::Rsf => -samples * region.log_frac_vol.exp(),
        ScoreType::RsfLog => -(samples + 1.0).ln() - region.log_frac_vol,
        ScoreType::LeafInvSample => 1.0 / (depth + average_path_length(region.node_samples)),
        ScoreType::OrigTree => {
            return Err(AadError::UnsupportedConfig {
                reason: "orig_tree score type has no region scores",
            })
        }
    };
    Ok(d)
}

/// Score every region in id order
pub fn region_scores(regions: &[Region], score_type: ScoreType, max_samples: usize) -> AadResult<RegionScores> {
    let max_samples = max_samples.max(1) as f64;
    let mut scores = RegionScores {
        d: Vec::with_capacity(regions.len()),
        node_samples: Vec::with_capacity(regions.len()),
        frac_instances: Vec::with_capacity(regions.len()),
    };
    for region in regions {
        scores.d.push(region_score(region, score_type)?);
        scores.node_samples.push(region.node_samples);
        scores.frac_instances.push(region.node_samples as f64 / max_samples);
    }
    Ok(scores)
}

/// Value placed in the feature matrix for region `r` on a path of `k` nodes
pub fn instance_region_score(d: f64, score_type: ScoreType, k: usize) -> AadResult<f64> {
    match score_type {
        ScoreType::OrigTree => Err(AadError::UnsupportedConfig {
            reason: "orig_tree score type cannot be used for region features",
        }),
        t if t.is_unnormalized() => Ok(d),
        _ => Ok(d / k as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(path_length: usize, node_samples: usize, log_frac_vol: f64) -> Region {
        Region {
            bounds: vec![(f64::NEG_INFINITY, f64::INFINITY)],
            path_length,
            node_id: 1,
            sample_score: average_path_length(node_samples),
            node_samples,
            log_frac_vol,
        }
    }

    #[test]
    fn test_each_policy() {
        let r = region(2, 3, -1.5);
        let cases = [
            (ScoreType::InvPathLen, 0.5),
            (ScoreType::InvPathLenExp, 0.25),
            (ScoreType::Const, -1.0),
            (ScoreType::NegPathLen, -2.0),
            (ScoreType::Hst, -(4f64.ln()) + 2.0),
            (ScoreType::Rsf, -3.0 * (-1.5f64).exp()),
            (ScoreType::RsfLog, -(4f64.ln()) + 1.5),
            (ScoreType::LeafInvSample, 1.0 / (2.0 + average_path_length(3))),
        ];
        for (t, expected) in cases {
            let got = region_score(&r, t).unwrap();
            assert!((got - expected).abs() < 1e-12, "{}: {} != {}", t, got, expected);
        }
    }

    #[test]
    fn test_orig_tree_is_config_error() {
        assert!(region_score(&region(1, 1, 0.0), ScoreType::OrigTree).unwrap_err().is_config());
        assert!(instance_region_score(1.0, ScoreType::OrigTree, 1).is_err());
    }

    #[test]
    fn test_frac_instances() {
        let regions = vec![region(1, 64, 0.0), region(1, 192, 0.0)];
        let scores = region_scores(&regions, ScoreType::Const, 256).unwrap();
        assert_eq!(scores.frac_instances, vec![0.25, 0.75]);
        assert_eq!(scores.node_samples, vec![64, 192]);
        assert_eq!(scores.d, vec![-1.0, -1.0]);
    }

    #[test]
    fn test_transform_normalization() {
        assert_eq!(instance_region_score(3.0, ScoreType::Hst, 3).unwrap(), 3.0);
        assert_eq!(instance_region_score(3.0, ScoreType::LeafInvSample, 3).unwrap(), 1.0);
        assert_eq!(instance_region_score(-1.0, ScoreType::Const, 4).unwrap(), -1.0);
    }
}
