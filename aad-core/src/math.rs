//! Shared numeric helpers
//!
//! Path-length normalization, ranking and vector utilities used by region
//! scoring, the weight update and the feedback loop.

use crate::constants::EULER_GAMMA;
use core::cmp::Ordering;

/// Average path length of an unsuccessful BST search over `n` samples.
///
/// Returns 1.0 for `n <= 1`, otherwise `2·(ln(n) + γ) − 2·(n−1)/n`. This is the
/// isolation-forest normalizer, so leaf depths are comparable across subtrees of
/// different sizes.
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 1.0;
    }
    let n = n as f64;
    2.0 * (n.ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}

/// Indexes of `scores` sorted by descending value.
///
/// The sort is stable, so ties keep ascending index order. NaN compares as
/// equal to everything and therefore never moves.
pub fn order_descending(scores: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    idx
}

/// Sample quantile with linear interpolation between order statistics.
///
/// `p` is a fraction in `[0, 1]` and is clamped. Returns NaN for an empty slice.
pub fn quantile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let p = p.clamp(0.0, 1.0);
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = h - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Dot product of two equally sized slices.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Uniform unit-norm vector of length `m`.
pub fn uniform_weights(m: usize) -> Vec<f64> {
    if m == 0 {
        return Vec::new();
    }
    let v = 1.0 / (m as f64).sqrt();
    vec![v; m]
}

/// Squared difference `‖a − b‖²`.
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Round half away from zero to the nearest count.
pub fn round_count(x: f64) -> usize {
    if x <= 0.0 || !x.is_finite() {
        return 0;
    }
    x.round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_path_length_small() {
        assert_eq!(average_path_length(0), 1.0);
        assert_eq!(average_path_length(1), 1.0);
        // 2(ln 2 + γ) - 1
        let expected = 2.0 * (2f64.ln() + EULER_GAMMA) - 1.0;
        assert!((average_path_length(2) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_average_path_length_increasing() {
        let mut prev = average_path_length(2);
        for n in 3..500 {
            let cur = average_path_length(n);
            assert!(cur > prev, "not increasing at n={}", n);
            prev = cur;
        }
    }

    #[test]
    fn test_order_descending_stable() {
        let s = [0.5, 0.9, 0.5, 0.1, 0.9];
        assert_eq!(order_descending(&s), vec![1, 4, 0, 2, 3]);
    }

    #[test]
    fn test_quantile_interpolates() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(quantile(&v, 0.0), 1.0);
        assert_eq!(quantile(&v, 1.0), 4.0);
        assert!((quantile(&v, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(&v, 0.9) - 3.7).abs() < 1e-12);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_uniform_weights_unit_norm() {
        let w = uniform_weights(7);
        assert!((dot(&w, &w) - 1.0).abs() < 1e-12);
        assert!(uniform_weights(0).is_empty());
    }

    #[test]
    fn test_round_count() {
        assert_eq!(round_count(0.03 * 100.0), 3);
        assert_eq!(round_count(2.5), 3);
        assert_eq!(round_count(-1.0), 0);
    }
}
