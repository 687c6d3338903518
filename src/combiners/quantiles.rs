//! Quantile cut points from a pooled random sample.
//!
//! Exact quantiles over the full file would need a global sort. Instead each
//! chunk contributes a small sample, the samples are pooled, and quantiles are
//! read off the pooled sample with linear interpolation between order
//! statistics.

use super::CombineFn;
use ordered_float::OrderedFloat;

/// Quantile `q` of `values` (linear interpolation between closest ranks).
///
/// Sorts `values` in place. Returns `None` for an empty slice; `q` is
/// clamped to `[0, 1]`. NaNs sort last and should be filtered by the caller.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn sample_quantile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by_key(|v| OrderedFloat(*v));
    let q = q.clamp(0.0, 1.0);
    let pos = q * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some((values[hi] - values[lo]).mul_add(frac, values[lo]))
}

/// Pools sampled values across chunks and finishes as the requested quantiles.
///
/// - Accumulator: `Vec<f64>` (the pooled sample)
/// - Output: `Option<Vec<f64>>`, `None` when nothing was sampled
#[derive(Clone, Debug)]
pub struct SampleQuantiles {
    pub qs: Vec<f64>,
}

impl SampleQuantiles {
    #[must_use]
    pub fn new(qs: &[f64]) -> Self {
        Self { qs: qs.to_vec() }
    }
}

impl CombineFn<f64, Vec<f64>, Option<Vec<f64>>> for SampleQuantiles {
    fn create(&self) -> Vec<f64> {
        Vec::new()
    }

    fn add_input(&self, acc: &mut Vec<f64>, v: f64) {
        if v.is_finite() {
            acc.push(v);
        }
    }

    fn merge(&self, acc: &mut Vec<f64>, mut other: Vec<f64>) {
        acc.append(&mut other);
    }

    fn finish(&self, mut acc: Vec<f64>) -> Option<Vec<f64>> {
        if acc.is_empty() {
            return None;
        }
        self.qs
            .iter()
            .map(|&q| sample_quantile(&mut acc, q))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_like_linear_method() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(sample_quantile(&mut v, 0.0), Some(1.0));
        assert_eq!(sample_quantile(&mut v, 1.0), Some(4.0));
        assert_eq!(sample_quantile(&mut v, 0.5), Some(2.5));
        let q33 = sample_quantile(&mut v, 0.33).unwrap();
        assert!((q33 - 1.99).abs() < 1e-9);
    }

    #[test]
    fn empty_sample_has_no_quantiles() {
        let sq = SampleQuantiles::new(&[0.33, 0.66]);
        assert_eq!(sq.finish(sq.create()), None);
        assert_eq!(sample_quantile(&mut [], 0.5), None);
    }

    #[test]
    fn pooled_order_does_not_matter() {
        let sq = SampleQuantiles::new(&[0.25, 0.75]);
        let mut a = vec![1.0, 9.0, 5.0];
        let b = vec![3.0, 7.0];
        sq.merge(&mut a, b.clone());
        let mut c = b;
        sq.merge(&mut c, vec![5.0, 1.0, 9.0]);
        assert_eq!(sq.finish(a), sq.finish(c));
    }
}
