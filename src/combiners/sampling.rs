//! Seeded fixed-fraction row sampling.

use crate::config::{SamplePolicy, SamplingConfig};

#[derive(Clone, Copy, Debug)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    #[inline]
    pub const fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        mix64(self.state)
    }

    /// Uniform in `[0, 1)`.
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn next_f64(&mut self) -> f64 {
        unit(self.next_u64())
    }

    /// Uniform in `[0, bound)`; `bound` must be non-zero.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_below(&mut self, bound: usize) -> usize {
        ((u128::from(self.next_u64()) * bound as u128) >> 64) as usize
    }
}

#[inline]
const fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[inline]
#[allow(clippy::cast_precision_loss)]
fn unit(x: u64) -> f64 {
    const SCALE: f64 = 1.0 / ((1u64 << 53) as f64);
    ((x >> 11) as f64) * SCALE
}

/// Seeded 64-bit hash of a row identity.
///
/// Rows are identified by their absolute byte offset in the source file,
/// which does not change with the chunk plan.
#[must_use]
pub const fn row_hash(seed: u64, row_id: u64) -> u64 {
    mix64(mix64(seed) ^ row_id.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Draws a fixed fraction of a chunk's rows.
///
/// The seed always comes from [`SamplingConfig`]; how it is applied depends on
/// the [`SamplePolicy`]:
/// - `RowHash`: Bernoulli per row on a seeded hash of its byte offset.
///   Whether a row is kept does not depend on which chunk it landed in.
/// - `PerChunk`: exactly `round(fraction * n)` rows, seed mixed with the range
///   index.
/// - `FixedPerChunk`: exactly `round(fraction * n)` rows, identical seed for
///   every chunk.
#[derive(Clone, Copy, Debug)]
pub struct FractionSampler {
    pub fraction: f64,
    pub seed: u64,
    pub policy: SamplePolicy,
    pub chunk_index: usize,
}

impl FractionSampler {
    #[must_use]
    pub const fn new(fraction: f64, config: &SamplingConfig, chunk_index: usize) -> Self {
        Self {
            fraction,
            seed: config.seed,
            policy: config.policy,
            chunk_index,
        }
    }

    /// Indices (ascending) into `row_ids` of the sampled rows. `row_ids`
    /// holds each candidate's absolute byte offset.
    #[must_use]
    pub fn select(&self, row_ids: &[u64]) -> Vec<usize> {
        match self.policy {
            SamplePolicy::RowHash => row_ids
                .iter()
                .enumerate()
                .filter_map(|(i, &id)| (unit(row_hash(self.seed, id)) < self.fraction).then_some(i))
                .collect(),
            SamplePolicy::PerChunk => {
                let seed = self.seed ^ mix64(self.chunk_index as u64 + 1);
                self.exact(row_ids.len(), seed)
            }
            SamplePolicy::FixedPerChunk => self.exact(row_ids.len(), self.seed),
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn exact(&self, n: usize, seed: u64) -> Vec<usize> {
        let k = ((self.fraction * n as f64).round_ties_even() as usize).min(n);
        let mut idx: Vec<usize> = (0..n).collect();
        let mut rng = SplitMix64::new(seed);
        // partial Fisher-Yates
        for i in 0..k {
            let j = i + rng.next_below(n - i);
            idx.swap(i, j);
        }
        idx.truncate(k);
        idx.sort_unstable();
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u64) -> Vec<u64> {
        (0..n).map(|i| i * 37 + 12).collect()
    }

    #[test]
    fn exact_policies_take_rounded_count() {
        let cfg = SamplingConfig {
            policy: SamplePolicy::FixedPerChunk,
            ..SamplingConfig::default()
        };
        let picked = FractionSampler::new(0.02, &cfg, 3).select(&ids(1000));
        assert_eq!(picked.len(), 20);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
        // chunk index is ignored under FixedPerChunk
        assert_eq!(FractionSampler::new(0.02, &cfg, 9).select(&ids(1000)), picked);
    }

    #[test]
    fn per_chunk_varies_with_index() {
        let cfg = SamplingConfig {
            policy: SamplePolicy::PerChunk,
            ..SamplingConfig::default()
        };
        let a = FractionSampler::new(0.1, &cfg, 0).select(&ids(500));
        let b = FractionSampler::new(0.1, &cfg, 1).select(&ids(500));
        assert_eq!(a.len(), 50);
        assert_ne!(a, b);
    }

    #[test]
    fn row_hash_is_position_free() {
        let cfg = SamplingConfig::default();
        let all = ids(2000);
        let whole = FractionSampler::new(0.1, &cfg, 0).select(&all);
        let (left, right) = all.split_at(777);
        let mut split = FractionSampler::new(0.1, &cfg, 0).select(left);
        split.extend(
            FractionSampler::new(0.1, &cfg, 1)
                .select(right)
                .into_iter()
                .map(|i| i + 777),
        );
        assert_eq!(whole, split);
        assert!(whole.len() > 120 && whole.len() < 280);
    }

    #[test]
    fn seed_changes_selection() {
        let a = SamplingConfig::default();
        let b = SamplingConfig { seed: 7, ..a.clone() };
        assert_ne!(
            FractionSampler::new(0.1, &a, 0).select(&ids(500)),
            FractionSampler::new(0.1, &b, 0).select(&ids(500))
        );
        assert_ne!(row_hash(1, 10), row_hash(2, 10));
    }
}
