//! Mergeable accumulators used by phase operations and reducers.
//!
//! Every accumulator here is associative and commutative under `merge`, so
//! partial results from chunks can be combined in any completion order:
//!
//! - [`AverageF64`] -- `(sum, count)` per metric, finished as a weighted mean.
//! - [`MaxF64`] -- running maximum, ignoring missing values.
//! - [`FirstValue`] -- keeps the first value seen.
//! - [`SampleQuantiles`] -- concatenated sample, finished as quantile cut points.
//! - [`FractionSampler`] -- seeded fixed-fraction row sampling.
//!
//! Grouped accumulators ([`Grouping`], [`GroupedAccumulators`]) build on
//! [`SumCount`] and merge by adding sums and counts per group key.

mod basic;
mod quantiles;
mod sampling;
mod statistical;

pub use basic::{FirstValue, MaxF64, merge_keyed};
pub use quantiles::{SampleQuantiles, sample_quantile};
pub use sampling::{FractionSampler, SplitMix64, row_hash};
pub use statistical::{AverageF64, GroupKey, GroupRow, GroupedAccumulators, Grouping, SumCount};

/// A mergeable aggregation from inputs `V` through accumulator `A` to output `O`.
pub trait CombineFn<V, A, O>: Send + Sync {
    fn create(&self) -> A;
    fn add_input(&self, acc: &mut A, v: V);
    fn merge(&self, acc: &mut A, other: A);
    fn finish(&self, acc: A) -> O;
}
