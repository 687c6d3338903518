//! Statistical combiners: `AverageF64` and grouped sum/count accumulators.

use super::CombineFn;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/* ===================== SumCount ===================== */

/// Partial sum and count of one metric.
///
/// Adding partials over every chunk yields the global sum and count, so the
/// global mean is `sum / count` and never a mean of chunk means.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SumCount {
    pub sum: f64,
    pub count: u64,
}

impl SumCount {
    pub fn add(&mut self, v: f64) {
        self.sum += v;
        self.count += 1;
    }

    pub fn merge(&mut self, other: Self) {
        self.sum += other.sum;
        self.count += other.count;
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/* ===================== AverageF64 ===================== */

/// Average of values as `f64`.
///
/// - Accumulator: [`SumCount`]
/// - Output: `Option<f64>`, `None` for an empty group
#[derive(Clone, Copy, Debug, Default)]
pub struct AverageF64;

impl CombineFn<f64, SumCount, Option<f64>> for AverageF64 {
    fn create(&self) -> SumCount {
        SumCount::default()
    }

    fn add_input(&self, acc: &mut SumCount, v: f64) {
        acc.add(v);
    }

    fn merge(&self, acc: &mut SumCount, other: SumCount) {
        acc.merge(other);
    }

    fn finish(&self, acc: SumCount) -> Option<f64> {
        acc.mean()
    }
}

/* ===================== Grouping ===================== */

/// Categorical group key, one entry per key column.
pub type GroupKey = Vec<String>;

/// Per-group [`SumCount`]s for a fixed list of metrics, each folded and
/// finished with [`AverageF64`].
#[derive(Clone, Debug, PartialEq)]
pub struct Grouping {
    pub name: String,
    pub key_columns: Vec<String>,
    pub metrics: Vec<String>,
    groups: HashMap<GroupKey, Vec<SumCount>>,
}

/// One flattened `(group, metric)` entry, for reports.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: GroupKey,
    pub metric: String,
    pub sum: f64,
    pub count: u64,
    pub mean: Option<f64>,
}

impl Grouping {
    pub fn new(name: &str, key_columns: &[&str], metrics: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            key_columns: key_columns.iter().map(|c| (*c).to_string()).collect(),
            metrics: metrics.iter().map(|c| (*c).to_string()).collect(),
            groups: HashMap::new(),
        }
    }

    /// Fold one row into group `key`. `values` is parallel to `metrics`;
    /// a missing value leaves that metric's count untouched.
    pub fn add_row(&mut self, key: GroupKey, values: &[Option<f64>]) {
        debug_assert_eq!(values.len(), self.metrics.len());
        let n = self.metrics.len();
        let accs = self
            .groups
            .entry(key)
            .or_insert_with(|| vec![AverageF64.create(); n]);
        for (acc, v) in accs.iter_mut().zip(values) {
            if let Some(v) = v {
                AverageF64.add_input(acc, *v);
            }
        }
    }

    /// Add `other`'s sums and counts into `self`.
    ///
    /// # Errors
    /// Fails when the two groupings track different keys or metrics.
    pub fn merge(&mut self, other: Self) -> Result<()> {
        if self.key_columns != other.key_columns || self.metrics != other.metrics {
            bail!(
                "cannot merge grouping {:?} ({:?} x {:?}) with {:?} ({:?} x {:?})",
                self.name,
                self.key_columns,
                self.metrics,
                other.name,
                other.key_columns,
                other.metrics
            );
        }
        for (k, accs) in other.groups {
            match self.groups.get_mut(&k) {
                Some(cur) => {
                    for (a, b) in cur.iter_mut().zip(accs) {
                        AverageF64.merge(a, b);
                    }
                }
                None => {
                    self.groups.insert(k, accs);
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Accumulator of `metric` for group `key`.
    #[must_use]
    pub fn get(&self, key: &[&str], metric: &str) -> Option<SumCount> {
        let m = self.metrics.iter().position(|x| x == metric)?;
        let key: GroupKey = key.iter().map(|s| (*s).to_string()).collect();
        self.groups.get(&key).map(|accs| accs[m])
    }

    /// Iterate over `(key, accumulators)` in arbitrary order.
    pub fn groups(&self) -> impl Iterator<Item = (&GroupKey, &[SumCount])> {
        self.groups.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Weighted mean of every metric per group, sorted by key.
    #[must_use]
    pub fn means(&self) -> BTreeMap<GroupKey, Vec<Option<f64>>> {
        self.groups
            .iter()
            .map(|(k, accs)| (k.clone(), accs.iter().map(|a| AverageF64.finish(*a)).collect()))
            .collect()
    }

    /// Flattened rows sorted by key then metric order.
    #[must_use]
    pub fn to_rows(&self) -> Vec<GroupRow> {
        let mut keys: Vec<&GroupKey> = self.groups.keys().collect();
        keys.sort();
        let mut out = Vec::with_capacity(keys.len() * self.metrics.len());
        for k in keys {
            for (metric, acc) in self.metrics.iter().zip(&self.groups[k]) {
                out.push(GroupRow {
                    key: k.clone(),
                    metric: metric.clone(),
                    sum: acc.sum,
                    count: acc.count,
                    mean: AverageF64.finish(*acc),
                });
            }
        }
        out
    }
}

/* ===================== GroupedAccumulators ===================== */

/// Several named groupings computed in one pass over a chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupedAccumulators {
    groupings: BTreeMap<String, Grouping>,
}

impl GroupedAccumulators {
    #[must_use]
    pub fn new(groupings: Vec<Grouping>) -> Self {
        Self {
            groupings: groupings.into_iter().map(|g| (g.name.clone(), g)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Grouping> {
        self.groupings.get(name)
    }

    /// Merge grouping-by-grouping; groupings only `other` has are adopted.
    ///
    /// # Errors
    /// Fails when a same-named grouping has a different shape.
    pub fn merge(&mut self, other: Self) -> Result<()> {
        for (name, g) in other.groupings {
            match self.groupings.get_mut(&name) {
                Some(cur) => cur.merge(g)?,
                None => {
                    self.groupings.insert(name, g);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(parts: &[&str]) -> GroupKey {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn average_is_weighted_not_mean_of_means() {
        let avg = AverageF64;
        let mut a = avg.create();
        avg.add_input(&mut a, 1.0);
        let mut b = avg.create();
        for v in [2.0, 2.0, 2.0] {
            avg.add_input(&mut b, v);
        }
        avg.merge(&mut a, b);
        let mean = avg.finish(a).unwrap();
        assert!((mean - 1.75).abs() < 1e-12);
    }

    #[test]
    fn missing_values_do_not_count() {
        let mut g = Grouping::new("g", &["Platform"], &["Popularity", "Initial_Velocity"]);
        g.add_row(key(&["Facebook"]), &[Some(4.0), None]);
        g.add_row(key(&["Facebook"]), &[Some(2.0), Some(1.0)]);
        let pop = g.get(&["Facebook"], "Popularity").unwrap();
        let vel = g.get(&["Facebook"], "Initial_Velocity").unwrap();
        assert_eq!((pop.sum, pop.count), (6.0, 2));
        assert_eq!((vel.sum, vel.count), (1.0, 1));
    }

    #[test]
    fn merge_adds_sums_and_counts() -> Result<()> {
        let mut a = Grouping::new("g", &["Platform"], &["Popularity"]);
        a.add_row(key(&["Facebook"]), &[Some(1.0)]);
        let mut b = Grouping::new("g", &["Platform"], &["Popularity"]);
        b.add_row(key(&["Facebook"]), &[Some(5.0)]);
        b.add_row(key(&["LinkedIn"]), &[Some(2.0)]);
        a.merge(b)?;
        assert_eq!(a.len(), 2);
        assert_eq!(a.get(&["Facebook"], "Popularity").unwrap().count, 2);
        assert_eq!(a.means()[&key(&["Facebook"])], vec![Some(3.0)]);
        Ok(())
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let mut a = Grouping::new("g", &["Platform"], &["Popularity"]);
        let b = Grouping::new("g", &["Topic"], &["Popularity"]);
        assert!(a.merge(b).is_err());
    }
}
