//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Sampling seeds live here and are handed to each sampling call
//! explicitly; nothing reads a hidden global.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// How per-chunk random samples are drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplePolicy {
    /// Keep a row when a seeded hash of its byte offset falls under the
    /// fraction.
    /// The global sample is the same for every chunk count.
    #[default]
    RowHash,
    /// Exactly `round(fraction * rows)` rows per chunk, seed mixed with the
    /// range index.
    PerChunk,
    /// Exactly `round(fraction * rows)` rows per chunk, same seed for every
    /// chunk.
    FixedPerChunk,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub seed: u64,
    pub policy: SamplePolicy,
    /// Fraction of non-zero complexity values sampled for quantile estimation.
    pub quantile_fraction: f64,
    /// Fraction of fully populated rows kept for the quadrant sample.
    pub quadrant_fraction: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            policy: SamplePolicy::default(),
            quantile_fraction: 0.01,
            quadrant_fraction: 0.02,
        }
    }
}

/// Unique-article thresholds for source tiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceTierConfig {
    pub tier1_min_articles: u64,
    pub tier2_min_articles: u64,
}

impl Default for SourceTierConfig {
    fn default() -> Self {
        Self {
            tier1_min_articles: 100,
            tier2_min_articles: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker pool size. `None` uses every available core.
    pub threads: Option<usize>,
    pub delimiter: char,
    pub sampling: SamplingConfig,
    /// Lower and upper quantiles splitting titles into simple/standard/complex.
    pub complexity_quantiles: [f64; 2],
    pub source_tiers: SourceTierConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: None,
            delimiter: ',',
            sampling: SamplingConfig::default(),
            complexity_quantiles: [0.33, 0.66],
            source_tiers: SourceTierConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file.
    ///
    /// # Errors
    /// Fails when the file cannot be opened, is not valid JSON for this
    /// struct, or holds out-of-range values (see [`EngineConfig::validate`]).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Fails on a zero thread count, a non-ASCII delimiter, fractions outside
    /// `[0, 1]`, or unordered quantiles.
    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            bail!("threads must be at least 1");
        }
        if !self.delimiter.is_ascii() {
            bail!("delimiter {:?} is not a single byte", self.delimiter);
        }
        for (name, f) in [
            ("quantile_fraction", self.sampling.quantile_fraction),
            ("quadrant_fraction", self.sampling.quadrant_fraction),
        ] {
            if !(0.0..=1.0).contains(&f) {
                bail!("{name} = {f} is outside [0, 1]");
            }
        }
        let [lo, hi] = self.complexity_quantiles;
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo > hi {
            bail!("complexity_quantiles {lo}..{hi} must be ordered within [0, 1]");
        }
        if self.source_tiers.tier2_min_articles > self.source_tiers.tier1_min_articles {
            bail!("tier2_min_articles exceeds tier1_min_articles");
        }
        Ok(())
    }

    #[must_use]
    pub fn delimiter_byte(&self) -> u8 {
        // validate() guarantees ASCII
        self.delimiter as u8
    }

    #[must_use]
    pub fn worker_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_is_default() -> Result<()> {
        let mut f = tempfile::NamedTempFile::new()?;
        write!(f, "{{}}")?;
        let cfg = EngineConfig::from_json_file(f.path())?;
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.sampling.seed, 42);
        Ok(())
    }

    #[test]
    fn partial_override() -> Result<()> {
        let mut f = tempfile::NamedTempFile::new()?;
        write!(
            f,
            r#"{{"threads": 3, "sampling": {{"seed": 7, "policy": "per_chunk"}}}}"#
        )?;
        let cfg = EngineConfig::from_json_file(f.path())?;
        assert_eq!(cfg.worker_threads(), 3);
        assert_eq!(cfg.sampling.seed, 7);
        assert_eq!(cfg.sampling.policy, SamplePolicy::PerChunk);
        assert!((cfg.sampling.quadrant_fraction - 0.02).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn rejects_bad_fraction() {
        let mut cfg = EngineConfig::default();
        cfg.sampling.quantile_fraction = 1.5;
        assert!(cfg.validate().is_err());
    }
}
