//! Phase driver: plan, fan out over a fixed worker pool, reduce at the
//! barrier, and for merge phases fan out again to write shards.
//!
//! Each `par_iter().collect()` is a barrier: it returns only after every
//! range finished, and the first worker error fails the whole phase.

use crate::combiners::GroupedAccumulators;
use crate::config::EngineConfig;
use crate::features::{Bins3, SentimentScorer};
use crate::io::{ByteRange, plan_chunks, read_chunk, shard_header, shard_path};
use crate::merge::{merge_range, merged_schema};
use crate::metrics::PhaseStats;
use crate::phase::{LifecycleKey, PartialResult, PhaseOp, PhaseParams, SampleRows};
use crate::reduce::{
    KeyedLookup, reduce_grouped, reduce_market, reduce_quantiles, reduce_samples,
    reduce_source_tier, reduce_text, reduce_unique, reduce_velocity,
};
use crate::schema::Schema;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Every chunk's partial result of one Pass A, in range order.
#[derive(Debug)]
pub struct ScanOutput {
    pub schema: Schema,
    pub ranges: Vec<ByteRange>,
    /// Only chunks that produced something; empty chunks are left out.
    pub partials: Vec<PartialResult>,
    pub stats: PhaseStats,
}

/// Shards of one merge phase plus what is needed to reassemble them.
#[derive(Debug)]
pub struct MergeOutput {
    /// One shard per range, in range order.
    pub shards: Vec<PathBuf>,
    /// Column layout shared by every shard.
    pub schema: Schema,
    /// Header line to prepend once when concatenating shards.
    pub header: Vec<u8>,
    pub lookup: KeyedLookup,
    /// Pass A and reducer counters: chunks scanned, scoring failures,
    /// unparsable dates.
    pub scan: PhaseStats,
    /// Pass B counters: rows written, join misses, shards.
    pub stats: PhaseStats,
}

#[derive(Debug)]
pub struct AggregateOutput {
    pub groups: GroupedAccumulators,
    /// Complexity bins broadcast to the second pass, when there was one.
    pub complexity_bins: Option<Bins3>,
    pub stats: PhaseStats,
}

#[derive(Debug)]
pub struct SampleOutput {
    pub sample: SampleRows,
    pub stats: PhaseStats,
}

pub struct Engine {
    config: EngineConfig,
    pool: rayon::ThreadPool,
}

impl Engine {
    /// Build an engine with its own worker pool.
    ///
    /// # Errors
    /// Fails on an invalid config or when the pool cannot be created.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let threads = config.worker_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("build worker pool")?;
        debug!(threads, "engine ready");
        Ok(Self { config, pool })
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /* ===================== passes ===================== */

    /// Pass A: run `op` over every range of `input` and collect partials.
    ///
    /// # Errors
    /// Fails when planning, reading, or any single chunk fails.
    pub fn scan(&self, input: &Path, n_chunks: usize, op: &PhaseOp) -> Result<ScanOutput> {
        let started = Instant::now();
        let delimiter = self.config.delimiter_byte();
        let schema = Schema::from_file(input, delimiter)?;
        let columns = op.columns(&schema)?;
        let ranges = plan_chunks(input, n_chunks)?;
        info!(
            op = op.name(),
            input = %input.display(),
            chunks = ranges.len(),
            "scan start"
        );

        let sampling = &self.config.sampling;
        let outputs = self.pool.install(|| {
            ranges
                .par_iter()
                .map(|range| {
                    let chunk = read_chunk(input, range, &schema, Some(columns.as_slice()), delimiter)
                        .with_context(|| format!("{} chunk {}", op.name(), range.index))?;
                    let params = PhaseParams {
                        sampling,
                        chunk_index: range.index,
                    };
                    let out = op.apply(&chunk, &params)?;
                    debug!(
                        op = op.name(),
                        chunk = range.index,
                        rows = chunk.len(),
                        emitted = out.stats.rows_emitted,
                        "chunk done"
                    );
                    Ok(out)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut stats = PhaseStats::default();
        let mut partials = Vec::with_capacity(outputs.len());
        for out in outputs {
            stats.merge(&out.stats);
            partials.extend(out.partial);
        }
        stats.set_elapsed(started.elapsed());
        info!(
            op = op.name(),
            rows = stats.rows_scanned,
            empty_chunks = stats.empty_chunks,
            elapsed_ms = stats.elapsed_ms,
            "scan done"
        );
        Ok(ScanOutput {
            schema,
            ranges,
            partials,
            stats,
        })
    }

    /// Pass B: join every range against `lookup` and write one shard each to
    /// `out_dir`.
    ///
    /// Must only run once `lookup` is complete.
    ///
    /// # Errors
    /// Fails when `out_dir` cannot be created or any range fails to merge.
    pub fn merge_pass(
        &self,
        input: &Path,
        schema: &Schema,
        ranges: &[ByteRange],
        lookup: KeyedLookup,
        out_dir: &Path,
        prefix: &str,
    ) -> Result<MergeOutput> {
        let started = Instant::now();
        let delimiter = self.config.delimiter_byte();
        create_dir_all(out_dir).with_context(|| format!("mkdir -p {}", out_dir.display()))?;
        info!(prefix, shards = ranges.len(), out_dir = %out_dir.display(), "merge start");

        let shards: Vec<PathBuf> = ranges
            .iter()
            .map(|r| shard_path(out_dir, prefix, r))
            .collect();
        let per_shard = self.pool.install(|| {
            ranges
                .par_iter()
                .zip(shards.par_iter())
                .map(|(range, shard)| {
                    merge_range(input, range, schema, &lookup, shard, delimiter)
                        .with_context(|| format!("merge {prefix} chunk {}", range.index))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut stats = PhaseStats::default();
        for s in &per_shard {
            stats.merge(s);
        }
        stats.set_elapsed(started.elapsed());
        if stats.join_misses > 0 {
            warn!(prefix, join_misses = stats.join_misses, "rows filled with defaults");
        }
        info!(prefix, rows = stats.rows_emitted, elapsed_ms = stats.elapsed_ms, "merge done");

        let out_schema = merged_schema(schema, &lookup);
        let header = shard_header(&out_schema, delimiter)?;
        Ok(MergeOutput {
            shards,
            schema: out_schema,
            header,
            lookup,
            scan: PhaseStats::default(),
            stats,
        })
    }

    /* ===================== feature phases ===================== */

    /// `Initial_Velocity`, `Final_Score` and `Stickiness_Index` per
    /// `(IDLink, Platform)`.
    ///
    /// # Errors
    /// Fails when either pass fails.
    pub fn velocity_phase(&self, input: &Path, n_chunks: usize, out_dir: &Path) -> Result<MergeOutput> {
        let scan = self.scan(input, n_chunks, &PhaseOp::VelocityExtract)?;
        let lookup = reduce_velocity(scan.partials)?;
        info!(keys = lookup.len(), "velocity lookup built");
        self.finish_merge(input, scan.stats, &scan.schema, &scan.ranges, lookup, out_dir, "velocity")
    }

    /// Sentiment and complexity features per `IDLink`.
    ///
    /// # Errors
    /// Fails when either pass fails. A failing scorer is not an error.
    pub fn text_phase(
        &self,
        input: &Path,
        n_chunks: usize,
        out_dir: &Path,
        scorer: &dyn SentimentScorer,
    ) -> Result<MergeOutput> {
        let mut scan = self.scan(input, n_chunks, &PhaseOp::UniqueText)?;
        let unique = reduce_unique(scan.partials)?;
        let (lookup, failures) = self.pool.install(|| reduce_text(&unique, scorer))?;
        scan.stats.scoring_failures += failures;
        if failures > 0 {
            warn!(failures, "text fields scored as 0.0 after scorer failure");
        }
        info!(keys = lookup.len(), "text lookup built");
        self.finish_merge(input, scan.stats, &scan.schema, &scan.ranges, lookup, out_dir, "text")
    }

    /// `Opportunity_Score` per `IDLink`.
    ///
    /// # Errors
    /// Fails when either pass fails.
    pub fn market_phase(&self, input: &Path, n_chunks: usize, out_dir: &Path) -> Result<MergeOutput> {
        let mut scan = self.scan(input, n_chunks, &PhaseOp::UniqueDate)?;
        let unique = reduce_unique(scan.partials)?;
        let (lookup, dropped) = reduce_market(&unique)?;
        scan.stats.temporal_drops += dropped;
        if dropped > 0 {
            warn!(dropped, "articles with unparsable publish date");
        }
        info!(keys = lookup.len(), "market lookup built");
        self.finish_merge(input, scan.stats, &scan.schema, &scan.ranges, lookup, out_dir, "market")
    }

    /// `Source_Tier` per `IDLink`.
    ///
    /// # Errors
    /// Fails when either pass fails.
    pub fn source_tier_phase(&self, input: &Path, n_chunks: usize, out_dir: &Path) -> Result<MergeOutput> {
        let scan = self.scan(input, n_chunks, &PhaseOp::UniqueSource)?;
        let unique = reduce_unique(scan.partials)?;
        let lookup = reduce_source_tier(&unique, &self.config.source_tiers)?;
        info!(keys = lookup.len(), "source tier lookup built");
        self.finish_merge(input, scan.stats, &scan.schema, &scan.ranges, lookup, out_dir, "source_tier")
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_merge(
        &self,
        input: &Path,
        scan: PhaseStats,
        schema: &Schema,
        ranges: &[ByteRange],
        lookup: KeyedLookup,
        out_dir: &Path,
        prefix: &str,
    ) -> Result<MergeOutput> {
        let mut out = self.merge_pass(input, schema, ranges, lookup, out_dir, prefix)?;
        out.scan = scan;
        Ok(out)
    }

    /* ===================== aggregations ===================== */

    /// Two passes: estimate complexity quantiles from a pooled sample, then
    /// bin every row by sentiment and complexity.
    ///
    /// # Errors
    /// Fails when the sample is empty or either pass fails.
    pub fn content_aggregation(&self, input: &Path, n_chunks: usize) -> Result<AggregateOutput> {
        let sample = self.scan(
            input,
            n_chunks,
            &PhaseOp::ComplexitySample {
                fraction: self.config.sampling.quantile_fraction,
            },
        )?;
        let bins = reduce_quantiles(sample.partials, self.config.complexity_quantiles)?;
        info!(low = bins.low, high = bins.high, "complexity thresholds");

        let scan = self.scan(input, n_chunks, &PhaseOp::ContentAggregate { complexity: bins })?;
        let groups = reduce_grouped(scan.partials)?;
        let mut stats = sample.stats;
        stats.merge(&scan.stats);
        Ok(AggregateOutput {
            groups,
            complexity_bins: Some(bins),
            stats,
        })
    }

    /// Platform by hour, weekday, source tier and opportunity bin.
    ///
    /// # Errors
    /// Fails when the scan fails.
    pub fn context_aggregation(&self, input: &Path, n_chunks: usize) -> Result<AggregateOutput> {
        self.aggregate(input, n_chunks, &PhaseOp::ContextAggregate)
    }

    /// Mean popularity curve per topic or platform over time slices.
    ///
    /// # Errors
    /// Fails when the scan fails.
    pub fn lifecycle(&self, input: &Path, n_chunks: usize, by: LifecycleKey) -> Result<AggregateOutput> {
        self.aggregate(input, n_chunks, &PhaseOp::Lifecycle { by })
    }

    fn aggregate(&self, input: &Path, n_chunks: usize, op: &PhaseOp) -> Result<AggregateOutput> {
        let scan = self.scan(input, n_chunks, op)?;
        if scan.stats.temporal_drops > 0 {
            warn!(op = op.name(), dropped = scan.stats.temporal_drops, "rows with unparsable time");
        }
        Ok(AggregateOutput {
            groups: reduce_grouped(scan.partials)?,
            complexity_bins: None,
            stats: scan.stats,
        })
    }

    /// Fixed-fraction sample of rows carrying both velocity metrics.
    ///
    /// # Errors
    /// Fails when the file lacks those metrics or the scan fails.
    pub fn quadrant_sample(&self, input: &Path, n_chunks: usize) -> Result<SampleOutput> {
        let op = PhaseOp::QuadrantSample {
            fraction: self.config.sampling.quadrant_fraction,
        };
        let scan = self.scan(input, n_chunks, &op)?;
        Ok(SampleOutput {
            sample: reduce_samples(scan.partials)?,
            stats: scan.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use std::fs;

    fn engine() -> Result<Engine> {
        Engine::new(EngineConfig {
            threads: Some(2),
            ..EngineConfig::default()
        })
    }

    #[test]
    fn scan_skips_empty_chunks() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in.csv");
        fs::write(&input, "IDLink,Source\n1,AP\n2,AP\n")?;
        let scan = engine()?.scan(&input, 6, &PhaseOp::UniqueSource)?;
        assert_eq!(scan.ranges.len(), 6);
        assert_eq!(scan.stats.chunks, 6);
        assert_eq!(scan.stats.rows_scanned, 2);
        assert!(scan.partials.len() <= 2);
        Ok(())
    }

    #[test]
    fn missing_column_fails_phase() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in.csv");
        fs::write(&input, "IDLink,Platform\n1,Facebook\n")?;
        let err = engine()?.velocity_phase(&input, 2, dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains(schema::TIME_SLICE));
        Ok(())
    }

    #[test]
    fn source_tier_shards_cover_every_range() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in.csv");
        fs::write(&input, "IDLink,Source\n1,AP\n2,AP\n3,\n")?;
        let out = engine()?.source_tier_phase(&input, 3, &dir.path().join("shards"))?;
        assert_eq!(out.shards.len(), 3);
        assert!(out.shards.iter().all(|s| s.exists()));
        assert_eq!(out.header, b"IDLink,Source,Source_Tier\n");
        assert_eq!(out.stats.shards_written, 3);
        assert_eq!(out.stats.chunks, 3);
        assert_eq!(out.stats.rows_emitted, 3);
        assert_eq!(out.stats.join_misses, 1);
        // unique (IDLink, Source) records from the scan, kept apart from shard rows
        assert_eq!(out.scan.chunks, 3);
        assert_eq!(out.scan.rows_scanned, 3);
        Ok(())
    }
}
