//! Per-phase counters and reporting.
//!
//! Workers never share counters: each returns its own [`PhaseStats`] next to
//! its partial result and the reducer sums them, the same way partial
//! aggregates are merged.
//!
//! # Example
//!
//! ```no_run
//! use newsflow::metrics::PhaseStats;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut total = PhaseStats::default();
//! total.merge(&PhaseStats { rows_scanned: 10, join_misses: 1, ..PhaseStats::default() });
//! total.print("velocity");
//! total.save_to_file("velocity_stats.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Data-quality and volume counters for one phase run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PhaseStats {
    pub chunks: u64,
    /// Chunks with no rows after parsing or filtering.
    pub empty_chunks: u64,
    pub rows_scanned: u64,
    /// Records, samples, or shard rows produced.
    pub rows_emitted: u64,
    /// Merge rows whose key had no lookup entry and got the default fill.
    pub join_misses: u64,
    /// Text fields whose score fell back to `0.0`.
    pub scoring_failures: u64,
    /// Rows dropped from time-dependent aggregations for an unparsable
    /// timestamp or time index.
    pub temporal_drops: u64,
    pub shards_written: u64,
    pub elapsed_ms: u64,
}

impl PhaseStats {
    /// Stats for one scanned chunk of `rows` rows.
    #[must_use]
    pub fn for_chunk(rows: usize) -> Self {
        Self {
            chunks: 1,
            empty_chunks: u64::from(rows == 0),
            rows_scanned: rows as u64,
            ..Self::default()
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.chunks += other.chunks;
        self.empty_chunks += other.empty_chunks;
        self.rows_scanned += other.rows_scanned;
        self.rows_emitted += other.rows_emitted;
        self.join_misses += other.join_misses;
        self.scoring_failures += other.scoring_failures;
        self.temporal_drops += other.temporal_drops;
        self.shards_written += other.shards_written;
        self.elapsed_ms += other.elapsed_ms;
    }

    pub fn set_elapsed(&mut self, d: Duration) {
        self.elapsed_ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
    }

    #[must_use]
    pub fn to_json(&self, phase: &str) -> Value {
        json!({ "phase": phase, "stats": self })
    }

    pub fn print(&self, phase: &str) {
        println!("\n========== Phase Stats: {phase} ==========");
        println!("chunks:           {} ({} empty)", self.chunks, self.empty_chunks);
        println!("rows scanned:     {}", self.rows_scanned);
        println!("rows emitted:     {}", self.rows_emitted);
        println!("join misses:      {}", self.join_misses);
        println!("scoring failures: {}", self.scoring_failures);
        println!("temporal drops:   {}", self.temporal_drops);
        println!("shards written:   {}", self.shards_written);
        println!("elapsed:          {} ms", self.elapsed_ms);
        println!("==========================================\n");
    }

    /// # Errors
    /// Fails when the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let stem = path
            .file_stem()
            .map_or_else(|| "phase".into(), |s| s.to_string_lossy());
        serde_json::to_writer_pretty(&mut f, &self.to_json(&stem))?;
        f.write_all(b"\n")?;
        Ok(())
    }
}
