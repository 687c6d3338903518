//! # Newsflow
//!
//! A **chunked parallel scan/merge engine** for per-article news popularity
//! metrics over delimited files too large to load as one table.
//!
//! ## Key Features
//!
//! - **Newline-aligned planning** - split a file into byte ranges that never cut a row
//! - **Independent readers** - every worker opens the file and seeks to its own range
//! - **Closed set of phase operations** - one [`PhaseOp`] enum, one `apply` per chunk
//! - **Mergeable partials** - first-wins, max, sum/count and pooled samples
//! - **Two-pass merges** - build a global lookup, then join it back shard by shard
//! - **Weighted means** - group means rebuilt from sums and counts, never from chunk means
//! - **Quantile-then-bin** - thresholds estimated from a sample, broadcast to a re-scan
//! - **Deterministic sampling** - the seed is configuration, not a hidden constant
//!
//! ## Quick Start
//!
//! ```no_run
//! use newsflow::{Engine, EngineConfig, LexiconScorer};
//! use newsflow::testing::concat_shards;
//! use std::path::Path;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let engine = Engine::new(EngineConfig::default())?;
//! let input = Path::new("news.csv");
//!
//! // Initial_Velocity, Final_Score, Stickiness_Index per (IDLink, Platform)
//! let velocity = engine.velocity_phase(input, 8, Path::new("out/velocity"))?;
//! concat_shards(&velocity.header, &velocity.shards, "news_velocity.csv")?;
//!
//! // Sentiment and complexity per IDLink, with a pluggable scorer
//! let text = engine.text_phase(
//!     Path::new("news_velocity.csv"),
//!     8,
//!     Path::new("out/text"),
//!     &LexiconScorer::default(),
//! )?;
//! text.stats.print("text");
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Ranges and chunks
//!
//! [`plan_chunks`] returns exactly `n` contiguous [`ByteRange`]s covering the
//! file. [`read_chunk`] parses one range into a [`Chunk`]: the range starting
//! at offset 0 carries the header, every other range is named from the
//! [`Schema`] read once up front.
//!
//! ### Phases
//!
//! A phase is one [`PhaseOp`] applied to every chunk in parallel, followed by
//! a reducer (see [`reduce`]) that runs only after all chunks finished. Merge
//! phases then re-read every range and write one headerless shard per range;
//! [`testing::concat_shards`] puts them back together under a single header.
//!
//! ### Degradations are counted, not raised
//!
//! Empty chunks, failing text scores, unparsable timestamps and join misses
//! are tallied in [`PhaseStats`]. Unreadable files, schema mismatches and
//! malformed rows fail the phase.
//!
//! ## Module Overview
//!
//! - [`schema`] - column names and per-operation column subsets
//! - [`io`] - chunk planning, range reading and shard writing
//! - [`phase`] - per-chunk operations and their partial results
//! - [`combiners`] - mergeable accumulators and samplers
//! - [`reduce`] - cross-chunk reducers and the keyed lookup
//! - [`merge`] - Pass B join-and-write for one range
//! - [`engine`] - worker pool and phase drivers
//! - [`features`] - per-record scoring and binning rules
//! - [`config`] - engine configuration
//! - [`metrics`] - per-phase counters
//! - [`testing`] - fixtures and helpers for tests

pub mod combiners;
pub mod config;
pub mod engine;
pub mod features;
pub mod io;
pub mod merge;
pub mod metrics;
pub mod phase;
pub mod reduce;
pub mod schema;
pub mod testing;
pub mod values;

pub use combiners::{CombineFn, GroupedAccumulators, Grouping, SumCount};
pub use config::{EngineConfig, SamplePolicy, SamplingConfig, SourceTierConfig};
pub use engine::{AggregateOutput, Engine, MergeOutput, SampleOutput, ScanOutput};
pub use features::{Bins3, LexiconScorer, SentimentScorer, TextFeatures};
pub use io::{ByteRange, Chunk, plan_chunks, read_chunk};
pub use metrics::PhaseStats;
pub use phase::{ChunkOutput, LifecycleKey, PartialResult, PhaseOp, PhaseParams};
pub use reduce::KeyedLookup;
pub use schema::Schema;
