//! Phase operations: the closed set of per-chunk transforms.
//!
//! Every operation is pure: it reads one [`Chunk`] plus read-only
//! [`PhaseParams`] and returns a [`ChunkOutput`]. A chunk with nothing to
//! contribute yields `partial: None`, which the reducer skips.

use crate::combiners::{
    CombineFn, FirstValue, FractionSampler, GroupKey, GroupedAccumulators, Grouping, MaxF64,
};
use crate::config::SamplingConfig;
use crate::features::{Bins3, OPPORTUNITY_BINS, SENTIMENT_BINS};
use crate::io::Chunk;
use crate::metrics::PhaseStats;
use crate::schema::{self, Schema};
use crate::values::{parse_f64, parse_time_slice, parse_timestamp};
use anyhow::{Result, bail};
use csv::StringRecord;
use std::collections::{HashMap, HashSet};

/// Composite join key, one entry per key column.
pub type RowKey = Vec<String>;

/* ===================== partial results ===================== */

/// Keyed partial metrics of one chunk, keyed by `(IDLink, Platform)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyedPartial {
    /// Popularity at time index 1; first occurrence in the chunk wins.
    pub initial: HashMap<RowKey, Option<f64>>,
    /// Chunk-local maximum popularity.
    pub max: HashMap<RowKey, Option<f64>>,
}

/// Rows deduplicated on their first column, first occurrence kept.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UniqueRecords {
    pub columns: Vec<String>,
    pub rows: Vec<StringRecord>,
}

/// Randomly sampled rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleRows {
    pub columns: Vec<String>,
    pub rows: Vec<StringRecord>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PartialResult {
    Keyed(KeyedPartial),
    Unique(UniqueRecords),
    Grouped(GroupedAccumulators),
    Sample(SampleRows),
}

/// What one worker hands to the reducer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkOutput {
    pub partial: Option<PartialResult>,
    pub stats: PhaseStats,
}

/// Read-only parameters shared by every chunk of a phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseParams<'a> {
    pub sampling: &'a SamplingConfig,
    pub chunk_index: usize,
}

/// Grouping column for lifecycle curves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleKey {
    Topic,
    Platform,
}

impl LifecycleKey {
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Topic => schema::TOPIC,
            Self::Platform => schema::PLATFORM,
        }
    }
}

/* ===================== operations ===================== */

pub const PLATFORM_SENTIMENT: &str = "platform_sentiment";
pub const PLATFORM_COMPLEXITY: &str = "platform_complexity";
pub const PLATFORM_HOUR: &str = "platform_hour";
pub const PLATFORM_WEEKDAY: &str = "platform_weekday";
pub const PLATFORM_SOURCE_TIER: &str = "platform_source_tier";
pub const PLATFORM_OPPORTUNITY: &str = "platform_opportunity";
pub const LIFECYCLE: &str = "lifecycle";

const SENTIMENT_BIN: &str = "Sentiment_Bin";
const COMPLEXITY_BIN: &str = "Complexity_Bin";
const OPPORTUNITY_BIN: &str = "Opportunity_Bin";
const HOUR_OF_DAY: &str = "hour_of_day";
const DAY_OF_WEEK: &str = "day_of_week";

#[derive(Clone, Debug, PartialEq)]
pub enum PhaseOp {
    /// Initial value at time index 1 and partial max popularity per
    /// `(IDLink, Platform)`.
    VelocityExtract,
    /// Unique `(IDLink, Title, Headline)`.
    UniqueText,
    /// Unique `(IDLink, PublishDate, Topic)`.
    UniqueDate,
    /// Unique `(IDLink, Source)`.
    UniqueSource,
    /// Sample of positive `Title_Complexity` values.
    ComplexitySample { fraction: f64 },
    /// Platform x sentiment bin and platform x complexity bin sums/counts.
    ContentAggregate { complexity: Bins3 },
    /// Platform x hour, weekday, source tier and opportunity bin sums/counts.
    ContextAggregate,
    /// `(key, TimeSlice)` popularity sums/counts.
    Lifecycle { by: LifecycleKey },
    /// Sample of rows carrying every quadrant metric.
    QuadrantSample { fraction: f64 },
}

impl PhaseOp {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::VelocityExtract => "velocity_extract",
            Self::UniqueText => "unique_text",
            Self::UniqueDate => "unique_date",
            Self::UniqueSource => "unique_source",
            Self::ComplexitySample { .. } => "complexity_sample",
            Self::ContentAggregate { .. } => "content_aggregate",
            Self::ContextAggregate => "context_aggregate",
            Self::Lifecycle { .. } => "lifecycle",
            Self::QuadrantSample { .. } => "quadrant_sample",
        }
    }

    /// Columns this operation reads, resolved against `schema`.
    ///
    /// # Errors
    /// Fails when a required column is missing from the file.
    pub fn columns(&self, schema: &Schema) -> Result<Vec<&'static str>> {
        let cols: Vec<&'static str> = match self {
            Self::VelocityExtract => schema::VELOCITY_INPUT.to_vec(),
            Self::UniqueText => schema::TEXT_INPUT.to_vec(),
            Self::UniqueDate => schema::DATE_INPUT.to_vec(),
            Self::UniqueSource => schema::SOURCE_INPUT.to_vec(),
            Self::ComplexitySample { .. } => schema::COMPLEXITY_SAMPLE_INPUT.to_vec(),
            Self::ContentAggregate { .. } => schema::CONTENT_INPUT.to_vec(),
            Self::ContextAggregate => schema::CONTEXT_INPUT.to_vec(),
            Self::Lifecycle { by } => vec![by.column(), schema::TIME_SLICE, schema::POPULARITY],
            Self::QuadrantSample { .. } => {
                for c in schema::QUADRANT_REQUIRED {
                    schema.index_of(c)?;
                }
                return Ok(schema.present(schema::QUADRANT_INPUT));
            }
        };
        for c in &cols {
            if !schema.contains(c) {
                bail!("{} needs column {c:?}, absent from {:?}", self.name(), schema.columns());
            }
        }
        Ok(cols)
    }

    /// Run this operation over one chunk.
    ///
    /// # Errors
    /// Fails only when the chunk lacks a column the operation needs.
    pub fn apply(&self, chunk: &Chunk, params: &PhaseParams<'_>) -> Result<ChunkOutput> {
        let mut stats = PhaseStats::for_chunk(chunk.len());
        if chunk.is_empty() {
            return Ok(ChunkOutput {
                partial: None,
                stats,
            });
        }
        let partial = match self {
            Self::VelocityExtract => velocity(chunk, &mut stats)?,
            Self::UniqueText | Self::UniqueDate | Self::UniqueSource => unique(chunk, &mut stats),
            Self::ComplexitySample { fraction } => {
                complexity_sample(chunk, *fraction, params, &mut stats)?
            }
            Self::ContentAggregate { complexity } => content(chunk, complexity, &mut stats)?,
            Self::ContextAggregate => context(chunk, &mut stats)?,
            Self::Lifecycle { by } => lifecycle(chunk, *by, &mut stats)?,
            Self::QuadrantSample { fraction } => quadrant(chunk, *fraction, params, &mut stats)?,
        };
        if partial.is_none() {
            stats.empty_chunks += 1;
        }
        Ok(ChunkOutput { partial, stats })
    }
}

/// Non-empty categorical cell.
fn category(cell: &str) -> Option<&str> {
    let t = cell.trim();
    (!t.is_empty()).then_some(t)
}

fn velocity(chunk: &Chunk, stats: &mut PhaseStats) -> Result<Option<PartialResult>> {
    let id = chunk.index_of(schema::ID_LINK)?;
    let platform = chunk.index_of(schema::PLATFORM)?;
    let ts = chunk.index_of(schema::TIME_SLICE)?;
    let pop = chunk.index_of(schema::POPULARITY)?;

    let first = FirstValue::<f64>::new();
    let max = MaxF64;
    let mut out = KeyedPartial::default();
    for row in chunk.rows() {
        let key: RowKey = vec![row[id].to_string(), row[platform].to_string()];
        let value = parse_f64(&row[pop]);
        match parse_time_slice(&row[ts]) {
            Some(1) => {
                if let Some(v) = value {
                    let acc = out.initial.entry(key.clone()).or_insert_with(|| first.create());
                    first.add_input(acc, v);
                }
            }
            Some(_) => {}
            None => stats.temporal_drops += 1,
        }
        let acc = out.max.entry(key).or_insert_with(|| max.create());
        if let Some(v) = value {
            max.add_input(acc, v);
        }
    }
    stats.rows_emitted = out.max.len() as u64;
    Ok(Some(PartialResult::Keyed(out)))
}

fn unique(chunk: &Chunk, stats: &mut PhaseStats) -> Option<PartialResult> {
    let mut seen: HashSet<&str> = HashSet::new();
    let rows: Vec<StringRecord> = chunk
        .rows()
        .iter()
        .filter(|r| seen.insert(r.get(0).unwrap_or_default()))
        .cloned()
        .collect();
    stats.rows_emitted = rows.len() as u64;
    Some(PartialResult::Unique(UniqueRecords {
        columns: chunk.columns().to_vec(),
        rows,
    }))
}

fn complexity_sample(
    chunk: &Chunk,
    fraction: f64,
    params: &PhaseParams<'_>,
    stats: &mut PhaseStats,
) -> Result<Option<PartialResult>> {
    let c = chunk.index_of(schema::TITLE_COMPLEXITY)?;
    let candidates: Vec<usize> = (0..chunk.len())
        .filter(|&i| parse_f64(&chunk.rows()[i][c]).is_some_and(|v| v > 0.0))
        .collect();
    sample_rows(chunk, &candidates, fraction, params, stats)
}

fn quadrant(
    chunk: &Chunk,
    fraction: f64,
    params: &PhaseParams<'_>,
    stats: &mut PhaseStats,
) -> Result<Option<PartialResult>> {
    let required: Vec<usize> = schema::QUADRANT_REQUIRED
        .iter()
        .map(|c| chunk.index_of(c))
        .collect::<Result<_>>()?;
    let candidates: Vec<usize> = (0..chunk.len())
        .filter(|&i| {
            required
                .iter()
                .all(|&c| parse_f64(&chunk.rows()[i][c]).is_some())
        })
        .collect();
    sample_rows(chunk, &candidates, fraction, params, stats)
}

fn sample_rows(
    chunk: &Chunk,
    candidates: &[usize],
    fraction: f64,
    params: &PhaseParams<'_>,
    stats: &mut PhaseStats,
) -> Result<Option<PartialResult>> {
    if candidates.is_empty() {
        return Ok(None);
    }
    let ids: Vec<u64> = candidates.iter().map(|&i| chunk.offsets()[i]).collect();
    let sampler = FractionSampler::new(fraction, params.sampling, params.chunk_index);
    let rows: Vec<StringRecord> = sampler
        .select(&ids)
        .into_iter()
        .map(|k| chunk.rows()[candidates[k]].clone())
        .collect();
    stats.rows_emitted = rows.len() as u64;
    Ok(Some(PartialResult::Sample(SampleRows {
        columns: chunk.columns().to_vec(),
        rows,
    })))
}

/// Indices of the engagement metrics within `chunk`.
fn metric_indices(chunk: &Chunk) -> Result<Vec<usize>> {
    schema::ENGAGEMENT_METRICS
        .iter()
        .map(|m| chunk.index_of(m))
        .collect()
}

fn metric_values(row: &StringRecord, idx: &[usize]) -> Vec<Option<f64>> {
    idx.iter().map(|&i| parse_f64(&row[i])).collect()
}

fn key(parts: [&str; 2]) -> GroupKey {
    parts.iter().map(|s| (*s).to_string()).collect()
}

fn content(chunk: &Chunk, complexity: &Bins3, stats: &mut PhaseStats) -> Result<Option<PartialResult>> {
    let platform = chunk.index_of(schema::PLATFORM)?;
    let sentiment = chunk.index_of(schema::TITLE_SENTIMENT)?;
    let comp = chunk.index_of(schema::TITLE_COMPLEXITY)?;
    let metrics = metric_indices(chunk)?;

    let mut by_sentiment = Grouping::new(
        PLATFORM_SENTIMENT,
        &[schema::PLATFORM, SENTIMENT_BIN],
        schema::ENGAGEMENT_METRICS,
    );
    let mut by_complexity = Grouping::new(
        PLATFORM_COMPLEXITY,
        &[schema::PLATFORM, COMPLEXITY_BIN],
        schema::ENGAGEMENT_METRICS,
    );
    for row in chunk.rows() {
        let Some(p) = category(&row[platform]) else {
            continue;
        };
        let values = metric_values(row, &metrics);
        if let Some(bin) = SENTIMENT_BINS.label(parse_f64(&row[sentiment])) {
            by_sentiment.add_row(key([p, bin]), &values);
        }
        if let Some(bin) = complexity.label(parse_f64(&row[comp])) {
            by_complexity.add_row(key([p, bin]), &values);
        }
    }
    stats.rows_emitted = (by_sentiment.len() + by_complexity.len()) as u64;
    Ok(Some(PartialResult::Grouped(GroupedAccumulators::new(vec![
        by_sentiment,
        by_complexity,
    ]))))
}

fn context(chunk: &Chunk, stats: &mut PhaseStats) -> Result<Option<PartialResult>> {
    let platform = chunk.index_of(schema::PLATFORM)?;
    let date = chunk.index_of(schema::PUBLISH_DATE)?;
    let tier = chunk.index_of(schema::SOURCE_TIER)?;
    let opp = chunk.index_of(schema::OPPORTUNITY_SCORE)?;
    let metrics = metric_indices(chunk)?;

    let m = schema::ENGAGEMENT_METRICS;
    let mut hourly = Grouping::new(PLATFORM_HOUR, &[schema::PLATFORM, HOUR_OF_DAY], m);
    let mut weekly = Grouping::new(PLATFORM_WEEKDAY, &[schema::PLATFORM, DAY_OF_WEEK], m);
    let mut source = Grouping::new(PLATFORM_SOURCE_TIER, &[schema::PLATFORM, schema::SOURCE_TIER], m);
    let mut market = Grouping::new(PLATFORM_OPPORTUNITY, &[schema::PLATFORM, OPPORTUNITY_BIN], m);

    let mut kept = 0usize;
    for row in chunk.rows() {
        let Some(ts) = parse_timestamp(&row[date]) else {
            stats.temporal_drops += 1;
            continue;
        };
        kept += 1;
        let Some(p) = category(&row[platform]) else {
            continue;
        };
        let values = metric_values(row, &metrics);
        hourly.add_row(key([p, &ts.format("%H").to_string()]), &values);
        weekly.add_row(key([p, &ts.format("%A").to_string()]), &values);
        if let Some(t) = category(&row[tier]) {
            source.add_row(key([p, t]), &values);
        }
        if let Some(bin) = OPPORTUNITY_BINS.label(parse_f64(&row[opp])) {
            market.add_row(key([p, bin]), &values);
        }
    }
    if kept == 0 {
        return Ok(None);
    }
    stats.rows_emitted = kept as u64;
    Ok(Some(PartialResult::Grouped(GroupedAccumulators::new(vec![
        hourly, weekly, source, market,
    ]))))
}

fn lifecycle(chunk: &Chunk, by: LifecycleKey, stats: &mut PhaseStats) -> Result<Option<PartialResult>> {
    let k = chunk.index_of(by.column())?;
    let ts = chunk.index_of(schema::TIME_SLICE)?;
    let pop = chunk.index_of(schema::POPULARITY)?;

    let mut g = Grouping::new(LIFECYCLE, &[by.column(), schema::TIME_SLICE], &[schema::POPULARITY]);
    for row in chunk.rows() {
        let Some(slice) = parse_time_slice(&row[ts]) else {
            stats.temporal_drops += 1;
            continue;
        };
        let (Some(group), Some(v)) = (category(&row[k]), parse_f64(&row[pop])) else {
            continue;
        };
        g.add_row(key([group, &slice.to_string()]), &[Some(v)]);
        stats.rows_emitted += 1;
    }
    if g.is_empty() {
        return Ok(None);
    }
    Ok(Some(PartialResult::Grouped(GroupedAccumulators::new(vec![g]))))
}
