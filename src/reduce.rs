//! Reducers: fold every chunk's partial result into one authoritative
//! structure. They run after the phase barrier, so they see all chunks.
//!
//! Partials arrive in range order. Combinations are associative and
//! commutative except for first-wins merges, where range order decides.

use crate::combiners::{
    CombineFn, FirstValue, GroupedAccumulators, MaxF64, SampleQuantiles, merge_keyed,
};
use crate::config::SourceTierConfig;
use crate::features::{
    Bins3, COMPLEXITY_LABELS, SentimentScorer, TextFeatures, UNRANKED, opportunity_score,
    source_tier,
};
use crate::phase::{KeyedPartial, PartialResult, RowKey, SampleRows, UniqueRecords};
use crate::schema;
use crate::values::{Field, parse_f64, parse_timestamp};
use anyhow::{Result, anyhow, bail};
use chrono::NaiveDate;
use csv::StringRecord;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/* ===================== KeyedLookup ===================== */

/// A phase's global key to feature-values table, joined back in Pass B.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyedLookup {
    pub key_columns: Vec<&'static str>,
    pub value_columns: Vec<&'static str>,
    /// Fill for rows whose key has no entry.
    pub defaults: Vec<Field>,
    map: HashMap<RowKey, Vec<Field>>,
}

impl KeyedLookup {
    #[must_use]
    pub fn new(
        key_columns: &[&'static str],
        value_columns: &[&'static str],
        defaults: Vec<Field>,
    ) -> Self {
        debug_assert_eq!(value_columns.len(), defaults.len());
        Self {
            key_columns: key_columns.to_vec(),
            value_columns: value_columns.to_vec(),
            defaults,
            map: HashMap::new(),
        }
    }

    /// Insert unless `key` is already present. Returns whether it was new.
    pub fn insert(&mut self, key: RowKey, values: Vec<Field>) -> bool {
        debug_assert_eq!(values.len(), self.value_columns.len());
        if self.map.contains_key(&key) {
            return false;
        }
        self.map.insert(key, values);
        true
    }

    #[must_use]
    pub fn get(&self, key: &[&str]) -> Option<&[Field]> {
        let key: RowKey = key.iter().map(|s| (*s).to_string()).collect();
        self.map.get(&key).map(Vec::as_slice)
    }

    /// Lookup by a record's key cells at `key_idx`.
    #[must_use]
    pub fn get_record(&self, row: &StringRecord, key_idx: &[usize]) -> Option<&[Field]> {
        let key: RowKey = key_idx.iter().map(|&i| row[i].to_string()).collect();
        self.map.get(&key).map(Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn wrong_partial(phase: &str, got: &PartialResult) -> anyhow::Error {
    let kind = match got {
        PartialResult::Keyed(_) => "keyed",
        PartialResult::Unique(_) => "unique",
        PartialResult::Grouped(_) => "grouped",
        PartialResult::Sample(_) => "sample",
    };
    anyhow!("{phase} reducer got a {kind} partial")
}

/* ===================== velocity ===================== */

/// Global initial value (first wins) and global max per `(IDLink, Platform)`.
///
/// # Errors
/// Fails when a partial is not keyed.
pub fn reduce_velocity(parts: Vec<PartialResult>) -> Result<KeyedLookup> {
    let first = FirstValue::<f64>::new();
    let max = MaxF64;
    let mut acc = KeyedPartial::default();
    for p in parts {
        let k = match p {
            PartialResult::Keyed(k) => k,
            other => return Err(wrong_partial("velocity", &other)),
        };
        merge_keyed(&first, &mut acc.initial, k.initial);
        merge_keyed(&max, &mut acc.max, k.max);
    }

    let mut lookup = KeyedLookup::new(
        &[schema::ID_LINK, schema::PLATFORM],
        schema::VELOCITY_COLUMNS,
        vec![Field::Null; 3],
    );
    for (key, m) in acc.max {
        let initial = acc.initial.get(&key).copied().flatten();
        let fin = max.finish(m);
        lookup.insert(
            key,
            vec![
                Field::from_opt(initial),
                Field::from_opt(fin),
                Field::from_opt(stickiness(initial, fin)),
            ],
        );
    }
    Ok(lookup)
}

/// `final / initial`, missing when the initial value is absent or zero.
#[must_use]
pub fn stickiness(initial: Option<f64>, fin: Option<f64>) -> Option<f64> {
    match (initial, fin) {
        (Some(i), Some(f)) if i != 0.0 => Some(f / i),
        _ => None,
    }
}

/* ===================== unique records ===================== */

/// Concatenate per-chunk unique records, keeping the first occurrence of each
/// key (first column) across chunks.
///
/// # Errors
/// Fails when a partial is not a unique-record set.
pub fn reduce_unique(parts: Vec<PartialResult>) -> Result<UniqueRecords> {
    let mut out = UniqueRecords::default();
    let mut seen: HashSet<String> = HashSet::new();
    for p in parts {
        let u = match p {
            PartialResult::Unique(u) => u,
            other => return Err(wrong_partial("unique", &other)),
        };
        if out.columns.is_empty() {
            out.columns = u.columns;
        }
        for row in u.rows {
            if seen.insert(row.get(0).unwrap_or_default().to_string()) {
                out.rows.push(row);
            }
        }
    }
    Ok(out)
}

fn column(u: &UniqueRecords, name: &str) -> Result<usize> {
    u.columns
        .iter()
        .position(|c| c == name)
        .ok_or_else(|| anyhow!("unique records lack column {name:?}"))
}

/// Text features per `IDLink`, scored in parallel.
///
/// # Returns
/// The lookup and the number of text fields that fell back to `0.0`.
///
/// # Errors
/// Fails when the records lack a text column.
pub fn reduce_text(u: &UniqueRecords, scorer: &dyn SentimentScorer) -> Result<(KeyedLookup, u64)> {
    let id = column(u, schema::ID_LINK)?;
    let title = column(u, schema::TITLE)?;
    let headline = column(u, schema::HEADLINE)?;

    let scored: Vec<(String, TextFeatures)> = u
        .rows
        .par_iter()
        .map(|r| {
            (
                r[id].to_string(),
                TextFeatures::compute(scorer, &r[title], &r[headline]),
            )
        })
        .collect();

    let mut lookup = KeyedLookup::new(
        &[schema::ID_LINK],
        schema::TEXT_COLUMNS,
        vec![Field::Float(0.0); 3],
    );
    let mut failures = 0u64;
    for (key, f) in scored {
        failures += u64::from(f.failures);
        lookup.insert(
            vec![key],
            vec![
                Field::Float(f.title_sentiment),
                Field::Float(f.sentiment_divergence),
                Field::Float(f.title_complexity),
            ],
        );
    }
    Ok((lookup, failures))
}

/// Opportunity score per `IDLink`: one over the number of unique articles
/// sharing its topic and calendar day.
///
/// # Returns
/// The lookup and the number of records dropped for an unparsable date.
///
/// # Errors
/// Fails when the records lack a date column.
pub fn reduce_market(u: &UniqueRecords) -> Result<(KeyedLookup, u64)> {
    let id = column(u, schema::ID_LINK)?;
    let date = column(u, schema::PUBLISH_DATE)?;
    let topic = column(u, schema::TOPIC)?;

    let mut dropped = 0u64;
    let mut dated: Vec<(&str, &str, NaiveDate)> = Vec::with_capacity(u.rows.len());
    for r in &u.rows {
        let Some(ts) = parse_timestamp(&r[date]) else {
            dropped += 1;
            continue;
        };
        let t = r[topic].trim();
        if !t.is_empty() {
            dated.push((&r[id], t, ts.date()));
        }
    }

    let mut competitors: HashMap<(&str, NaiveDate), u64> = HashMap::new();
    for (_, t, d) in &dated {
        *competitors.entry((*t, *d)).or_default() += 1;
    }

    let mut lookup = KeyedLookup::new(
        &[schema::ID_LINK],
        schema::MARKET_COLUMNS,
        vec![Field::Float(0.0)],
    );
    for (i, t, d) in dated {
        let n = competitors.get(&(t, d)).copied().unwrap_or(0);
        lookup.insert(vec![i.to_string()], vec![Field::Float(opportunity_score(n))]);
    }
    Ok((lookup, dropped))
}

/// Source tier per `IDLink`, by the source's unique-article count.
///
/// # Errors
/// Fails when the records lack a source column.
pub fn reduce_source_tier(u: &UniqueRecords, tiers: &SourceTierConfig) -> Result<KeyedLookup> {
    let id = column(u, schema::ID_LINK)?;
    let source = column(u, schema::SOURCE)?;

    let mut articles: HashMap<&str, u64> = HashMap::new();
    for r in &u.rows {
        let s = r[source].trim();
        if !s.is_empty() {
            *articles.entry(s).or_default() += 1;
        }
    }

    let mut lookup = KeyedLookup::new(
        &[schema::ID_LINK],
        schema::SOURCE_TIER_COLUMNS,
        vec![Field::Text(UNRANKED.to_string())],
    );
    for r in &u.rows {
        let s = r[source].trim();
        if let Some(&n) = articles.get(s) {
            lookup.insert(
                vec![r[id].to_string()],
                vec![Field::Text(source_tier(n, tiers).to_string())],
            );
        }
    }
    Ok(lookup)
}

/* ===================== grouped / sampled ===================== */

/// Add every chunk's sums and counts.
///
/// # Errors
/// Fails on a non-grouped partial or a grouping shape mismatch.
pub fn reduce_grouped(parts: Vec<PartialResult>) -> Result<GroupedAccumulators> {
    let mut acc = GroupedAccumulators::default();
    for p in parts {
        let g = match p {
            PartialResult::Grouped(g) => g,
            other => return Err(wrong_partial("grouped", &other)),
        };
        acc.merge(g)?;
    }
    Ok(acc)
}

/// Concatenate per-chunk samples.
///
/// # Errors
/// Fails when a partial is not a sample.
pub fn reduce_samples(parts: Vec<PartialResult>) -> Result<SampleRows> {
    let mut out = SampleRows::default();
    for p in parts {
        let s = match p {
            PartialResult::Sample(s) => s,
            other => return Err(wrong_partial("sample", &other)),
        };
        if out.columns.is_empty() {
            out.columns = s.columns;
        }
        out.rows.extend(s.rows);
    }
    Ok(out)
}

/// Complexity bins from the pooled sample of every chunk.
///
/// # Errors
/// Fails when no chunk sampled anything, or the sample lacks the column.
pub fn reduce_quantiles(parts: Vec<PartialResult>, qs: [f64; 2]) -> Result<Bins3> {
    let sample = reduce_samples(parts)?;
    let c = sample
        .columns
        .iter()
        .position(|c| c == schema::TITLE_COMPLEXITY);
    let sq = SampleQuantiles::new(&qs);
    let mut acc = sq.create();
    if let Some(c) = c {
        for row in &sample.rows {
            if let Some(v) = parse_f64(&row[c]) {
                sq.add_input(&mut acc, v);
            }
        }
    }
    let Some(cuts) = sq.finish(acc) else {
        bail!("complexity sample is empty; cannot estimate quantiles");
    };
    Bins3::new(cuts[0], cuts[1], COMPLEXITY_LABELS)
}
