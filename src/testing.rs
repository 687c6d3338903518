//! Testing utilities for newsflow phases.
//!
//! - **Fixtures**: [`NewsFixture`] writes a synthetic long-format news file
//! - **Reassembly**: [`concat_shards`] joins a phase's shards under one header
//! - **Inspection**: [`Table`] loads a delimited file for assertions
//!
//! # Quick Start
//!
//! ```no_run
//! use newsflow::testing::{NewsFixture, Table, concat_shards};
//! use newsflow::{Engine, EngineConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let input = NewsFixture::new(200).write_to(dir.path().join("news.csv"))?;
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let out = engine.velocity_phase(&input, 4, &dir.path().join("shards"))?;
//! let merged = dir.path().join("velocity.csv");
//! concat_shards(&out.header, &out.shards, &merged)?;
//!
//! let table = Table::from_file(&merged, b',')?;
//! assert_eq!(table.rows.len(), 200 * 3 * 6);
//! # Ok(())
//! # }
//! ```

use crate::combiners::SplitMix64;
use crate::schema::{self, SOURCE_COLUMNS};
use anyhow::{Context, Result, anyhow};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/* ===================== fixtures ===================== */

const TOPICS: &[&str] = &["economy", "microsoft", "obama", "palestine"];
const PLATFORMS: &[&str] = &["Facebook", "GooglePlus", "LinkedIn"];
const SOURCES: &[&str] = &[
    "Reuters",
    "Bloomberg",
    "Associated Press",
    "The Guardian",
    "Forbes",
    "Daily Herald",
    "Local Gazette",
];
const WORDS: &[&str] = &[
    "markets", "surge", "crisis", "growth", "president", "talks", "new", "record", "fear",
    "deal", "loss", "hope", "report", "cloud", "strong", "weak", "peace", "attack", "shares",
    "policy",
];

/// Synthetic long-format news data: one row per
/// `(article, platform, time slice)`.
///
/// Generation is deterministic for a given `seed`. Titles contain commas and
/// quotes so that field quoting is exercised; sources are skewed so every
/// tier appears; popularity is a non-decreasing walk that sometimes starts
/// at zero.
#[derive(Clone, Debug)]
pub struct NewsFixture {
    pub articles: usize,
    pub time_slices: u32,
    pub seed: u64,
    /// Every `n`-th article gets an unparsable publish date (`0` for none).
    pub bad_date_every: usize,
}

impl Default for NewsFixture {
    fn default() -> Self {
        Self {
            articles: 100,
            time_slices: 6,
            seed: 7,
            bad_date_every: 0,
        }
    }
}

impl NewsFixture {
    #[must_use]
    pub fn new(articles: usize) -> Self {
        Self {
            articles,
            ..Self::default()
        }
    }

    /// Rows this fixture contains, in file order.
    #[must_use]
    pub fn rows(&self) -> Vec<StringRecord> {
        let mut rng = SplitMix64::new(self.seed);
        let mut out =
            Vec::with_capacity(self.articles * PLATFORMS.len() * self.time_slices as usize);
        for a in 0..self.articles {
            let id = format!("{}", 1000 + a);
            let title_words = 3 + rng.next_below(8);
            let title = Self::sentence(&mut rng, title_words);
            let headline_words = 8 + rng.next_below(12);
            let headline = Self::sentence(&mut rng, headline_words);
            // squaring skews toward the first sources
            let pick = rng.next_f64();
            let source = SOURCES[((pick * pick) * SOURCES.len() as f64) as usize];
            let topic = TOPICS[rng.next_below(TOPICS.len())];
            let date = if self.bad_date_every > 0 && a % self.bad_date_every == 0 {
                "unknown".to_string()
            } else {
                format!(
                    "2015-11-{:02} {:02}:{:02}:00",
                    1 + rng.next_below(20),
                    rng.next_below(24),
                    rng.next_below(60)
                )
            };
            for platform in PLATFORMS {
                let mut pop = if rng.next_below(5) == 0 {
                    0.0
                } else {
                    1.0 + rng.next_below(20) as f64
                };
                for ts in 1..=self.time_slices {
                    let slice = format!("TS{ts}");
                    let value = pop.to_string();
                    out.push(StringRecord::from(vec![
                        id.as_str(),
                        title.as_str(),
                        headline.as_str(),
                        source,
                        topic,
                        date.as_str(),
                        *platform,
                        slice.as_str(),
                        value.as_str(),
                    ]));
                    pop += rng.next_below(10) as f64;
                }
            }
        }
        out
    }

    fn sentence(rng: &mut SplitMix64, words: usize) -> String {
        let mut s: Vec<&str> = (0..words).map(|_| WORDS[rng.next_below(WORDS.len())]).collect();
        if rng.next_below(4) == 0 {
            s.insert(1, "\"not\",");
        }
        s.join(" ")
    }

    /// Write the header and every row to `path`.
    ///
    /// # Errors
    /// Fails when the file cannot be written.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut wtr = WriterBuilder::new().from_writer(BufWriter::new(f));
        wtr.write_record(SOURCE_COLUMNS)?;
        for row in self.rows() {
            wtr.write_record(&row)?;
        }
        wtr.flush().with_context(|| format!("flush {}", path.display()))?;
        Ok(path.to_path_buf())
    }
}

/* ===================== reassembly ===================== */

/// Write `header` once, then every shard in the given order, to `out`.
///
/// # Returns
/// Total bytes written.
///
/// # Errors
/// Fails when a shard cannot be read or `out` cannot be written.
pub fn concat_shards(header: &[u8], shards: &[PathBuf], out: impl AsRef<Path>) -> Result<u64> {
    let out = out.as_ref();
    let f = File::create(out).with_context(|| format!("create {}", out.display()))?;
    let mut w = BufWriter::new(f);
    w.write_all(header)?;
    let mut total = header.len() as u64;
    for shard in shards {
        let mut r = File::open(shard).with_context(|| format!("open {}", shard.display()))?;
        total += std::io::copy(&mut r, &mut w)?;
    }
    w.flush()?;
    Ok(total)
}

/* ===================== inspection ===================== */

/// A fully loaded delimited file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl Table {
    /// # Errors
    /// Fails when the file cannot be opened or parsed.
    pub fn from_file(path: impl AsRef<Path>, delimiter: u8) -> Result<Self> {
        let path = path.as_ref();
        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .from_path(path)
            .with_context(|| format!("open {}", path.display()))?;
        let columns = rdr.headers()?.iter().map(str::to_string).collect();
        let rows = rdr
            .records()
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("parse {}", path.display()))?;
        Ok(Self { columns, rows })
    }

    /// # Errors
    /// Fails when the column is absent.
    pub fn column(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| anyhow!("no column {name:?} in {:?}", self.columns))
    }

    /// Every value of `name`, in row order.
    ///
    /// # Errors
    /// Fails when the column is absent.
    pub fn values(&self, name: &str) -> Result<Vec<&str>> {
        let c = self.column(name)?;
        Ok(self.rows.iter().map(|r| &r[c]).collect())
    }

    /// First row per composite key.
    ///
    /// # Errors
    /// Fails when a key column is absent.
    pub fn first_by(&self, keys: &[&str]) -> Result<HashMap<Vec<String>, &StringRecord>> {
        let idx: Vec<usize> = keys.iter().map(|k| self.column(k)).collect::<Result<_>>()?;
        let mut out = HashMap::new();
        for r in &self.rows {
            let key: Vec<String> = idx.iter().map(|&i| r[i].to_string()).collect();
            out.entry(key).or_insert(r);
        }
        Ok(out)
    }
}

/// Assert two floats agree within `tol`, treating both-missing as equal.
///
/// # Panics
/// Panics when exactly one side is missing or the values differ by more
/// than `tol`.
pub fn assert_close(actual: Option<f64>, expected: Option<f64>, tol: f64, what: &str) {
    match (actual, expected) {
        (None, None) => {}
        (Some(a), Some(e)) => assert!(
            (a - e).abs() <= tol * e.abs().max(1.0),
            "{what}: expected {e}, got {a}"
        ),
        _ => panic!("{what}: expected {expected:?}, got {actual:?}"),
    }
}

/// Column layout of a fully enriched file: source columns plus every derived
/// column, in phase order.
#[must_use]
pub fn enriched_columns() -> Vec<&'static str> {
    let mut cols = SOURCE_COLUMNS.to_vec();
    cols.extend(schema::VELOCITY_COLUMNS);
    cols.extend(schema::TEXT_COLUMNS);
    cols.extend(schema::MARKET_COLUMNS);
    cols.extend(schema::SOURCE_TIER_COLUMNS);
    cols
}
