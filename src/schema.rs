//! Schema registry: the single place that knows column names and order.
//!
//! Every phase operation resolves its columns through this module, so the
//! list of names a worker expects can never drift from what the file holds.

use anyhow::{Context, Result, anyhow, bail};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/* ===================== source columns ===================== */

pub const ID_LINK: &str = "IDLink";
pub const TITLE: &str = "Title";
pub const HEADLINE: &str = "Headline";
pub const SOURCE: &str = "Source";
pub const TOPIC: &str = "Topic";
pub const PUBLISH_DATE: &str = "PublishDate";
pub const PLATFORM: &str = "Platform";
pub const TIME_SLICE: &str = "TimeSlice";
pub const POPULARITY: &str = "Popularity";

/// Column order of the raw long-format news file.
pub const SOURCE_COLUMNS: &[&str] = &[
    ID_LINK,
    TITLE,
    HEADLINE,
    SOURCE,
    TOPIC,
    PUBLISH_DATE,
    PLATFORM,
    TIME_SLICE,
    POPULARITY,
];

/* ===================== derived columns ===================== */

pub const INITIAL_VELOCITY: &str = "Initial_Velocity";
pub const FINAL_SCORE: &str = "Final_Score";
pub const STICKINESS_INDEX: &str = "Stickiness_Index";
pub const TITLE_SENTIMENT: &str = "Title_Sentiment";
pub const SENTIMENT_DIVERGENCE: &str = "Sentiment_Divergence";
pub const TITLE_COMPLEXITY: &str = "Title_Complexity";
pub const OPPORTUNITY_SCORE: &str = "Opportunity_Score";
pub const SOURCE_TIER: &str = "Source_Tier";

pub const VELOCITY_COLUMNS: &[&str] = &[INITIAL_VELOCITY, FINAL_SCORE, STICKINESS_INDEX];
pub const TEXT_COLUMNS: &[&str] = &[TITLE_SENTIMENT, SENTIMENT_DIVERGENCE, TITLE_COMPLEXITY];
pub const MARKET_COLUMNS: &[&str] = &[OPPORTUNITY_SCORE];
pub const SOURCE_TIER_COLUMNS: &[&str] = &[SOURCE_TIER];

/* ===================== per-operation subsets ===================== */

pub const VELOCITY_INPUT: &[&str] = &[ID_LINK, PLATFORM, TIME_SLICE, POPULARITY];
pub const TEXT_INPUT: &[&str] = &[ID_LINK, TITLE, HEADLINE];
pub const DATE_INPUT: &[&str] = &[ID_LINK, PUBLISH_DATE, TOPIC];
pub const SOURCE_INPUT: &[&str] = &[ID_LINK, SOURCE];
pub const COMPLEXITY_SAMPLE_INPUT: &[&str] = &[TITLE_COMPLEXITY];

/// Metrics averaged by the content and context aggregations.
pub const ENGAGEMENT_METRICS: &[&str] = &[POPULARITY, INITIAL_VELOCITY, STICKINESS_INDEX];

pub const CONTENT_INPUT: &[&str] = &[
    PLATFORM,
    TITLE_SENTIMENT,
    TITLE_COMPLEXITY,
    POPULARITY,
    INITIAL_VELOCITY,
    STICKINESS_INDEX,
];

pub const CONTEXT_INPUT: &[&str] = &[
    PLATFORM,
    PUBLISH_DATE,
    SOURCE_TIER,
    OPPORTUNITY_SCORE,
    POPULARITY,
    INITIAL_VELOCITY,
    STICKINESS_INDEX,
];

pub const QUADRANT_INPUT: &[&str] = &[
    ID_LINK,
    PLATFORM,
    TITLE,
    SOURCE_TIER,
    POPULARITY,
    INITIAL_VELOCITY,
    STICKINESS_INDEX,
    TITLE_SENTIMENT,
    TITLE_COMPLEXITY,
    OPPORTUNITY_SCORE,
    SENTIMENT_DIVERGENCE,
    FINAL_SCORE,
];

/// Rows lacking any of these are left out of the quadrant sample.
pub const QUADRANT_REQUIRED: &[&str] = &[INITIAL_VELOCITY, STICKINESS_INDEX];

/// Ordered column names of one delimited file.
///
/// Read once per phase from the header line and shared read-only by every
/// worker; mid-file ranges carry no header, so workers name their fields
/// from this list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Read the header line of `path`.
    ///
    /// # Errors
    /// Fails when the file cannot be read, is empty, or the header repeats a
    /// column name.
    pub fn from_file(path: impl AsRef<Path>, delimiter: u8) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut line = Vec::new();
        BufReader::new(f)
            .read_until(b'\n', &mut line)
            .with_context(|| format!("read header of {}", path.display()))?;
        if line.is_empty() {
            bail!("{} is empty: no header line", path.display());
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(delimiter)
            .from_reader(line.as_slice());
        let record = rdr
            .records()
            .next()
            .ok_or_else(|| anyhow!("{} has a blank header line", path.display()))?
            .with_context(|| format!("parse header of {}", path.display()))?;
        let schema = Self::new(record.iter());
        schema.check_unique()?;
        Ok(schema)
    }

    fn check_unique(&self) -> Result<()> {
        for (i, c) in self.columns.iter().enumerate() {
            if self.columns[..i].contains(c) {
                bail!("duplicate column {c:?} in header");
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Position of `name`.
    ///
    /// # Errors
    /// Fails when the column is not part of the schema.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| anyhow!("column {name:?} not in schema {:?}", self.columns))
    }

    /// Keep only the names from `wanted` that this schema has, in `wanted` order.
    #[must_use]
    pub fn present<'a>(&self, wanted: &[&'a str]) -> Vec<&'a str> {
        wanted.iter().copied().filter(|c| self.contains(c)).collect()
    }

    /// Schema with `drop` removed and `append` added at the end.
    ///
    /// This is the column layout of a merge shard.
    #[must_use]
    pub fn merged(&self, drop: &[&str], append: &[&str]) -> Self {
        let mut columns: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !drop.contains(&c.as_str()))
            .cloned()
            .collect();
        columns.extend(append.iter().map(|c| (*c).to_string()));
        Self { columns }
    }
}
