//! Per-record feature functions and binning rules.
//!
//! The engine treats scoring as pluggable: a [`SentimentScorer`] may fail, and
//! [`score_or_zero`] turns any failure into the neutral `0.0` so one bad text
//! value never aborts a chunk.

use anyhow::{Result, bail};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Text polarity in `[-1, 1]`.
pub trait SentimentScorer: Send + Sync {
    /// # Errors
    /// Implementations may fail on any input; callers substitute `0.0`.
    fn polarity(&self, text: &str) -> Result<f64>;
}

impl<F> SentimentScorer for F
where
    F: Fn(&str) -> Result<f64> + Send + Sync,
{
    fn polarity(&self, text: &str) -> Result<f64> {
        self(text)
    }
}

/// Score `text`, mapping errors and non-finite output to `0.0`.
///
/// The flag is `true` when the fallback was used.
pub fn score_or_zero(scorer: &dyn SentimentScorer, text: &str) -> (f64, bool) {
    match scorer.polarity(text) {
        Ok(v) if v.is_finite() => (v.clamp(-1.0, 1.0), false),
        _ => (0.0, true),
    }
}

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]+(?:'[A-Za-z]+)?").expect("word pattern compiles"));

const POSITIVE: &[&str] = &[
    "good", "great", "best", "better", "win", "wins", "growth", "gain", "gains", "strong",
    "success", "record", "rise", "rises", "boost", "hope", "happy", "positive", "improve",
    "improves", "recovery", "profit", "surge", "love", "excellent", "benefit", "safe", "new",
];

const NEGATIVE: &[&str] = &[
    "bad", "worst", "worse", "loss", "losses", "fall", "falls", "crisis", "crash", "risk",
    "weak", "fail", "fails", "failure", "decline", "cut", "cuts", "fear", "war", "attack",
    "negative", "poor", "debt", "drop", "drops", "slump", "concern", "warning", "threat",
];

const NEGATIONS: &[&str] = &["not", "no", "never", "without", "don't", "isn't", "won't"];

/// Word-list polarity: `(positive - negative) / (positive + negative)` over
/// matched words, with a negation word flipping the next match.
///
/// A stand-in for a full sentiment model. Text with no matched words scores 0.
#[derive(Clone, Debug)]
pub struct LexiconScorer {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self {
            positive: POSITIVE.iter().copied().collect(),
            negative: NEGATIVE.iter().copied().collect(),
        }
    }
}

impl SentimentScorer for LexiconScorer {
    #[allow(clippy::cast_precision_loss)]
    fn polarity(&self, text: &str) -> Result<f64> {
        let mut pos = 0u32;
        let mut neg = 0u32;
        let mut negate = false;
        for m in WORD.find_iter(text) {
            let w = m.as_str().to_ascii_lowercase();
            if NEGATIONS.contains(&w.as_str()) {
                negate = true;
                continue;
            }
            let sign = if self.positive.contains(w.as_str()) {
                1
            } else if self.negative.contains(w.as_str()) {
                -1
            } else {
                continue;
            };
            if (sign > 0) != negate {
                pos += 1;
            } else {
                neg += 1;
            }
            negate = false;
        }
        let total = pos + neg;
        if total == 0 {
            return Ok(0.0);
        }
        Ok((f64::from(pos) - f64::from(neg)) / f64::from(total))
    }
}

/// Word count plus mean word length of whitespace-separated tokens.
///
/// Empty or whitespace-only text scores `0.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn complexity(text: &str) -> f64 {
    let (count, chars) = text
        .split_whitespace()
        .fold((0usize, 0usize), |(n, c), w| (n + 1, c + w.chars().count()));
    if count == 0 {
        return 0.0;
    }
    count as f64 + chars as f64 / count as f64
}

/// Features derived from one article's title and headline.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextFeatures {
    pub title_sentiment: f64,
    pub sentiment_divergence: f64,
    pub title_complexity: f64,
    /// Number of fields that fell back to `0.0`.
    pub failures: u32,
}

impl TextFeatures {
    pub fn compute(scorer: &dyn SentimentScorer, title: &str, headline: &str) -> Self {
        let (title_sentiment, t_failed) = score_or_zero(scorer, title);
        let (headline_sentiment, h_failed) = score_or_zero(scorer, headline);
        Self {
            title_sentiment,
            sentiment_divergence: (title_sentiment - headline_sentiment).abs(),
            title_complexity: complexity(title),
            failures: u32::from(t_failed) + u32::from(h_failed),
        }
    }
}

/* ===================== bins ===================== */

/// Three buckets split at `low` and `high`.
///
/// Intervals are right-closed: `(-inf, low]`, `(low, high]`, `(high, inf)`, so
/// a value equal to a boundary belongs to the lower bucket. Missing values
/// have no bucket.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bins3 {
    pub low: f64,
    pub high: f64,
    pub labels: [&'static str; 3],
}

impl Bins3 {
    /// # Errors
    /// Fails when the edges are not finite or out of order.
    pub fn new(low: f64, high: f64, labels: [&'static str; 3]) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() || low > high {
            bail!("bin edges {low}..{high} must be finite and ordered");
        }
        Ok(Self { low, high, labels })
    }

    #[must_use]
    pub fn label(&self, v: Option<f64>) -> Option<&'static str> {
        let v = v?;
        Some(if v <= self.low {
            self.labels[0]
        } else if v <= self.high {
            self.labels[1]
        } else {
            self.labels[2]
        })
    }
}

pub const SENTIMENT_BINS: Bins3 = Bins3 {
    low: -0.1,
    high: 0.1,
    labels: ["Negative", "Neutral", "Positive"],
};

/// Opportunity score is `1 / competitors`: at most 0.02 means 50 or more
/// competitors, above 0.1 means fewer than 10.
pub const OPPORTUNITY_BINS: Bins3 = Bins3 {
    low: 0.02,
    high: 0.1,
    labels: ["Red Ocean (High Comp)", "Average", "Blue Ocean (Low Comp)"],
};

pub const COMPLEXITY_LABELS: [&str; 3] = ["Simple", "Standard", "Complex"];

/* ===================== market / sources ===================== */

/// `1 / competitors`, or `0.0` (infinite saturation) when there are none.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn opportunity_score(competitors: u64) -> f64 {
    if competitors == 0 {
        0.0
    } else {
        1.0 / competitors as f64
    }
}

pub const TIER_1: &str = "Tier 1";
pub const TIER_2: &str = "Tier 2";
pub const TIER_3: &str = "Tier 3";
pub const UNRANKED: &str = "Unranked";

/// Tier of a source publishing `articles` unique articles.
#[must_use]
pub fn source_tier(articles: u64, tiers: &crate::config::SourceTierConfig) -> &'static str {
    if articles >= tiers.tier1_min_articles {
        TIER_1
    } else if articles >= tiers.tier2_min_articles {
        TIER_2
    } else {
        TIER_3
    }
}
