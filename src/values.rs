//! Typed reads over raw delimited cells.
//!
//! Cells stay as text inside a [`Chunk`](crate::io::Chunk); operations parse
//! only the columns they touch. A cell that fails to parse is *missing*,
//! never zero.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::borrow::Cow;

/// Parse a floating point cell. Empty, `nan` and garbage read as `None`.
#[must_use]
pub fn parse_f64(cell: &str) -> Option<f64> {
    let t = cell.trim();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Parse a time-index cell such as `TS1`, `1` or `1.0`.
#[must_use]
pub fn parse_time_slice(cell: &str) -> Option<i64> {
    let t = cell.trim();
    let t = t.strip_prefix("TS").unwrap_or(t);
    if let Ok(v) = t.parse::<i64>() {
        return Some(v);
    }
    let f = t.parse::<f64>().ok()?;
    if !f.is_finite() || f.fract() != 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let whole = f as i64;
    Some(whole)
}

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a publish timestamp. Offsets are dropped; the wall-clock time is kept.
#[must_use]
pub fn parse_timestamp(cell: &str) -> Option<NaiveDateTime> {
    let t = cell.trim();
    if t.is_empty() {
        return None;
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(t) {
        return Some(ts.naive_local());
    }
    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// One derived output cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Float(f64),
    Text(String),
    Null,
}

impl Field {
    #[must_use]
    pub fn from_opt(v: Option<f64>) -> Self {
        v.map_or(Self::Null, Self::Float)
    }

    /// Text form written to shards. `Null` is an empty cell.
    #[must_use]
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Self::Float(v) => Cow::Owned(v.to_string()),
            Self::Text(s) => Cow::Borrowed(s),
            Self::Null => Cow::Borrowed(""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn floats() {
        assert_eq!(parse_f64(" 3.5 "), Some(3.5));
        assert_eq!(parse_f64(""), None);
        assert_eq!(parse_f64("nan"), None);
        assert_eq!(parse_f64("-1"), Some(-1.0));
        assert_eq!(parse_f64("abc"), None);
    }

    #[test]
    fn time_slices_strip_prefix() {
        assert_eq!(parse_time_slice("TS1"), Some(1));
        assert_eq!(parse_time_slice("12"), Some(12));
        assert_eq!(parse_time_slice("1.0"), Some(1));
        assert_eq!(parse_time_slice("1.5"), None);
        assert_eq!(parse_time_slice("TSx"), None);
    }

    #[test]
    fn timestamps() {
        let ts = parse_timestamp("2015-11-01 13:05:00").unwrap();
        assert_eq!((ts.year(), ts.hour()), (2015, 13));
        assert!(parse_timestamp("2015-11-01T13:05:00").is_some());
        assert!(parse_timestamp("2015-11-01T13:05:00+02:00").is_some());
        assert_eq!(parse_timestamp("2015-11-01").unwrap().hour(), 0);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn field_render() {
        assert_eq!(Field::Float(0.5).render(), "0.5");
        assert_eq!(Field::Null.render(), "");
        assert_eq!(Field::Text("Tier 1".into()).render(), "Tier 1");
    }
}
