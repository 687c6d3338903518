mod common;

use anyhow::Result;
use common::{assemble, engine, enrich};
use newsflow::schema::{self, SOURCE_COLUMNS};
use newsflow::testing::{NewsFixture, Table, assert_close, enriched_columns};
use newsflow::values::{parse_f64, parse_time_slice};
use newsflow::LexiconScorer;
use std::collections::HashMap;
use std::fs;

type Key = (String, String);

/// Single pass over the whole file: popularity at time index 1 and max.
fn reference_velocity(t: &Table) -> Result<HashMap<Key, (Option<f64>, Option<f64>)>> {
    let id = t.column(schema::ID_LINK)?;
    let platform = t.column(schema::PLATFORM)?;
    let ts = t.column(schema::TIME_SLICE)?;
    let pop = t.column(schema::POPULARITY)?;
    let mut out: HashMap<Key, (Option<f64>, Option<f64>)> = HashMap::new();
    for r in &t.rows {
        let e = out
            .entry((r[id].to_string(), r[platform].to_string()))
            .or_default();
        let v = parse_f64(&r[pop]);
        if parse_time_slice(&r[ts]) == Some(1) && e.0.is_none() {
            e.0 = v;
        }
        if let Some(v) = v {
            e.1 = Some(e.1.map_or(v, |m: f64| m.max(v)));
        }
    }
    Ok(out)
}

#[test]
fn chunked_velocity_matches_single_pass() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // 556 articles x 3 platforms x 6 slices = 10,008 rows
    let input = NewsFixture::new(556).write_to(dir.path().join("news.csv"))?;
    let source = Table::from_file(&input, b',')?;
    assert_eq!(source.rows.len(), 10_008);

    let engine = engine(4)?;
    let out = engine.velocity_phase(&input, 4, &dir.path().join("shards"))?;
    assert_eq!(out.shards.len(), 4);
    assert_eq!(out.stats.join_misses, 0);
    let merged = Table::from_file(assemble(&out, dir.path(), "velocity")?, b',')?;

    // shard order follows range order, so rows line up one to one
    assert_eq!(merged.rows.len(), source.rows.len());
    for (m, s) in merged.rows.iter().zip(&source.rows) {
        let head: Vec<&str> = m.iter().take(SOURCE_COLUMNS.len()).collect();
        assert_eq!(head, s.iter().collect::<Vec<_>>());
    }

    let expected = reference_velocity(&source)?;
    let id = merged.column(schema::ID_LINK)?;
    let platform = merged.column(schema::PLATFORM)?;
    let initial = merged.column(schema::INITIAL_VELOCITY)?;
    let fin = merged.column(schema::FINAL_SCORE)?;
    let sticky = merged.column(schema::STICKINESS_INDEX)?;
    for r in &merged.rows {
        let (i, f) = expected[&(r[id].to_string(), r[platform].to_string())];
        assert_eq!(parse_f64(&r[initial]), i);
        assert_eq!(parse_f64(&r[fin]), f);
        let s = match (i, f) {
            (Some(i), Some(f)) if i != 0.0 => Some(f / i),
            _ => None,
        };
        assert_close(parse_f64(&r[sticky]), s, 1e-12, "stickiness");
    }
    Ok(())
}

#[test]
fn rerunning_a_merge_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = NewsFixture::new(60).write_to(dir.path().join("news.csv"))?;
    let engine = engine(3)?;

    let first = engine.velocity_phase(&input, 5, &dir.path().join("a"))?;
    let once = assemble(&first, dir.path(), "once")?;
    let second = engine.velocity_phase(&once, 3, &dir.path().join("b"))?;
    let twice = assemble(&second, dir.path(), "twice")?;

    assert_eq!(first.schema, second.schema);
    assert_eq!(fs::read(&once)?, fs::read(&twice)?);
    Ok(())
}

#[test]
fn full_enrichment_appends_every_feature_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = NewsFixture::new(120).write_to(dir.path().join("news.csv"))?;
    let engine = engine(4)?;
    let enriched = Table::from_file(enrich(&engine, &input, dir.path(), 6)?, b',')?;

    assert_eq!(enriched.columns, enriched_columns());
    assert_eq!(enriched.rows.len(), 120 * 3 * 6);
    for tier in enriched.values(schema::SOURCE_TIER)? {
        assert!(["Tier 1", "Tier 2", "Tier 3"].contains(&tier), "unexpected tier {tier:?}");
    }
    for s in enriched.values(schema::TITLE_SENTIMENT)? {
        let v = parse_f64(s).unwrap_or(f64::NAN);
        assert!((-1.0..=1.0).contains(&v));
    }
    for o in enriched.values(schema::OPPORTUNITY_SCORE)? {
        let v = parse_f64(o).unwrap_or(0.0);
        assert!(v > 0.0 && v <= 1.0);
    }
    Ok(())
}

#[test]
fn failing_scorer_degrades_to_zero() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = NewsFixture::new(50).write_to(dir.path().join("news.csv"))?;
    let engine = engine(2)?;
    let lexicon = LexiconScorer::default();
    let flaky = |t: &str| -> Result<f64> {
        if t.contains("crisis") {
            anyhow::bail!("scorer refused {t:?}");
        }
        newsflow::SentimentScorer::polarity(&lexicon, t)
    };

    let out = engine.text_phase(&input, 4, &dir.path().join("text"), &flaky)?;
    assert!(out.scan.scoring_failures > 0);
    assert_eq!(out.stats.scoring_failures, 0);
    let merged = Table::from_file(assemble(&out, dir.path(), "text")?, b',')?;
    assert_eq!(merged.rows.len(), 50 * 3 * 6);

    let title = merged.column(schema::TITLE)?;
    let sentiment = merged.column(schema::TITLE_SENTIMENT)?;
    let complexity = merged.column(schema::TITLE_COMPLEXITY)?;
    for r in &merged.rows {
        if r[title].contains("crisis") {
            assert_eq!(parse_f64(&r[sentiment]), Some(0.0));
        }
        assert!(parse_f64(&r[complexity]).is_some_and(|c| c > 0.0));
    }
    Ok(())
}

#[test]
fn quadrant_sample_keeps_only_complete_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = NewsFixture::new(300).write_to(dir.path().join("news.csv"))?;
    let engine = engine(4)?;
    let enriched = enrich(&engine, &input, dir.path(), 4)?;

    let out = engine.quadrant_sample(&enriched, 4)?;
    assert!(!out.sample.rows.is_empty());
    assert_eq!(out.sample.columns.len(), schema::QUADRANT_INPUT.len());
    let vel = out
        .sample
        .columns
        .iter()
        .position(|c| c == schema::INITIAL_VELOCITY)
        .unwrap();
    let sticky = out
        .sample
        .columns
        .iter()
        .position(|c| c == schema::STICKINESS_INDEX)
        .unwrap();
    for r in &out.sample.rows {
        assert!(parse_f64(&r[vel]).is_some());
        assert!(parse_f64(&r[sticky]).is_some());
    }

    // the same rows come back for a different chunk count
    let again = engine.quadrant_sample(&enriched, 7)?;
    assert_eq!(again.sample.rows, out.sample.rows);
    Ok(())
}
