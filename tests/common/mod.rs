#![allow(dead_code)]

use anyhow::Result;
use newsflow::testing::concat_shards;
use newsflow::{Engine, EngineConfig, LexiconScorer, MergeOutput};
use std::path::{Path, PathBuf};

pub fn engine(threads: usize) -> Result<Engine> {
    Engine::new(EngineConfig {
        threads: Some(threads),
        ..EngineConfig::default()
    })
}

/// Concatenate a merge phase's shards into `dir/<name>.csv`.
pub fn assemble(out: &MergeOutput, dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(format!("{name}.csv"));
    concat_shards(&out.header, &out.shards, &path)?;
    Ok(path)
}

/// Run every feature phase in order and return the fully enriched file.
pub fn enrich(engine: &Engine, input: &Path, dir: &Path, n_chunks: usize) -> Result<PathBuf> {
    let v = engine.velocity_phase(input, n_chunks, &dir.join("velocity"))?;
    let input = assemble(&v, dir, "with_velocity")?;
    let t = engine.text_phase(&input, n_chunks, &dir.join("text"), &LexiconScorer::default())?;
    let input = assemble(&t, dir, "with_text")?;
    let m = engine.market_phase(&input, n_chunks, &dir.join("market"))?;
    let input = assemble(&m, dir, "with_market")?;
    let s = engine.source_tier_phase(&input, n_chunks, &dir.join("source_tier"))?;
    assemble(&s, dir, "enriched")
}
