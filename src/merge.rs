//! Pass B: re-read one range in full, join it against the global lookup and
//! write the range's shard.

use crate::io::{ByteRange, read_chunk, write_shard};
use crate::metrics::PhaseStats;
use crate::reduce::KeyedLookup;
use crate::schema::Schema;
use anyhow::Result;
use csv::StringRecord;
use std::path::Path;

/// Column layout of every shard written against `lookup`.
///
/// Derived columns already in `schema` are dropped and re-appended, so
/// merging an already merged file keeps the same layout.
#[must_use]
pub fn merged_schema(schema: &Schema, lookup: &KeyedLookup) -> Schema {
    schema.merged(&lookup.value_columns, &lookup.value_columns)
}

/// Left-join one range against `lookup` and write it to `shard`.
///
/// Rows keep their order. Keys without an entry get `lookup.defaults` and
/// count as join misses. An empty range still writes an empty shard, so the
/// shard set always matches the plan.
///
/// # Errors
/// Fails on read/write errors or when the file lacks a key column.
pub fn merge_range(
    input: &Path,
    range: &ByteRange,
    schema: &Schema,
    lookup: &KeyedLookup,
    shard: &Path,
    delimiter: u8,
) -> Result<PhaseStats> {
    let chunk = read_chunk(input, range, schema, None, delimiter)?;
    let mut stats = PhaseStats::for_chunk(chunk.len());

    let key_idx: Vec<usize> = lookup
        .key_columns
        .iter()
        .map(|k| chunk.index_of(k))
        .collect::<Result<_>>()?;
    let kept: Vec<usize> = (0..chunk.columns().len())
        .filter(|&i| !lookup.value_columns.contains(&chunk.columns()[i].as_str()))
        .collect();

    let mut out: Vec<StringRecord> = Vec::with_capacity(chunk.len());
    for row in chunk.rows() {
        let values = lookup.get_record(row, &key_idx).unwrap_or_else(|| {
            stats.join_misses += 1;
            lookup.defaults.as_slice()
        });
        let mut rec = StringRecord::with_capacity(row.as_slice().len(), kept.len() + values.len());
        for &i in &kept {
            rec.push_field(&row[i]);
        }
        for v in values {
            rec.push_field(&v.render());
        }
        out.push(rec);
    }

    stats.rows_emitted = write_shard(shard, &out, delimiter)? as u64;
    stats.shards_written = 1;
    Ok(stats)
}
