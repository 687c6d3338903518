//! Headerless per-range shard files.
//!
//! Every merge worker owns exactly one shard path, so shard writes never
//! contend. Shards carry no header; whoever concatenates them prepends the
//! single header line once (see [`shard_header`]).

use crate::io::plan::ByteRange;
use crate::schema::Schema;
use anyhow::{Context, Result};
use csv::{StringRecord, WriterBuilder};
use std::fs::{File, create_dir_all};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Shard path for `range` inside `dir`: `<prefix>_<index:05>.csv`.
#[must_use]
pub fn shard_path(dir: impl AsRef<Path>, prefix: &str, range: &ByteRange) -> PathBuf {
    dir.as_ref().join(format!("{prefix}_{:05}.csv", range.index))
}

/// Write `rows` headerless to `path`, creating parent directories.
///
/// # Returns
/// The number of rows written.
///
/// # Errors
/// Fails when the directory or file cannot be created or a row cannot be
/// written.
pub fn write_shard<'a>(
    path: impl AsRef<Path>,
    rows: impl IntoIterator<Item = &'a StringRecord>,
    delimiter: u8,
) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .from_writer(BufWriter::new(f));
    let mut n = 0usize;
    for row in rows {
        wtr.write_record(row)
            .with_context(|| format!("write shard row #{} to {}", n + 1, path.display()))?;
        n += 1;
    }
    wtr.flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(n)
}

/// The header line (with terminator) matching the shards of one merge.
///
/// # Errors
/// Fails only if the in-memory writer fails.
pub fn shard_header(schema: &Schema, delimiter: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut wtr = WriterBuilder::new()
            .has_headers(false)
            .delimiter(delimiter)
            .from_writer(&mut buf);
        wtr.write_record(schema.columns())?;
        wtr.flush()?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_without_header_and_quotes_delimiters() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = shard_path(dir.path().join("nested"), "velocity", &ByteRange::new(3, 0, 0));
        assert!(path.ends_with("nested/velocity_00003.csv"));
        let rows = vec![
            StringRecord::from(vec!["1", "Hello, world", "3"]),
            StringRecord::from(vec!["2", "plain", ""]),
        ];
        let n = write_shard(&path, &rows, b',')?;
        assert_eq!(n, 2);
        let text = std::fs::read_to_string(&path)?;
        assert_eq!(text, "1,\"Hello, world\",3\n2,plain,\n");
        Ok(())
    }

    #[test]
    fn header_line() -> Result<()> {
        let h = shard_header(&Schema::new(["a", "b"]), b',')?;
        assert_eq!(h, b"a,b\n");
        Ok(())
    }
}
