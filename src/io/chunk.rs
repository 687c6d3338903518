//! Chunk reading: one [`ByteRange`] in, one parsed [`Chunk`] out.
//!
//! Each call opens its own file handle and seeks to the range start, so
//! concurrent readers never share a cursor.

use crate::io::plan::ByteRange;
use crate::schema::Schema;
use anyhow::{Context, Result, bail};
use csv::StringRecord;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// The rows parsed from one byte range, restricted to the requested columns.
///
/// Every row remembers the absolute byte offset it started at in the source
/// file; offsets identify rows independently of the chunk plan.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    columns: Vec<String>,
    rows: Vec<StringRecord>,
    offsets: Vec<u64>,
}

impl Chunk {
    /// # Panics
    /// Panics when `rows` and `offsets` differ in length.
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<StringRecord>, offsets: Vec<u64>) -> Self {
        assert_eq!(rows.len(), offsets.len(), "one offset per row");
        Self {
            columns,
            rows,
            offsets,
        }
    }

    /// A chunk with the given columns and no rows.
    #[must_use]
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            offsets: Vec::new(),
        }
    }

    /// Absolute byte offset of each row, parallel to [`Chunk::rows`].
    #[must_use]
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[StringRecord] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` within this chunk's columns.
    ///
    /// # Errors
    /// Fails when the chunk was not read with that column.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .with_context(|| format!("column {name:?} not loaded; have {:?}", self.columns))
    }
}

/// Read `range` of `path` and keep `columns` (all columns when `None`).
///
/// A range starting at offset 0 holds the header line; its names must equal
/// `schema`. Any other range is parsed headerless and named from `schema`.
/// Empty ranges, and a first range holding only the header, yield an empty
/// chunk.
///
/// # Errors
/// Fails on I/O errors, a header that disagrees with `schema`, a requested
/// column the schema lacks, or a row with the wrong number of fields.
pub fn read_chunk(
    path: impl AsRef<Path>,
    range: &ByteRange,
    schema: &Schema,
    columns: Option<&[&str]>,
    delimiter: u8,
) -> Result<Chunk> {
    let path = path.as_ref();
    let projection: Vec<usize> = match columns {
        Some(cols) => cols
            .iter()
            .map(|c| schema.index_of(c))
            .collect::<Result<_>>()?,
        None => (0..schema.len()).collect(),
    };
    let names: Vec<String> = projection
        .iter()
        .map(|&i| schema.columns()[i].clone())
        .collect();

    if range.is_empty() {
        return Ok(Chunk::empty(names));
    }

    let bytes = read_range_bytes(path, range)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(range.has_header())
        .delimiter(delimiter)
        .from_reader(bytes.as_slice());

    if range.has_header() {
        let header = rdr
            .headers()
            .with_context(|| format!("parse header of {}", path.display()))?;
        if header.iter().ne(schema.columns().iter().map(String::as_str)) {
            bail!(
                "header of {} {:?} does not match schema {:?}",
                path.display(),
                header,
                schema.columns()
            );
        }
    }

    let mut rows = Vec::new();
    let mut offsets = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| {
            format!(
                "parse record #{} of {} at byte {}",
                i + 1,
                path.display(),
                range.start
            )
        })?;
        if rec.len() != schema.len() {
            bail!(
                "record #{} of {} at byte {} has {} fields, schema has {}",
                i + 1,
                path.display(),
                range.start,
                rec.len(),
                schema.len()
            );
        }
        let at = rec.position().map_or(0, csv::Position::byte);
        offsets.push(range.start + at);
        rows.push(project(&rec, &projection));
    }

    Ok(Chunk::new(names, rows, offsets))
}

/// Raw bytes of `range`. Concatenating every range of a plan yields the file.
///
/// # Errors
/// Fails when the file cannot be read or the range runs past EOF.
pub fn read_range_bytes(path: impl AsRef<Path>, range: &ByteRange) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let file_len = f
        .metadata()
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    match range.start.checked_add(range.length) {
        Some(end) if end <= file_len => {}
        _ => bail!(
            "range {} ({} + {} bytes) runs past the end of {} ({file_len} bytes)",
            range.index,
            range.start,
            range.length,
            path.display()
        ),
    }
    f.seek(SeekFrom::Start(range.start))
        .with_context(|| format!("seek {} to {}", path.display(), range.start))?;
    let mut buf = Vec::with_capacity(usize::try_from(range.length.min(file_len)).unwrap_or(0));
    f.take(range.length)
        .read_to_end(&mut buf)
        .with_context(|| format!("read {} bytes of {}", range.length, path.display()))?;
    if buf.len() as u64 != range.length {
        bail!(
            "range {}..{} runs past the end of {} ({} bytes read)",
            range.start,
            range.end(),
            path.display(),
            buf.len()
        );
    }
    Ok(buf)
}

fn project(rec: &StringRecord, projection: &[usize]) -> StringRecord {
    if projection.len() == rec.len() && projection.iter().enumerate().all(|(i, &p)| i == p) {
        return rec.clone();
    }
    projection.iter().map(|&i| &rec[i]).collect()
}
