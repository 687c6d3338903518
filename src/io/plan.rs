//! Chunk planning: row-aligned byte ranges over one delimited file.
//!
//! Unlike row-count sharding, a byte plan never parses the file. Each
//! nominal boundary is nudged forward to just past the next line terminator,
//! so no row straddles two ranges, and the last range absorbs whatever is
//! left up to EOF.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Half-open byte span `[start, start + length)` of the source file.
///
/// `index` is the range's position within its plan; shard files and
/// per-chunk sampling seeds are derived from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub index: usize,
    pub start: u64,
    pub length: u64,
}

impl ByteRange {
    #[must_use]
    pub const fn new(index: usize, start: u64, length: u64) -> Self {
        Self {
            index,
            start,
            length,
        }
    }

    /// One past the last byte; saturates for a malformed range.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The first range of a file carries the header line.
    #[must_use]
    pub const fn has_header(&self) -> bool {
        self.start == 0
    }
}

/// Split `path` into `n_chunks` contiguous, newline-aligned ranges.
///
/// Always returns exactly `n_chunks` ranges whose lengths sum to the file
/// size. When the file holds fewer rows than `n_chunks`, trailing ranges are
/// empty.
///
/// # Errors
/// Fails when `n_chunks` is zero or the file cannot be read.
pub fn plan_chunks(path: impl AsRef<Path>, n_chunks: usize) -> Result<Vec<ByteRange>> {
    let path = path.as_ref();
    if n_chunks == 0 {
        bail!("cannot plan {} into zero chunks", path.display());
    }
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let file_size = f
        .metadata()
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    let nominal = file_size / n_chunks as u64;

    let mut rdr = BufReader::new(f);
    let mut scratch = Vec::new();
    let mut ranges = Vec::with_capacity(n_chunks);
    let mut current = 0u64;

    for index in 0..n_chunks {
        if index == n_chunks - 1 {
            ranges.push(ByteRange::new(index, current, file_size - current));
            break;
        }
        let target = current + nominal;
        let end = if target >= file_size {
            file_size
        } else {
            rdr.seek(SeekFrom::Start(target))
                .with_context(|| format!("seek {} to {target}", path.display()))?;
            scratch.clear();
            let read = rdr
                .read_until(b'\n', &mut scratch)
                .with_context(|| format!("scan {} from {target}", path.display()))?;
            target + read as u64
        };
        ranges.push(ByteRange::new(index, current, end - current));
        current = end;
    }

    Ok(ranges)
}
