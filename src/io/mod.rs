//! File plumbing: byte-range planning, chunk reading, shard writing.

pub mod chunk;
pub mod plan;
pub mod shard;

pub use chunk::{Chunk, read_chunk, read_range_bytes};
pub use plan::{ByteRange, plan_chunks};
pub use shard::{shard_header, shard_path, write_shard};
