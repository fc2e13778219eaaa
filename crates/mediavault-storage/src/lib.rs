#![forbid(unsafe_code)]

//! Filesystem chunk storage.
//!
//! A payload is stored as a contiguous set of numbered chunk files
//! (`{file_id}.part0`, `.part1`, …) plus an extension sidecar, under a
//! date-partitioned directory tree. Chunk sets are written once by a
//! single writer, read by any number of concurrent readers, and only
//! ever deleted, never mutated.

mod assemble;
mod chunks;
mod error;
mod layout;

pub use assemble::{assemble, assemble_from, ordered_chunk_paths, resolve_extension};
pub use chunks::ChunkStore;
pub use error::{StorageError, StorageResult};
pub use layout::{find_in_partitions, partition_dir, partition_name};
