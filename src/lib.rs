// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! BlockFS is a file-based storage engine for large 3-D scalar volumes
//! (imaging data intended for viewers such as Neuroglancer).
//!
//! A volume is partitioned into fixed-size rectangular blocks; the engine
//! persists each block compressed, indexes it by grid coordinate, and
//! supports concurrent append-only writing from many producers plus
//! random-access reads. Blocks are written whole, at most once: there is
//! no partial-block update, in-place overwrite, or deletion. Reading a
//! never-written block returns `Ok(None)` rather than an error.
//!
//! # Example usage
//!
//! ```
//! use blockfs::{CreateOptions, DType, Directory};
//! # let dir = tempfile::tempdir()?;
//! # let path = dir.path().join("vol.blockfs");
//!
//! // A Directory owns a volume's index, header, and append-only BlockFiles.
//! let directory = CreateOptions::new(/* extent */ (8, 8, 8), /* block extent */ (4, 4, 4), DType::U16)
//!     .worker_count(2)
//!     .create(&path)?
//!     .start_writer_processes();
//!
//! directory.write_block(&[0u8; 128], 0, 0, 0)?;
//! directory.write_block(&[0xFFu8; 128], 1, 1, 1)?;
//!
//! // `close` drains the writer pool and persists the index.
//! let error_log = directory.close()?;
//! assert!(error_log.is_empty());
//!
//! // Reopen read-only and look blocks back up by grid coordinate.
//! let directory = Directory::open(&path)?;
//! assert_eq!(directory.read_block(0, 0, 0)?, Some(vec![0u8; 128]));
//! assert_eq!(directory.read_block(1, 0, 0)?, None); // never written
//! # Ok::<(), blockfs::Error>(())
//! ```
//!
//! # Concurrency model
//!
//! Writes are distributed across `W` [`writer_pool::WriterPool`] workers
//! by a stable hash of the block coordinate, so a given coordinate is
//! always routed to the same worker — this is what lets duplicate
//! submissions be rejected without any cross-worker locking. Each worker
//! owns exactly one BlockFile and appends to it exclusively; a
//! single-consumer background thread applies successful appends to the
//! shared index. See [`Directory`] for the full read/write contract.

mod block_file;
mod checksum;
mod coding;
pub mod codec;
mod coord;
mod directory;
mod dtype;
mod error;
mod fs;
mod header;
mod index;
pub mod rebase;
mod volume;
pub mod writer_pool;

pub use codec::{BlockShape, Codec, CodecRegistry};
pub use coord::BlockCoord;
pub use directory::{CreateOptions, Directory};
pub use dtype::DType;
pub use error::{Error, Result};
pub use index::Entry as IndexEntry;
pub use rebase::{duplicate, rebase, relocate};
pub use volume::Volume;
pub use writer_pool::LogEntry;
