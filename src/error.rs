// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{DecodeError, EncodeError},
    coord::BlockCoord,
};

/// Errors that can occur while creating, writing to, or reading a BlockFS
/// directory.
#[derive(Debug)]
pub enum Error {
    /// I/O error.
    Io(std::io::Error),

    /// Serialization failed.
    Encode(EncodeError),

    /// Deserialization failed.
    Decode(DecodeError),

    /// `Directory::create` was called with a path that already exists.
    AlreadyExists(std::path::PathBuf),

    /// `Directory::open` was called with a path that does not exist or
    /// could not be read.
    NotFound(std::path::PathBuf),

    /// Magic mismatch, unsupported version, CRC mismatch, or truncated file.
    FormatError(String),

    /// The codec name in the header (or passed to the registry) has no
    /// registered implementation.
    UnsupportedCodec(String),

    /// A coordinate passed to `write_block`/`read_block` lies outside the
    /// volume's block grid.
    OutOfRange(BlockCoord),

    /// A submitted block's byte length did not match the volume's nominal
    /// block shape and dtype.
    ShapeMismatch {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        got: usize,
    },

    /// A submitted block's dtype did not match the volume's dtype.
    DtypeMismatch,

    /// Encoding/decoding failed inside a codec implementation.
    CodecFailure(String),

    /// I/O or decode error encountered while reading a block in
    /// `read_block`; a missing block still returns `Ok(None)`, this is
    /// only for a present block that couldn't actually be read back.
    ReadFailure(String),

    /// The directory file itself could not be written during `flush`/`close`.
    ///
    /// This is the one fatal-at-process-level condition; all other
    /// background errors are accumulated in the error log instead.
    DirectoryPersistFailure(std::io::Error),

    /// `write_block`/`flush`/`close` was called on a directory that never
    /// started a writer pool: one opened read-only via `Directory::open`,
    /// or one already consumed by a prior `close`.
    NotWritable,

    /// `CreateOptions::worker_count` was set to `0`; a volume needs at
    /// least one BlockFile to route writes to.
    InvalidWorkerCount,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockFsError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::DirectoryPersistFailure(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// BlockFS result type.
pub type Result<T> = std::result::Result<T, Error>;
