// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// Codec trait and name registry.
//
// A codec is a stateless, deterministic `encode`/`decode` pair, selected by
// name stored in the directory header. The trait shape mirrors
// `ancf_core::codec::Codec` (examples/wesleyscholl-squish): a small
// `Send + Sync` trait operating on one independent block at a time, rather
// than a segment-wide `CompressionType` enum, because BlockFS treats
// codecs as a runtime-pluggable extension point for external
// collaborators rather than a closed set of compile-time compression
// backends.

mod raw;

#[cfg(feature = "gzip")]
mod gzip;

#[cfg(feature = "lossless-image")]
mod lossless_image;

pub use raw::RawCodec;

#[cfg(feature = "gzip")]
pub use gzip::GzipCodec;

#[cfg(feature = "lossless-image")]
pub use lossless_image::LosslessImageCodec;

use crate::dtype::DType;
use std::collections::HashMap;

/// The nominal, uncompressed shape a codec encodes/decodes against:
/// `(bz, by, bx)` in voxel counts, plus the volume's element type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockShape {
    pub bz: u32,
    pub by: u32,
    pub bx: u32,
    pub dtype: DType,
}

impl BlockShape {
    #[must_use]
    pub fn nominal_bytes(&self) -> usize {
        #[allow(clippy::cast_possible_truncation)]
        let voxels = u64::from(self.bz) * u64::from(self.by) * u64::from(self.bx);
        usize::try_from(voxels).expect("block too large for this platform") * self.dtype.byte_width()
    }
}

/// A stateless, named block codec.
///
/// Implementations must satisfy `decode(encode(b)) == b` for lossless
/// codecs. Codec parameters persisted in the directory header (e.g. a
/// gzip level) are opaque bytes the codec itself encodes/decodes; the
/// registry never interprets them.
pub trait Codec: Send + Sync {
    /// Stable name stored in the directory header and used to resolve this
    /// codec from the registry at open time.
    fn name(&self) -> &'static str;

    /// Encodes a raw, nominal-shape block into its stored byte
    /// representation.
    fn encode(&self, raw: &[u8], shape: BlockShape, params: &[u8]) -> crate::Result<Vec<u8>>;

    /// Decodes stored bytes back into a raw, nominal-shape block.
    fn decode(&self, bytes: &[u8], shape: BlockShape, params: &[u8]) -> crate::Result<Vec<u8>>;
}

/// Resolves a codec name to an implementation, the way `Directory::open`
/// does at load time: an unknown name at read time fails with
/// `UnsupportedCodec` rather than guessing.
pub struct CodecRegistry {
    codecs: HashMap<&'static str, Box<dyn Codec>>,
}

impl CodecRegistry {
    /// An empty registry with no codecs registered.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// A registry pre-populated with the codecs this build was compiled
    /// with: `raw` always, plus `gzip`/`lossless-image` when their Cargo
    /// features are enabled.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(RawCodec));

        #[cfg(feature = "gzip")]
        registry.register(Box::new(GzipCodec));

        #[cfg(feature = "lossless-image")]
        registry.register(Box::new(LosslessImageCodec));

        registry
    }

    /// Registers (or replaces) a codec implementation under its own name.
    pub fn register(&mut self, codec: Box<dyn Codec>) {
        self.codecs.insert(codec.name(), codec);
    }

    /// Resolves `name`, returning `UnsupportedCodec` if nothing is
    /// registered under it.
    pub fn resolve(&self, name: &str) -> crate::Result<&dyn Codec> {
        self.codecs
            .get(name)
            .map(std::convert::AsRef::as_ref)
            .ok_or_else(|| crate::Error::UnsupportedCodec(name.to_owned()))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
