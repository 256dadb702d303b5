// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// The `gzip` codec: a general-purpose default for byte-oriented storage,
// with its compression level persisted in the codec params. Backed by
// `flate2`, the crate the pack's ANCF CLI example
// (examples/wesleyscholl-squish/ancf_cli) already depends on for the same
// purpose.

use super::{BlockShape, Codec};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};

const MAX_LEVEL: u8 = 9;

/// Gzip/deflate codec. The codec-params byte blob is a single byte: the
/// compression level, `0..=9`, persisted so a block written at one level
/// decodes correctly regardless of what level future writes use, mirroring
/// the `CompressionType::Zlib(level)` encode/decode split between a tag
/// byte and a level byte seen elsewhere in this crate's lineage
/// (`src/compression.rs`).
pub struct GzipCodec;

impl GzipCodec {
    fn level_from_params(params: &[u8]) -> crate::Result<u8> {
        match params.first() {
            Some(&level) if level <= MAX_LEVEL => Ok(level),
            Some(&level) => Err(crate::Error::CodecFailure(format!(
                "gzip level {level} exceeds max {MAX_LEVEL}"
            ))),
            None => Ok(6), // flate2's own default
        }
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn encode(&self, raw: &[u8], shape: BlockShape, params: &[u8]) -> crate::Result<Vec<u8>> {
        if raw.len() != shape.nominal_bytes() {
            return Err(crate::Error::ShapeMismatch {
                expected: shape.nominal_bytes(),
                got: raw.len(),
            });
        }

        let level = Self::level_from_params(params)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(u32::from(level)));
        encoder
            .write_all(raw)
            .map_err(|e| crate::Error::CodecFailure(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| crate::Error::CodecFailure(e.to_string()))
    }

    fn decode(&self, bytes: &[u8], shape: BlockShape, _params: &[u8]) -> crate::Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(bytes);
        let mut raw = Vec::with_capacity(shape.nominal_bytes());
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| crate::Error::CodecFailure(e.to_string()))?;

        if raw.len() != shape.nominal_bytes() {
            return Err(crate::Error::ShapeMismatch {
                expected: shape.nominal_bytes(),
                got: raw.len(),
            });
        }

        Ok(raw)
    }
}
