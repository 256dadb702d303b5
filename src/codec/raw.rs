// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// The `raw` codec: no transformation. Always available, not feature-gated.

use super::{BlockShape, Codec};

/// Identity codec. Stored bytes are exactly the little-endian packed
/// voxel array in `z, y, x` order.
pub struct RawCodec;

impl Codec for RawCodec {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn encode(&self, raw: &[u8], shape: BlockShape, _params: &[u8]) -> crate::Result<Vec<u8>> {
        if raw.len() != shape.nominal_bytes() {
            return Err(crate::Error::ShapeMismatch {
                expected: shape.nominal_bytes(),
                got: raw.len(),
            });
        }
        Ok(raw.to_vec())
    }

    fn decode(&self, bytes: &[u8], shape: BlockShape, _params: &[u8]) -> crate::Result<Vec<u8>> {
        if bytes.len() != shape.nominal_bytes() {
            return Err(crate::Error::ShapeMismatch {
                expected: shape.nominal_bytes(),
                got: bytes.len(),
            });
        }
        Ok(bytes.to_vec())
    }
}
