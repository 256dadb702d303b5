// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// Immutable volume parameters and derived grid extent.

use crate::dtype::DType;

/// Immutable, global parameters of a volume: voxel extent, block extent,
/// element type, and the codec used to compress each block.
///
/// Constructed once at `Directory::create` time and never mutated
/// afterwards; `Directory::open` reconstructs an equal `Volume` from the
/// persisted header.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    /// Voxel extent `(X, Y, Z)`.
    pub extent: (u64, u64, u64),

    /// Block extent `(bx, by, bz)` in voxels.
    pub block_extent: (u32, u32, u32),

    /// Element type.
    pub dtype: DType,

    /// Codec name, resolved against a `CodecRegistry` at open time.
    pub codec_name: String,

    /// Opaque, codec-specific parameter bytes (e.g. a gzip level).
    pub codec_params: Vec<u8>,
}

impl Volume {
    /// Builds a new volume, validating that the block extent is non-zero
    /// in every dimension.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ShapeMismatch`] if any block-extent
    /// component is zero.
    pub fn new(
        extent: (u64, u64, u64),
        block_extent: (u32, u32, u32),
        dtype: DType,
        codec_name: impl Into<String>,
        codec_params: Vec<u8>,
    ) -> crate::Result<Self> {
        let (bx, by, bz) = block_extent;
        if bx == 0 || by == 0 || bz == 0 {
            return Err(crate::Error::ShapeMismatch {
                expected: 1,
                got: 0,
            });
        }

        Ok(Self {
            extent,
            block_extent,
            dtype,
            codec_name: codec_name.into(),
            codec_params,
        })
    }

    /// Grid extent `(Nx, Ny, Nz) = (ceil(X/bx), ceil(Y/by), ceil(Z/bz))`.
    #[must_use]
    pub fn grid_extent(&self) -> (u32, u32, u32) {
        let (x, y, z) = self.extent;
        let (bx, by, bz) = self.block_extent;
        (
            ceil_div(x, u64::from(bx)),
            ceil_div(y, u64::from(by)),
            ceil_div(z, u64::from(bz)),
        )
    }

    /// Total number of block-grid cells, `Nx*Ny*Nz`.
    #[must_use]
    pub fn grid_cell_count(&self) -> u64 {
        let (nx, ny, nz) = self.grid_extent();
        u64::from(nx) * u64::from(ny) * u64::from(nz)
    }

    /// Nominal voxel count of a single block: `bx*by*bz`.
    #[must_use]
    pub fn nominal_voxel_count(&self) -> u64 {
        let (bx, by, bz) = self.block_extent;
        u64::from(bx) * u64::from(by) * u64::from(bz)
    }

    /// Nominal byte size of a single block's raw (uncompressed) form:
    /// `bx*by*bz*dtype.byte_width()`.
    #[must_use]
    pub fn nominal_block_bytes(&self) -> usize {
        #[allow(clippy::cast_possible_truncation)]
        let count = self.nominal_voxel_count() as usize;
        count * self.dtype.byte_width()
    }

    /// A block's voxel origin `(gx*bx, gy*by, gz*bz)`.
    #[must_use]
    pub fn block_origin(&self, coord: crate::coord::BlockCoord) -> (u64, u64, u64) {
        let (bx, by, bz) = self.block_extent;
        (
            u64::from(coord.gx) * u64::from(bx),
            u64::from(coord.gy) * u64::from(by),
            u64::from(coord.gz) * u64::from(bz),
        )
    }
}

fn ceil_div(a: u64, b: u64) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    (a.div_ceil(b)) as u32
}
