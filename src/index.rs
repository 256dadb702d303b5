// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// Dense in-memory index mapping block coordinate to (file, offset, size).

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::coord::BlockCoord;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// One index slot: `(file_id, offset, nbytes)`.
///
/// `nbytes == 0` (equivalently, the all-zero entry) denotes "block absent".
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct Entry {
    pub file_id: u16,
    pub offset: u64,
    pub nbytes: u32,
}

impl Entry {
    #[must_use]
    pub fn absent() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.nbytes > 0
    }
}

impl Encode for Entry {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u16::<byteorder::LittleEndian>(self.file_id)?;
        writer.write_u64::<byteorder::LittleEndian>(self.offset)?;
        writer.write_u32::<byteorder::LittleEndian>(self.nbytes)?;
        Ok(())
    }
}

impl Decode for Entry {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let file_id = reader.read_u16::<byteorder::LittleEndian>()?;
        let offset = reader.read_u64::<byteorder::LittleEndian>()?;
        let nbytes = reader.read_u32::<byteorder::LittleEndian>()?;
        Ok(Self {
            file_id,
            offset,
            nbytes,
        })
    }
}

/// Dense array of [`Entry`], indexed by the linearised grid coordinate.
///
/// Chosen over a hash map: the grid is known at creation time and lookup
/// sits on the read hot path, so a dense array gives O(1) access with no
/// hashing and a trivial serialisation format.
#[derive(Clone, Debug)]
pub struct Index {
    entries: Vec<Entry>,
    grid_extent: (u32, u32, u32),
}

impl Index {
    /// Builds an all-absent index for the given grid extent.
    #[must_use]
    pub fn new_absent(grid_extent: (u32, u32, u32)) -> Self {
        let (nx, ny, nz) = grid_extent;
        let len = u64::from(nx) * u64::from(ny) * u64::from(nz);
        Self {
            entries: vec![Entry::absent(); usize_from_u64(len)],
            grid_extent,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index_of(&self, coord: BlockCoord) -> Option<usize> {
        let (nx, ny, nz) = self.grid_extent;
        coord
            .linear_index(nx, ny, nz)
            .map(|idx| usize_from_u64(idx))
    }

    /// Looks up the entry for `coord`. Returns `None` both when the
    /// coordinate is out of range and when (in range but) absent is
    /// ambiguous at this layer — callers distinguish out-of-range via
    /// `Volume::grid_extent` before calling, as `Directory::read_block`
    /// does.
    #[must_use]
    pub fn get(&self, coord: BlockCoord) -> Option<Entry> {
        self.index_of(coord).and_then(|i| self.entries.get(i).copied())
    }

    /// Records a successful append.
    ///
    /// # Panics
    ///
    /// Panics if `coord` is out of the index's grid extent, or if the cell
    /// is already populated (a contract violation — callers must check
    /// `get` for presence first via the duplicate-detection path in the
    /// writer pool, which this call assumes has already happened).
    pub fn put(&mut self, coord: BlockCoord, entry: Entry) {
        let i = self
            .index_of(coord)
            .expect("coord must be validated before put");
        let slot = self
            .entries
            .get_mut(i)
            .expect("index bounds already checked by index_of");
        assert!(
            !slot.is_present(),
            "duplicate put to already-populated index cell"
        );
        *slot = entry;
    }

    /// Serialises the index length followed by every entry, little-endian.
    pub fn serialise<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u64::<byteorder::LittleEndian>(self.entries.len() as u64)?;
        for entry in &self.entries {
            entry.encode_into(writer)?;
        }
        Ok(())
    }

    /// The highest `offset + nbytes` among present entries referencing each
    /// `file_id`, for `file_id` in `0..num_files`. Used on reopen to
    /// truncate each BlockFile back to its last committed append.
    #[must_use]
    pub fn committed_lengths(&self, num_files: u16) -> Vec<u64> {
        let mut lengths = vec![0u64; usize::from(num_files)];
        for entry in &self.entries {
            if !entry.is_present() {
                continue;
            }
            if let Some(slot) = lengths.get_mut(usize::from(entry.file_id)) {
                let end = entry.offset + u64::from(entry.nbytes);
                if end > *slot {
                    *slot = end;
                }
            }
        }
        lengths
    }

    /// Deserialises an index of `grid_extent`, verifying the on-disk length
    /// matches `Nx*Ny*Nz`.
    pub fn deserialise<R: Read>(
        reader: &mut R,
        grid_extent: (u32, u32, u32),
    ) -> Result<Self, DecodeError> {
        let len = reader.read_u64::<byteorder::LittleEndian>()?;
        let (nx, ny, nz) = grid_extent;
        let expected = u64::from(nx) * u64::from(ny) * u64::from(nz);
        if len != expected {
            return Err(DecodeError::InvalidHeader("index length does not match grid extent"));
        }

        let mut entries = Vec::with_capacity(usize_from_u64(len));
        for _ in 0..len {
            entries.push(Entry::decode_from(reader)?);
        }

        Ok(Self {
            entries,
            grid_extent,
        })
    }
}

fn usize_from_u64(v: u64) -> usize {
    usize::try_from(v).expect("index length exceeds addressable memory on this platform")
}
