// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// Voxel element type, as persisted in the directory-file header.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Element type of a volume's voxels.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DType {
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer, little-endian.
    U16,
    /// Unsigned 32-bit integer, little-endian.
    U32,
    /// Unsigned 64-bit integer, little-endian.
    U64,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer, little-endian.
    I16,
    /// Signed 32-bit integer, little-endian.
    I32,
    /// Signed 64-bit integer, little-endian.
    I64,
    /// IEEE-754 32-bit float, little-endian.
    F32,
    /// IEEE-754 64-bit float, little-endian.
    F64,
}

impl DType {
    /// Width in bytes of a single voxel of this type.
    #[must_use]
    pub fn byte_width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    /// Whether this dtype is an 8- or 16-bit integer type, the only kinds
    /// the `lossless-image` codec accepts.
    #[must_use]
    pub fn is_image_compatible(self) -> bool {
        matches!(self, Self::U8 | Self::U16)
    }
}

impl From<DType> for u16 {
    fn from(value: DType) -> Self {
        match value {
            DType::U8 => 0,
            DType::U16 => 1,
            DType::U32 => 2,
            DType::U64 => 3,
            DType::I8 => 4,
            DType::I16 => 5,
            DType::I32 => 6,
            DType::I64 => 7,
            DType::F32 => 8,
            DType::F64 => 9,
        }
    }
}

impl TryFrom<u16> for DType {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::U8),
            1 => Ok(Self::U16),
            2 => Ok(Self::U32),
            3 => Ok(Self::U64),
            4 => Ok(Self::I8),
            5 => Ok(Self::I16),
            6 => Ok(Self::I32),
            7 => Ok(Self::I64),
            8 => Ok(Self::F32),
            9 => Ok(Self::F64),
            other => Err(other),
        }
    }
}

impl Encode for DType {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u16::<byteorder::LittleEndian>((*self).into())?;
        Ok(())
    }
}

impl Decode for DType {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let code = reader.read_u16::<byteorder::LittleEndian>()?;
        #[allow(clippy::cast_possible_truncation)]
        DType::try_from(code).map_err(|_| DecodeError::InvalidTag("DType", code as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let all = [
            DType::U8,
            DType::U16,
            DType::U32,
            DType::U64,
            DType::I8,
            DType::I16,
            DType::I32,
            DType::I64,
            DType::F32,
            DType::F64,
        ];

        for dtype in all {
            let bytes = dtype.encode_into_vec().expect("encode");
            let mut cursor = std::io::Cursor::new(bytes);
            let decoded = DType::decode_from(&mut cursor).expect("decode");
            assert_eq!(dtype, decoded);
        }
    }

    #[test]
    fn byte_widths_match_known_widths() {
        assert_eq!(DType::U8.byte_width(), 1);
        assert_eq!(DType::I16.byte_width(), 2);
        assert_eq!(DType::F32.byte_width(), 4);
        assert_eq!(DType::F64.byte_width(), 8);
    }

    #[test]
    fn unknown_code_is_invalid_tag() {
        let mut cursor = std::io::Cursor::new(10u16.to_le_bytes());
        let err = DType::decode_from(&mut cursor).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTag("DType", 10)));
    }
}
