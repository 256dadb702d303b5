// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// Binary (de)serialization primitives shared by the header, index and codec
// parameter blobs.

use std::io::{Read, Write};

/// Error during serialization.
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error writing to the underlying sink.
    Io(std::io::Error),

    /// A value does not fit the on-disk representation (e.g. a codec name
    /// longer than `u16::MAX` bytes).
    TooLarge(&'static str),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "EncodeError::Io({e})"),
            Self::TooLarge(what) => write!(f, "EncodeError::TooLarge({what})"),
        }
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::TooLarge(_) => None,
        }
    }
}

/// Error during deserialization.
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error reading from the underlying source.
    Io(std::io::Error),

    /// The magic bytes or header shape did not match.
    InvalidHeader(&'static str),

    /// An on-disk version is not supported by this build.
    InvalidVersion(u16),

    /// An enumerated tag byte did not map to a known variant.
    InvalidTag(&'static str, u8),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "DecodeError::Io({e})"),
            Self::InvalidHeader(what) => write!(f, "DecodeError::InvalidHeader({what})"),
            Self::InvalidVersion(v) => write!(f, "DecodeError::InvalidVersion({v})"),
            Self::InvalidTag(field, tag) => {
                write!(f, "DecodeError::InvalidTag({field}, {tag})")
            }
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Trait for types with a fixed on-disk encoding.
pub trait Encode {
    /// Serializes `self` into `writer`.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into a freshly allocated vector.
    fn encode_into_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let mut v = vec![];
        self.encode_into(&mut v)?;
        Ok(v)
    }
}

/// Trait for types with a fixed on-disk decoding.
pub trait Decode {
    /// Deserializes `Self` from `reader`.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ReadBytesExt, WriteBytesExt};

    struct Pair(u16, u32);

    impl Encode for Pair {
        fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
            writer.write_u16::<byteorder::LittleEndian>(self.0)?;
            writer.write_u32::<byteorder::LittleEndian>(self.1)?;
            Ok(())
        }
    }

    impl Decode for Pair {
        fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
            let a = reader.read_u16::<byteorder::LittleEndian>()?;
            let b = reader.read_u32::<byteorder::LittleEndian>()?;
            Ok(Self(a, b))
        }
    }

    #[test]
    fn round_trips() {
        let p = Pair(7, 1234);
        let bytes = p.encode_into_vec().expect("encode");
        assert_eq!(bytes.len(), 6);

        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = Pair::decode_from(&mut cursor).expect("decode");
        assert_eq!((decoded.0, decoded.1), (7, 1234));
    }
}
