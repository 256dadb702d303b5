// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// Directory-file header, with a byte-exact on-disk layout. The index
// itself (length + entries) is encoded by `crate::index::Index`; `Header`
// covers everything before and after it (magic through path table, plus
// the trailing CRC read/verify).

use crate::checksum::{Checksum, ChecksummedWriter};
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::dtype::DType;
use crate::volume::Volume;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const MAGIC: &[u8; 8] = b"BLOCKFS\0";
const VERSION: u16 = 1;

/// Preamble of the directory file: magic, version, volume parameters and
/// the BlockFile path table. Does not include the index or its CRC.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub volume: Volume,
    pub paths: Vec<String>,
}

impl Header {
    /// Number of BlockFiles (`W`), i.e. the length of the path table.
    #[must_use]
    pub fn worker_count(&self) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let w = self.paths.len() as u16;
        w
    }
}

impl Encode for Header {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(MAGIC)?;
        writer.write_u16::<byteorder::LittleEndian>(VERSION)?;
        self.volume.dtype.encode_into(writer)?;

        let (x, y, z) = self.volume.extent;
        writer.write_u64::<byteorder::LittleEndian>(x)?;
        writer.write_u64::<byteorder::LittleEndian>(y)?;
        writer.write_u64::<byteorder::LittleEndian>(z)?;

        let (bx, by, bz) = self.volume.block_extent;
        writer.write_u32::<byteorder::LittleEndian>(bx)?;
        writer.write_u32::<byteorder::LittleEndian>(by)?;
        writer.write_u32::<byteorder::LittleEndian>(bz)?;

        write_len_prefixed(writer, self.volume.codec_name.as_bytes())?;
        write_len_prefixed(writer, &self.volume.codec_params)?;

        if self.paths.len() > usize::from(u16::MAX) {
            return Err(EncodeError::TooLarge("path table"));
        }
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u16::<byteorder::LittleEndian>(self.paths.len() as u16)?;
        for path in &self.paths {
            write_len_prefixed(writer, path.as_bytes())?;
        }

        Ok(())
    }
}

impl Decode for Header {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(DecodeError::InvalidHeader("magic mismatch"));
        }

        let version = reader.read_u16::<byteorder::LittleEndian>()?;
        if version != VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }

        let dtype = DType::decode_from(reader)?;

        let x = reader.read_u64::<byteorder::LittleEndian>()?;
        let y = reader.read_u64::<byteorder::LittleEndian>()?;
        let z = reader.read_u64::<byteorder::LittleEndian>()?;

        let bx = reader.read_u32::<byteorder::LittleEndian>()?;
        let by = reader.read_u32::<byteorder::LittleEndian>()?;
        let bz = reader.read_u32::<byteorder::LittleEndian>()?;

        let codec_name_bytes = read_len_prefixed(reader)?;
        let codec_name = String::from_utf8(codec_name_bytes)
            .map_err(|_| DecodeError::InvalidHeader("codec name is not valid UTF-8"))?;
        let codec_params = read_len_prefixed(reader)?;

        let worker_count = reader.read_u16::<byteorder::LittleEndian>()?;
        let mut paths = Vec::with_capacity(usize::from(worker_count));
        for _ in 0..worker_count {
            let bytes = read_len_prefixed(reader)?;
            let path = String::from_utf8(bytes)
                .map_err(|_| DecodeError::InvalidHeader("block-file path is not valid UTF-8"))?;
            paths.push(path);
        }

        let volume = Volume::new((x, y, z), (bx, by, bz), dtype, codec_name, codec_params)
            .map_err(|_| DecodeError::InvalidHeader("zero block extent in persisted header"))?;

        Ok(Self { volume, paths })
    }
}

fn write_len_prefixed<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<(), EncodeError> {
    if bytes.len() > usize::from(u16::MAX) {
        return Err(EncodeError::TooLarge("length-prefixed field"));
    }
    #[allow(clippy::cast_possible_truncation)]
    writer.write_u16::<byteorder::LittleEndian>(bytes.len() as u16)?;
    writer.write_all(bytes)?;
    Ok(())
}

fn read_len_prefixed<R: Read>(reader: &mut R) -> Result<Vec<u8>, DecodeError> {
    let len = reader.read_u16::<byteorder::LittleEndian>()?;
    let mut buf = vec![0u8; usize::from(len)];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Encodes `header` + `index` followed by the trailing CRC-32 over all
/// prior bytes, writing the whole directory-file body to `writer`.
pub fn write_directory_file<W: Write>(
    writer: W,
    header: &Header,
    index: &crate::index::Index,
) -> Result<(), EncodeError> {
    let mut checksummed = ChecksummedWriter::new(writer);
    header.encode_into(&mut checksummed)?;
    index.serialise(&mut checksummed)?;
    let checksum = checksummed.checksum();
    let mut inner = checksummed.into_inner();
    inner.write_u32::<byteorder::LittleEndian>(checksum.into_u32())?;
    Ok(())
}

/// Reads a complete directory-file body, verifying the trailing CRC-32
/// against everything preceding it.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidHeader`] if the trailing CRC does not
/// match — any single-bit mutation of the directory file causes `open` to
/// fail this way rather than returning corrupted data.
pub fn read_directory_file(bytes: &[u8]) -> Result<(Header, crate::index::Index), DecodeError> {
    if bytes.len() < 4 {
        return Err(DecodeError::InvalidHeader("file too short to contain a CRC trailer"));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - 4);
    let expected = Checksum::from_raw(crc32fast::hash(body));
    let actual = Checksum::from_raw(u32::from_le_bytes(
        trailer.try_into().expect("trailer is exactly 4 bytes"),
    ));
    if expected != actual {
        return Err(DecodeError::InvalidHeader("CRC-32 mismatch"));
    }

    let mut cursor = std::io::Cursor::new(body);
    let header = Header::decode_from(&mut cursor)?;
    let grid_extent = header.volume.grid_extent();
    let index = crate::index::Index::deserialise(&mut cursor, grid_extent)?;
    Ok((header, index))
}
