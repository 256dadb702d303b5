// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// CRC-32 trailer used by the directory-file header/index.

/// A 32-bit CRC checksum.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Checksum(u32);

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl Checksum {
    /// Wraps a raw CRC-32 value.
    #[must_use]
    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw 32-bit integer.
    #[must_use]
    pub fn into_u32(self) -> u32 {
        self.0
    }
}

/// A `Write` wrapper that feeds every byte through a CRC-32 hasher while
/// passing it through to the inner writer unchanged.
///
/// Used to compute the directory file's trailing checksum incrementally
/// while the header and index are being encoded, instead of buffering
/// the whole file and hashing it in a second pass.
pub struct ChecksummedWriter<W: std::io::Write> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: std::io::Write> ChecksummedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: writer,
            hasher: crc32fast::Hasher::new(),
        }
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::from_raw(self.hasher.clone().finalize())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: std::io::Write> std::io::Write for ChecksummedWriter<W> {
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn checksum_matches_direct_hash() {
        let mut buf = Vec::new();
        let mut writer = ChecksummedWriter::new(&mut buf);
        writer.write_all(b"blockfs").expect("write");

        let expected = crc32fast::hash(b"blockfs");
        assert_eq!(writer.checksum().into_u32(), expected);
    }
}
