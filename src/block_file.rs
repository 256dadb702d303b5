// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// Append-only spindle file.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// One of a Directory's `W` append-only data files.
///
/// Owned exclusively by one `WriterPool` worker: appends are only ever
/// issued by that worker, so no internal locking is needed around the
/// write path. Reads may happen concurrently from any thread that opens
/// its own handle via [`BlockFile::open_read`]: a read is only ever issued
/// against a byte range the Index has already advertised (i.e. fully
/// written and never moved).
pub struct BlockFile {
    path: PathBuf,
    file: File,
    len: u64,
}

impl BlockFile {
    /// Creates a new, empty block file at `path`. Fails if the path
    /// already exists.
    pub fn create(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok(Self { path, file, len: 0 })
    }

    /// Opens an existing block file for appending, truncating it to
    /// `committed_len` first: on reopen, the Directory truncates each
    /// BlockFile to the maximum `offset+nbytes` found in the persisted
    /// index entries that reference it, so a crash that left garbage bytes
    /// past the last committed append is invisible afterwards.
    pub fn open_for_append(path: impl Into<PathBuf>, committed_len: u64) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        file.set_len(committed_len)?;
        Ok(Self {
            path,
            file,
            len: committed_len,
        })
    }

    /// Opens an existing block file read-only, for a `Directory::open`
    /// (read-only mode never appends, so no truncation is performed here —
    /// the file is trusted to already be at its committed length since it
    /// is opened by a caller who is not also writing to it).
    pub fn open_read_only(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self { path, file, len })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `bytes` at the current end of file, returning the offset the
    /// bytes begin at and their length. Serialised by the caller owning
    /// this `BlockFile` (the writer-pool worker).
    pub fn append(&mut self, bytes: &[u8]) -> std::io::Result<(u64, u32)> {
        let offset = self.len;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        self.file.flush()?;

        #[allow(clippy::cast_possible_truncation)]
        let nbytes = bytes.len() as u32;
        self.len += u64::from(nbytes);

        Ok((offset, nbytes))
    }

    /// Reads exactly `nbytes` bytes starting at `offset`.
    pub fn read(&mut self, offset: u64, nbytes: u32) -> std::io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; nbytes as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("0.blk");

        let mut bf = BlockFile::create(&path).expect("create");
        let (off1, n1) = bf.append(b"hello").expect("append 1");
        let (off2, n2) = bf.append(b"world!!").expect("append 2");

        assert_eq!(off1, 0);
        assert_eq!(n1, 5);
        assert_eq!(off2, 5);
        assert_eq!(n2, 7);
        assert_eq!(bf.len(), 12);

        assert_eq!(bf.read(off1, n1).unwrap(), b"hello");
        assert_eq!(bf.read(off2, n2).unwrap(), b"world!!");
    }

    #[test]
    fn reopen_truncates_to_committed_length() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("0.blk");

        {
            let mut bf = BlockFile::create(&path).expect("create");
            bf.append(b"committed-bytes").expect("append");
            // Simulate a crashed append leaving garbage past commit point.
            use std::io::Write as _;
            let mut raw = OpenOptions::new().write(true).open(&path).unwrap();
            raw.seek(SeekFrom::End(0)).unwrap();
            raw.write_all(b"garbage-tail").unwrap();
        }

        let bf = BlockFile::open_for_append(&path, 15).expect("reopen");
        assert_eq!(bf.len(), 15);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            15,
            "file should be truncated on disk, not just in memory"
        );
    }
}
