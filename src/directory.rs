// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// Top-level object composing Volume + Index + WriterPool + BlockFiles.

use crate::block_file::BlockFile;
use crate::codec::{BlockShape, CodecRegistry};
use crate::coord::BlockCoord;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::fs::{resolve_on_open, rewrite_atomic};
use crate::header::{read_directory_file, write_directory_file, Header};
use crate::index::Index;
use crate::volume::Volume;
use crate::writer_pool::{LogEntry, WriterPool};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Builder for a fresh [`Directory`], giving each creation parameter a
/// sane default.
pub struct CreateOptions {
    extent: (u64, u64, u64),
    block_extent: (u32, u32, u32),
    dtype: DType,
    codec_name: String,
    codec_params: Vec<u8>,
    worker_count: u16,
    queue_capacity: Option<usize>,
    codecs: Arc<CodecRegistry>,
}

impl CreateOptions {
    #[must_use]
    pub fn new(extent: (u64, u64, u64), block_extent: (u32, u32, u32), dtype: DType) -> Self {
        Self {
            extent,
            block_extent,
            dtype,
            codec_name: "raw".to_owned(),
            codec_params: Vec::new(),
            worker_count: 4,
            queue_capacity: None,
            codecs: Arc::new(CodecRegistry::with_builtins()),
        }
    }

    #[must_use]
    pub fn codec(mut self, name: impl Into<String>, params: Vec<u8>) -> Self {
        self.codec_name = name.into();
        self.codec_params = params;
        self
    }

    /// Number of BlockFiles/worker threads, `W`. Defaults to 4. `create`
    /// rejects `0` with [`Error::InvalidWorkerCount`].
    #[must_use]
    pub fn worker_count(mut self, w: u16) -> Self {
        self.worker_count = w;
        self
    }

    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn codec_registry(mut self, registry: CodecRegistry) -> Self {
        self.codecs = Arc::new(registry);
        self
    }

    /// Writes a fresh directory file to `path`, creates `W` empty
    /// BlockFiles next to it (named `<path>.<i>`), and initialises an
    /// all-absent index. Does not start the writer pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if `path` already exists, or
    /// [`Error::InvalidWorkerCount`] if `worker_count` is `0`.
    pub fn create(self, path: impl Into<PathBuf>) -> Result<Directory> {
        let path = path.into();
        if self.worker_count == 0 {
            return Err(Error::InvalidWorkerCount);
        }
        if path.try_exists()? {
            return Err(Error::AlreadyExists(path));
        }

        let volume = Volume::new(
            self.extent,
            self.block_extent,
            self.dtype,
            self.codec_name,
            self.codec_params,
        )?;

        let mut paths = Vec::with_capacity(usize::from(self.worker_count));
        let mut block_files = Vec::with_capacity(usize::from(self.worker_count));
        for i in 0..self.worker_count {
            let file_path = block_file_path(&path, i);
            block_files.push(BlockFile::create(&file_path)?);
            paths.push(
                file_path
                    .to_str()
                    .ok_or_else(|| Error::FormatError("block-file path is not valid UTF-8".into()))?
                    .to_owned(),
            );
        }

        let index = Index::new_absent(volume.grid_extent());
        let header = Header {
            volume: volume.clone(),
            paths: paths.clone(),
        };
        let queue_capacity =
            self.queue_capacity.unwrap_or_else(|| WriterPool::default_queue_capacity(self.worker_count));

        let directory = Directory {
            path,
            header,
            codecs: self.codecs,
            index: Arc::new(RwLock::new(index)),
            block_files: Some(block_files),
            queue_capacity,
            pool: None,
            read_handles: open_read_handles(&paths)?,
        };
        directory.persist()?;
        log::info!(
            "created BlockFS directory {} ({}x{}x{} voxels, {}x{}x{} blocks, {} workers, codec {:?})",
            directory.path.display(),
            directory.header.volume.extent.0,
            directory.header.volume.extent.1,
            directory.header.volume.extent.2,
            directory.header.volume.block_extent.0,
            directory.header.volume.block_extent.1,
            directory.header.volume.block_extent.2,
            directory.header.worker_count(),
            directory.header.volume.codec_name,
        );
        Ok(directory)
    }
}

/// Opens an independent, read-only file handle per BlockFile path.
///
/// Kept separate from the append-mode handles a started `WriterPool`
/// worker owns: reads may run concurrently with appends to the same
/// BlockFile provided each read is wholly within already-committed bytes,
/// so a Directory always keeps its own read-side handles regardless of
/// whether writing is in progress.
fn open_read_handles(
    paths: &[String],
) -> Result<std::collections::HashMap<u16, std::sync::Mutex<BlockFile>>> {
    let mut handles = std::collections::HashMap::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let file_id = i as u16;
        handles.insert(file_id, std::sync::Mutex::new(BlockFile::open_read_only(path.as_str())?));
    }
    Ok(handles)
}

/// Opens one handle per BlockFile path, truncating each to the maximum
/// `offset+nbytes` the persisted index records for it. This is what
/// recovers a BlockFile left with a trailing partial or garbage append
/// after a crash, even though a `Directory::open` handle is otherwise
/// read-only.
fn open_and_truncate_to_index(
    paths: &[String],
    index: &Index,
) -> Result<std::collections::HashMap<u16, std::sync::Mutex<BlockFile>>> {
    #[allow(clippy::cast_possible_truncation)]
    let num_files = paths.len() as u16;
    let committed_lengths = index.committed_lengths(num_files);

    let mut handles = std::collections::HashMap::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let file_id = i as u16;
        let committed_len = committed_lengths[i];
        handles.insert(
            file_id,
            std::sync::Mutex::new(BlockFile::open_for_append(path.as_str(), committed_len)?),
        );
    }
    Ok(handles)
}

fn block_file_path(directory_path: &Path, worker_id: u16) -> PathBuf {
    let mut s = directory_path.as_os_str().to_owned();
    s.push(format!(".{worker_id}"));
    PathBuf::from(s)
}

/// A BlockFS volume backed by a directory file and its BlockFiles.
///
/// Lifecycle: *fresh* (just created, `pool` is `None`) -> *writing* (after
/// [`Directory::start_writer_processes`]) -> *closed*. A handle obtained
/// from [`Directory::open`] is *read-only* and never has a pool.
pub struct Directory {
    path: PathBuf,
    header: Header,
    codecs: Arc<CodecRegistry>,
    index: Arc<RwLock<Index>>,
    /// `Some` until the writer pool takes ownership at
    /// `start_writer_processes`; `None` afterwards, and also `None` for a
    /// read-only-opened directory (which never creates a pool).
    block_files: Option<Vec<BlockFile>>,
    queue_capacity: usize,
    pool: Option<WriterPool>,
    /// Read-side file handles, independent of any append-mode handles a
    /// started writer pool owns. Populated for every `Directory`, writing
    /// or read-only, so `read_block` never depends on pool state.
    read_handles: std::collections::HashMap<u16, std::sync::Mutex<BlockFile>>,
}

impl Directory {
    #[must_use]
    pub fn volume(&self) -> &Volume {
        &self.header.volume
    }

    /// Starts the writer pool; after this, `write_block` is accepted.
    ///
    /// # Panics
    ///
    /// Panics if called twice, if called on a read-only-opened directory,
    /// or after `close`.
    #[must_use]
    pub fn start_writer_processes(mut self) -> Self {
        let block_files = self
            .block_files
            .take()
            .expect("start_writer_processes called on a pool already started or a read-only directory");
        self.pool = Some(WriterPool::start(
            self.header.volume.clone(),
            Arc::clone(&self.codecs),
            block_files,
            Arc::clone(&self.index),
            self.queue_capacity,
        ));
        self
    }

    /// Submits `raw` for `(gx, gy, gz)`.
    ///
    /// Returns once the submission is accepted into its worker's queue,
    /// not once it commits. Blocks do not need to be the volume's nominal
    /// size on extent-edge coordinates: bytes are taken as-is if they
    /// already match the nominal shape, and short buffers representing a
    /// logically smaller edge block are zero-padded up to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotWritable`] if the writer pool was never started
    /// (a read-only-`open`ed directory never accepts writes),
    /// [`Error::OutOfRange`] if the coordinate lies outside the block grid,
    /// or [`Error::ShapeMismatch`] if `raw` is longer than the nominal
    /// block size.
    pub fn write_block(&self, raw: &[u8], gx: u32, gy: u32, gz: u32) -> Result<()> {
        let pool = self.pool.as_ref().ok_or(Error::NotWritable)?;

        let coord = BlockCoord::new(gx, gy, gz);
        let volume = &self.header.volume;
        let (nx, ny, nz) = volume.grid_extent();
        if coord.linear_index(nx, ny, nz).is_none() {
            return Err(Error::OutOfRange(coord));
        }

        let nominal = volume.nominal_block_bytes();
        if raw.len() > nominal {
            return Err(Error::ShapeMismatch {
                expected: nominal,
                got: raw.len(),
            });
        }

        let mut padded = raw.to_vec();
        padded.resize(nominal, 0);

        pool.submit(coord, padded);
        Ok(())
    }

    /// Forces a commit-channel drain and atomically rewrites the directory
    /// file. Returns any new error-log entries recorded since the previous
    /// `flush`/`close`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotWritable`] if the writer pool was never started,
    /// or [`Error::DirectoryPersistFailure`] if the directory file itself
    /// cannot be rewritten (the one fatal-at-process-level condition —
    /// every other background error is accumulated in the error log
    /// instead).
    pub fn flush(&self) -> Result<Vec<LogEntry>> {
        let pool = self.pool.as_ref().ok_or(Error::NotWritable)?;
        let entries = pool.flush();
        self.persist()?;
        log::debug!(
            "flushed {} ({} new error-log entries)",
            self.path.display(),
            entries.len()
        );
        Ok(entries)
    }

    /// Drains and joins the writer pool, then performs a final `flush`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotWritable`] if the writer pool was never started;
    /// see also [`Directory::flush`].
    pub fn close(mut self) -> Result<Vec<LogEntry>> {
        let pool = self.pool.take().ok_or(Error::NotWritable)?;
        let entries = pool.close();
        self.persist()?;
        log::info!(
            "closed {} ({} error-log entries)",
            self.path.display(),
            entries.len()
        );
        Ok(entries)
    }

    fn persist(&self) -> Result<()> {
        let mut buf = Vec::new();
        let index = self.index.read().expect("index lock poisoned");
        write_directory_file(&mut buf, &self.header, &index)?;
        rewrite_atomic(&self.path, &buf).map_err(Error::DirectoryPersistFailure)
    }

    /// Opens an existing directory file read-only: loads the header and
    /// index, but never starts a writer pool. `write_block` is unavailable
    /// on the returned handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `path` (and its `.tmp` sibling)
    /// does not exist, or [`Error::FormatError`] on a magic/version/CRC
    /// mismatch or truncated file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let resolved = resolve_on_open(&path).map_err(|_| Error::NotFound(path.clone()))?;
        let bytes = std::fs::read(&resolved).map_err(|_| Error::NotFound(path.clone()))?;

        let (header, index) =
            read_directory_file(&bytes).map_err(|e| Error::FormatError(e.to_string()))?;
        let read_handles = open_and_truncate_to_index(&header.paths, &index)?;

        log::info!(
            "opened {} read-only ({} workers, codec {:?})",
            path.display(),
            header.worker_count(),
            header.volume.codec_name,
        );

        Ok(Self {
            path,
            codecs: Arc::new(CodecRegistry::with_builtins()),
            index: Arc::new(RwLock::new(index)),
            block_files: None,
            queue_capacity: 0,
            pool: None,
            read_handles,
            header,
        })
    }

    /// Looks up `(gx, gy, gz)`, returning `None` if the coordinate has
    /// never been written (the "absent" sentinel), or the decoded block
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if the coordinate lies outside the
    /// block grid, [`Error::UnsupportedCodec`] if the header's codec name
    /// has no registered implementation, or [`Error::ReadFailure`] if a
    /// present block's bytes couldn't be read back or decoded.
    pub fn read_block(&self, gx: u32, gy: u32, gz: u32) -> Result<Option<Vec<u8>>> {
        let coord = BlockCoord::new(gx, gy, gz);
        let volume = &self.header.volume;
        let (nx, ny, nz) = volume.grid_extent();
        if coord.linear_index(nx, ny, nz).is_none() {
            return Err(Error::OutOfRange(coord));
        }

        let entry = {
            let index = self.index.read().expect("index lock poisoned");
            index.get(coord).expect("coordinate already validated in range")
        };
        if !entry.is_present() {
            return Ok(None);
        }

        let bytes = self
            .read_file(entry.file_id, entry.offset, entry.nbytes)
            .map_err(|e| Error::ReadFailure(e.to_string()))?;
        let shape = BlockShape {
            bz: volume.block_extent.2,
            by: volume.block_extent.1,
            bx: volume.block_extent.0,
            dtype: volume.dtype,
        };
        let codec = self.codecs.resolve(&volume.codec_name)?;
        let raw = codec
            .decode(&bytes, shape, &volume.codec_params)
            .map_err(|e| Error::ReadFailure(e.to_string()))?;
        Ok(Some(raw))
    }

    fn read_file(&self, file_id: u16, offset: u64, nbytes: u32) -> Result<Vec<u8>> {
        let mut file = self
            .read_handles
            .get(&file_id)
            .expect("entry references a file_id outside the path table")
            .lock()
            .expect("block file mutex poisoned");
        Ok(file.read(offset, nbytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn create_rejects_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.blockfs");
        std::fs::write(&path, b"existing").unwrap();

        let err = CreateOptions::new((8, 8, 8), (4, 4, 4), DType::U8)
            .create(&path)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn create_rejects_zero_worker_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.blockfs");

        let err = CreateOptions::new((8, 8, 8), (4, 4, 4), DType::U8)
            .worker_count(0)
            .create(&path)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidWorkerCount));
        assert!(!path.exists(), "no directory file should be written on failure");
    }

    #[test]
    fn write_read_roundtrip_after_close_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.blockfs");

        let directory = CreateOptions::new((8, 8, 8), (4, 4, 4), DType::U16)
            .worker_count(2)
            .create(&path)
            .unwrap()
            .start_writer_processes();

        let zeros = vec![0x00u8; 4 * 4 * 4 * 2];
        let ones = vec![0xFFu8; 4 * 4 * 4 * 2];
        directory.write_block(&zeros, 0, 0, 0).unwrap();
        directory.write_block(&ones, 1, 1, 1).unwrap();

        let log = directory.close().unwrap();
        assert!(log.is_empty());

        let reopened = Directory::open(&path).unwrap();
        assert_eq!(reopened.read_block(0, 0, 0).unwrap(), Some(zeros));
        assert_eq!(reopened.read_block(1, 1, 1).unwrap(), Some(ones));
        assert_eq!(reopened.read_block(1, 0, 0).unwrap(), None);
    }

    #[test]
    fn read_block_is_visible_before_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.blockfs");
        let directory = CreateOptions::new((4, 4, 4), (4, 4, 4), DType::U8)
            .worker_count(1)
            .create(&path)
            .unwrap()
            .start_writer_processes();

        let raw = vec![3u8; 64];
        directory.write_block(&raw, 0, 0, 0).unwrap();
        directory.flush().unwrap();

        assert_eq!(directory.read_block(0, 0, 0).unwrap(), Some(raw));
        directory.close().unwrap();
    }

    #[test]
    fn read_only_directory_rejects_writes_with_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.blockfs");

        let directory = CreateOptions::new((4, 4, 4), (4, 4, 4), DType::U8)
            .worker_count(1)
            .create(&path)
            .unwrap()
            .start_writer_processes();
        directory.write_block(&[1u8; 64], 0, 0, 0).unwrap();
        directory.close().unwrap();

        let reopened = Directory::open(&path).unwrap();
        let err = reopened.write_block(&[2u8; 64], 1, 0, 0).unwrap_err();
        assert!(matches!(err, Error::NotWritable));
        let err = reopened.flush().unwrap_err();
        assert!(matches!(err, Error::NotWritable));
    }

    #[test]
    fn out_of_range_coordinate_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.blockfs");
        let directory = CreateOptions::new((8, 8, 8), (4, 4, 4), DType::U8)
            .worker_count(1)
            .create(&path)
            .unwrap()
            .start_writer_processes();

        let err = directory.write_block(&[0u8; 64], 10, 0, 0).unwrap_err();
        assert!(matches!(err, Error::OutOfRange(_)));
    }

    #[test]
    fn edge_block_shorter_than_nominal_is_zero_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.blockfs");
        let directory = CreateOptions::new((5, 4, 4), (4, 4, 4), DType::U8)
            .worker_count(1)
            .create(&path)
            .unwrap()
            .start_writer_processes();

        // Grid extent is (2,1,1); the high-x block is logically 1 voxel
        // wide but the nominal shape is still 4*4*4.
        let short = vec![9u8; 1 * 4 * 4];
        directory.write_block(&short, 1, 0, 0).unwrap();
        directory.flush().unwrap();

        let read_back = directory.close().unwrap();
        assert!(read_back.is_empty());

        let reopened = Directory::open(&path).unwrap();
        let block = reopened.read_block(1, 0, 0).unwrap().unwrap();
        assert_eq!(block.len(), 4 * 4 * 4);
        assert_eq!(&block[..16], &short[..]);
        assert!(block[16..].iter().all(|&b| b == 0));
    }

    struct DecodeAlwaysFails;

    impl crate::codec::Codec for DecodeAlwaysFails {
        fn name(&self) -> &'static str {
            "raw"
        }

        fn encode(&self, raw: &[u8], _shape: BlockShape, _params: &[u8]) -> Result<Vec<u8>> {
            Ok(raw.to_vec())
        }

        fn decode(&self, _bytes: &[u8], _shape: BlockShape, _params: &[u8]) -> Result<Vec<u8>> {
            Err(Error::CodecFailure("simulated decode failure".into()))
        }
    }

    #[test]
    fn decode_failure_surfaces_as_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.blockfs");

        let mut registry = CodecRegistry::empty();
        registry.register(Box::new(DecodeAlwaysFails));

        let directory = CreateOptions::new((4, 4, 4), (4, 4, 4), DType::U8)
            .worker_count(1)
            .codec_registry(registry)
            .create(&path)
            .unwrap()
            .start_writer_processes();

        directory.write_block(&[1u8; 64], 0, 0, 0).unwrap();
        directory.flush().unwrap();

        let err = directory.read_block(0, 0, 0).unwrap_err();
        assert!(matches!(err, Error::ReadFailure(_)));
    }
}
