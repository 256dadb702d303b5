// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// Bounded set of worker agents, each owning exactly one BlockFile. Workers
// communicate with producers via per-worker bounded submission queues and
// with the index-update agent via a single-consumer commit channel — the
// only two rendezvous points in the design.

use crate::block_file::BlockFile;
use crate::codec::{BlockShape, CodecRegistry};
use crate::coord::{route, BlockCoord};
use crate::index::{Entry, Index};
use crate::volume::Volume;
use std::collections::HashSet;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;

/// A non-fatal event recorded in the background error log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A second submission for an already-committed coordinate was dropped.
    DuplicateWrite(BlockCoord),
    /// Encoding or appending a submission failed; the coordinate was never
    /// committed and its bytes were never advertised by the index.
    WriteFailure(BlockCoord, String),
}

enum Submission {
    Write { coord: BlockCoord, raw: Vec<u8> },
    Flush(Arc<FlushBarrier>),
}

enum CommitMsg {
    Commit(BlockCoord, Entry),
    FlushArrived(Arc<FlushBarrier>),
}

/// A single-use rendezvous: `flush` creates one with `remaining = W`, hands
/// a clone to every worker, and blocks on `wait` until every worker's
/// commit-channel messages sent *before* the flush token have all been
/// applied to the index by the agent thread.
struct FlushBarrier {
    remaining: Mutex<usize>,
    cv: Condvar,
}

impl FlushBarrier {
    fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            cv: Condvar::new(),
        }
    }

    fn arrive(&self) {
        let mut remaining = self.remaining.lock().expect("flush barrier mutex poisoned");
        *remaining -= 1;
        if *remaining == 0 {
            self.cv.notify_all();
        }
    }

    fn wait(&self) {
        let mut remaining = self.remaining.lock().expect("flush barrier mutex poisoned");
        while *remaining > 0 {
            remaining = self.cv.wait(remaining).expect("flush barrier mutex poisoned");
        }
    }
}

/// Shared, append-only record of non-fatal background errors.
///
/// `drain_new` returns only entries appended since the previous call, so
/// batch producers can detect partial failures at `flush`/`close`
/// boundaries without re-reporting the same entry twice.
#[derive(Default)]
struct ErrorLog {
    entries: Mutex<Vec<LogEntry>>,
    drained_up_to: Mutex<usize>,
}

impl ErrorLog {
    fn push(&self, entry: LogEntry) {
        self.entries.lock().expect("error log mutex poisoned").push(entry);
    }

    fn drain_new(&self) -> Vec<LogEntry> {
        let entries = self.entries.lock().expect("error log mutex poisoned");
        let mut cursor = self.drained_up_to.lock().expect("error log cursor poisoned");
        let fresh = entries[*cursor..].to_vec();
        *cursor = entries.len();
        fresh
    }
}

/// Bounded set of worker agents writing to `W` BlockFiles.
pub struct WriterPool {
    senders: Vec<SyncSender<Submission>>,
    workers: Vec<JoinHandle<()>>,
    agent: Option<JoinHandle<()>>,
    error_log: Arc<ErrorLog>,
}

impl WriterPool {
    /// Default per-worker submission queue capacity, `4*W`.
    #[must_use]
    pub fn default_queue_capacity(worker_count: u16) -> usize {
        4 * usize::from(worker_count)
    }

    /// Starts one thread per `block_files` entry plus one index-update
    /// agent thread. `index` is shared with the owning `Directory` so
    /// `read_block` observes committed writes without going through the
    /// pool.
    #[must_use]
    pub fn start(
        volume: Volume,
        codecs: Arc<CodecRegistry>,
        block_files: Vec<BlockFile>,
        index: Arc<RwLock<Index>>,
        queue_capacity: usize,
    ) -> Self {
        let worker_count = block_files.len();
        let error_log = Arc::new(ErrorLog::default());
        let (commit_tx, commit_rx): (std::sync::mpsc::Sender<CommitMsg>, Receiver<CommitMsg>) =
            std::sync::mpsc::channel();

        let mut senders = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);

        let volume = Arc::new(volume);
        let shape = BlockShape {
            bz: volume.block_extent.2,
            by: volume.block_extent.1,
            bx: volume.block_extent.0,
            dtype: volume.dtype,
        };

        for (worker_id, block_file) in block_files.into_iter().enumerate() {
            let (tx, rx) = sync_channel::<Submission>(queue_capacity.max(1));
            senders.push(tx);

            #[allow(clippy::cast_possible_truncation)]
            let worker_id = worker_id as u16;
            let volume = Arc::clone(&volume);
            let codecs = Arc::clone(&codecs);
            let commit_tx = commit_tx.clone();
            let error_log = Arc::clone(&error_log);

            workers.push(std::thread::spawn(move || {
                run_worker(worker_id, rx, block_file, &volume, &codecs, shape, &commit_tx, &error_log);
            }));
        }

        // The agent's only handle to the channel's write side is the one
        // cloned per worker above; dropping this original lets the channel
        // close itself once every worker thread exits.
        drop(commit_tx);

        let agent = std::thread::spawn(move || {
            run_index_agent(commit_rx, &index);
        });

        log::debug!("started writer pool with {worker_count} workers");

        Self {
            senders,
            workers,
            agent: Some(agent),
            error_log,
        }
    }

    /// Routes `(coord, raw)` to its owning worker's queue, blocking if that
    /// queue is full so producers are throttled to a worker's real
    /// encode/append throughput.
    ///
    /// # Panics
    ///
    /// Panics if the pool has already been closed; `Directory` is
    /// responsible for rejecting writes once closed so this should never
    /// be reachable in practice.
    pub fn submit(&self, coord: BlockCoord, raw: Vec<u8>) {
        let worker_id = route(coord, self.worker_count());
        self.senders[usize::from(worker_id)]
            .send(Submission::Write { coord, raw })
            .expect("writer pool worker unexpectedly gone");
    }

    #[must_use]
    pub fn worker_count(&self) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let w = self.senders.len() as u16;
        w
    }

    /// Blocks until every submission accepted before this call has either
    /// committed or failed, then returns any new background error-log
    /// entries recorded since the previous `flush`/`close`.
    pub fn flush(&self) -> Vec<LogEntry> {
        let barrier = Arc::new(FlushBarrier::new(self.senders.len()));
        for sender in &self.senders {
            // A worker that already exited (should not happen before
            // close) would make this send fail; panicking matches
            // `submit`'s contract that the pool outlives its own flush.
            sender
                .send(Submission::Flush(Arc::clone(&barrier)))
                .expect("writer pool worker unexpectedly gone");
        }
        barrier.wait();
        self.error_log.drain_new()
    }

    /// Drains all workers, joins every thread, and stops the index-update
    /// agent. Returns any error-log entries recorded since the previous
    /// `flush`/`close`.
    pub fn close(mut self) -> Vec<LogEntry> {
        let tail = self.flush();

        // Dropping the senders closes each worker's submission channel;
        // each worker's `recv` loop ends once its queue is empty.
        self.senders.clear();
        for worker in self.workers.drain(..) {
            worker.join().expect("writer pool worker panicked");
        }
        if let Some(agent) = self.agent.take() {
            agent.join().expect("index-update agent panicked");
        }

        let mut entries = tail;
        entries.extend(self.error_log.drain_new());
        log::debug!("writer pool drained and joined, {} total error-log entries", entries.len());
        entries
    }
}

fn run_worker(
    worker_id: u16,
    rx: Receiver<Submission>,
    mut block_file: BlockFile,
    volume: &Volume,
    codecs: &CodecRegistry,
    shape: BlockShape,
    commit_tx: &std::sync::mpsc::Sender<CommitMsg>,
    error_log: &ErrorLog,
) {
    log::trace!("worker {worker_id}: started, owns {}", block_file.path().display());
    let mut present: HashSet<BlockCoord> = HashSet::new();

    for submission in rx {
        match submission {
            Submission::Flush(barrier) => {
                let _ = commit_tx.send(CommitMsg::FlushArrived(barrier));
            }
            Submission::Write { coord, raw } => {
                if present.contains(&coord) {
                    log::warn!("worker {worker_id}: duplicate write for {coord:?}, dropping");
                    error_log.push(LogEntry::DuplicateWrite(coord));
                    continue;
                }

                let encoded = match codecs
                    .resolve(&volume.codec_name)
                    .and_then(|codec| codec.encode(&raw, shape, &volume.codec_params))
                {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        log::error!("worker {worker_id}: encode failed for {coord:?}: {e}");
                        error_log.push(LogEntry::WriteFailure(coord, e.to_string()));
                        continue;
                    }
                };

                match block_file.append(&encoded) {
                    Ok((offset, nbytes)) => {
                        present.insert(coord);
                        let entry = Entry {
                            file_id: worker_id,
                            offset,
                            nbytes,
                        };
                        log::trace!("worker {worker_id}: committed {coord:?} at offset {offset}, {nbytes} bytes");
                        let _ = commit_tx.send(CommitMsg::Commit(coord, entry));
                    }
                    Err(e) => {
                        log::error!("worker {worker_id}: append failed for {coord:?}: {e}");
                        error_log.push(LogEntry::WriteFailure(coord, e.to_string()));
                    }
                }
            }
        }
    }
    log::trace!("worker {worker_id}: submission channel closed, exiting");
}

fn run_index_agent(rx: Receiver<CommitMsg>, index: &Arc<RwLock<Index>>) {
    for msg in rx {
        match msg {
            CommitMsg::Commit(coord, entry) => {
                index.write().expect("index lock poisoned").put(coord, entry);
            }
            CommitMsg::FlushArrived(barrier) => barrier.arrive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use test_log::test;

    fn sample_volume() -> Volume {
        Volume::new((8, 8, 8), (4, 4, 4), DType::U8, "raw", vec![]).unwrap()
    }

    fn block_files(dir: &std::path::Path, count: u16) -> Vec<BlockFile> {
        (0..count)
            .map(|i| BlockFile::create(dir.join(format!("vol.{i}"))).unwrap())
            .collect()
    }

    #[test]
    fn single_write_commits_and_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let volume = sample_volume();
        let index = Arc::new(RwLock::new(Index::new_absent(volume.grid_extent())));
        let pool = WriterPool::start(
            volume.clone(),
            Arc::new(CodecRegistry::with_builtins()),
            block_files(dir.path(), 2),
            Arc::clone(&index),
            8,
        );

        let coord = BlockCoord::new(0, 0, 0);
        let raw = vec![7u8; volume.nominal_block_bytes()];
        pool.submit(coord, raw);
        let log = pool.flush();
        assert!(log.is_empty());

        let entry = index.read().unwrap().get(coord).unwrap();
        assert!(entry.is_present());
    }

    #[test]
    fn duplicate_submission_is_logged_and_first_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let volume = sample_volume();
        let index = Arc::new(RwLock::new(Index::new_absent(volume.grid_extent())));
        let pool = WriterPool::start(
            volume.clone(),
            Arc::new(CodecRegistry::with_builtins()),
            block_files(dir.path(), 2),
            Arc::clone(&index),
            8,
        );

        let coord = BlockCoord::new(1, 1, 1);
        let first = vec![1u8; volume.nominal_block_bytes()];
        let second = vec![2u8; volume.nominal_block_bytes()];
        pool.submit(coord, first.clone());
        pool.submit(coord, second);
        let log = pool.flush();

        assert_eq!(log, vec![LogEntry::DuplicateWrite(coord)]);

        let entry = index.read().unwrap().get(coord).unwrap();
        assert!(entry.is_present());
        assert_eq!(entry.nbytes as usize, first.len());
    }

    #[test]
    fn close_drains_all_workers() {
        let dir = tempfile::tempdir().unwrap();
        let volume = sample_volume();
        let index = Arc::new(RwLock::new(Index::new_absent(volume.grid_extent())));
        let pool = WriterPool::start(
            volume.clone(),
            Arc::new(CodecRegistry::with_builtins()),
            block_files(dir.path(), 2),
            Arc::clone(&index),
            8,
        );

        for gx in 0..2u32 {
            pool.submit(BlockCoord::new(gx, 0, 0), vec![9u8; volume.nominal_block_bytes()]);
        }
        let log = pool.close();
        assert!(log.is_empty());

        for gx in 0..2u32 {
            assert!(index.read().unwrap().get(BlockCoord::new(gx, 0, 0)).unwrap().is_present());
        }
    }
}
