//! Write batcher: group commit for the batched pipeline.
//!
//! Per-record commit costs two fsyncs. The batcher amortizes them: writers
//! reserve their data file offset under the engine's write mutex, queue a
//! fully-serialized record, and block on a completion handle while a
//! dedicated flusher thread commits whole batches — one contiguous data
//! write + fsync, one WAL batch append + fsync (the commit point for every
//! write in the batch), then index updates in queue order.
//!
//! The flusher drains whatever is queued each time it wakes, so an
//! isolated write is flushed immediately while writes that arrive during
//! an in-flight flush coalesce into the next batch. `max_batch_size` and
//! `max_batch_bytes` cap a single batch; `max_batch_delay` bounds the
//! flusher's sleep between wake-up checks.
//!
//! A flush failure fails every write in that batch with the same error.
//! Data bytes already on disk become orphans: no WAL entry commits them,
//! and the next open ignores them.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::debug;

use codec::{hash_key, OpType, WalEntry, HEADER_SIZE};
use index::{KeyIndex, RecordLocation};
use wal::Wal;

use crate::datafile::DataFile;
use crate::error::{EngineError, Result};
use crate::BatchOptions;

/// One write waiting for the next group commit.
struct PendingWrite {
    bytes: Vec<u8>,
    entry: WalEntry,
    key: String,
    op: OpType,
    done: SyncSender<Result<()>>,
}

#[derive(Default)]
struct BatchState {
    queue: Vec<PendingWrite>,
    queued_bytes: usize,
    /// Projected data file size: physical size plus every reserved offset.
    projected_len: u64,
    flushing: bool,
    shutdown: bool,
}

struct Shared {
    options: BatchOptions,
    data: Arc<DataFile>,
    wal: Arc<Wal>,
    index: Arc<RwLock<KeyIndex>>,
    state: Mutex<BatchState>,
    /// Wakes the flusher when work arrives or shutdown is requested.
    wake: Condvar,
    /// Wakes `flush()` waiters when the queue drains.
    idle: Condvar,
}

pub(crate) struct Batcher {
    shared: Arc<Shared>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

/// Handle a queued writer blocks on until its batch commits.
pub(crate) struct Completion {
    rx: Receiver<Result<()>>,
}

impl Completion {
    /// Blocks until the committing WAL fsync for this write has returned
    /// (or the batch failed).
    pub(crate) fn wait(self) -> Result<()> {
        match self.rx.recv() {
            Ok(result) => result,
            // The flusher dropped the sender without answering: shutdown
            // raced the enqueue.
            Err(_) => Err(EngineError::Closed),
        }
    }
}

impl Batcher {
    pub(crate) fn new(
        options: BatchOptions,
        data: Arc<DataFile>,
        wal: Arc<Wal>,
        index: Arc<RwLock<KeyIndex>>,
    ) -> Batcher {
        let shared = Arc::new(Shared {
            options,
            state: Mutex::new(BatchState {
                projected_len: data.len(),
                ..BatchState::default()
            }),
            data,
            wal,
            index,
            wake: Condvar::new(),
            idle: Condvar::new(),
        });
        let flusher_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || flusher_loop(flusher_shared));
        Batcher {
            shared,
            flusher: Mutex::new(Some(handle)),
        }
    }

    /// Reserves the record's offset and queues it for the next group
    /// commit.
    ///
    /// Runs under the engine's write mutex, so queue order, sequence
    /// order, and offset order all agree. A projected size of zero starts
    /// at 16: the header is not on disk yet, but its bytes are reserved.
    pub(crate) fn enqueue(
        &self,
        key: String,
        op: OpType,
        sequence: i64,
        bytes: Vec<u8>,
    ) -> Result<Completion> {
        let (done, rx) = sync_channel(1);
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(EngineError::Closed);
        }
        if state.projected_len == 0 {
            state.projected_len = HEADER_SIZE as u64;
        }
        let offset = state.projected_len;
        state.projected_len += bytes.len() as u64;
        state.queued_bytes += bytes.len();

        let entry = WalEntry {
            op,
            sequence,
            offset,
            length: bytes.len() as u32,
            key_hash: hash_key(&key),
        };
        state.queue.push(PendingWrite {
            bytes,
            entry,
            key,
            op,
            done,
        });
        // A full batch wakes everything; a lone write nudges the flusher.
        if state.queue.len() >= self.shared.options.max_batch_size
            || state.queued_bytes >= self.shared.options.max_batch_bytes
        {
            self.shared.wake.notify_all();
        } else {
            self.shared.wake.notify_one();
        }
        Ok(Completion { rx })
    }

    /// Blocks until every queued write has been committed or failed.
    pub(crate) fn flush(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        while !state.queue.is_empty() || state.flushing {
            self.shared.idle.wait(&mut state);
        }
        Ok(())
    }

    /// Flushes the remaining queue once, then stops the flusher. Later
    /// enqueues fail `Closed`.
    pub(crate) fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.wake.notify_all();
        }
        if let Some(handle) = self.flusher.lock().take() {
            if handle.join().is_err() {
                return Err(EngineError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "batch flusher thread panicked",
                )));
            }
        }
        Ok(())
    }
}

fn flusher_loop(shared: Arc<Shared>) {
    loop {
        let batch = {
            let mut state = shared.state.lock();
            loop {
                if !state.queue.is_empty() {
                    break;
                }
                if state.shutdown {
                    shared.idle.notify_all();
                    return;
                }
                // Enqueue always signals; the timeout is a liveness
                // backstop, not the scheduling mechanism.
                shared
                    .wake
                    .wait_for(&mut state, shared.options.max_batch_delay);
            }
            state.flushing = true;
            drain_batch(&mut state, &shared.options)
        };

        let result = commit_batch(&shared, &batch);
        if let Err(err) = &result {
            debug!(error = %err, writes = batch.len(), "batch flush failed");
        }
        for pending in batch {
            let outcome = match &result {
                Ok(()) => Ok(()),
                Err(err) => Err(err.replicate()),
            };
            // The writer may have stopped waiting; the commit outcome
            // stands either way.
            let _ = pending.done.send(outcome);
        }

        let mut state = shared.state.lock();
        state.flushing = false;
        if state.queue.is_empty() {
            shared.idle.notify_all();
        }
    }
}

/// Takes the longest queue prefix within the batch caps, always at least
/// one write.
fn drain_batch(state: &mut BatchState, options: &BatchOptions) -> Vec<PendingWrite> {
    let mut count = 0;
    let mut bytes = 0;
    for pending in &state.queue {
        if count > 0
            && (count >= options.max_batch_size
                || bytes + pending.bytes.len() > options.max_batch_bytes)
        {
            break;
        }
        count += 1;
        bytes += pending.bytes.len();
    }
    state.queued_bytes -= bytes;
    state.queue.drain(..count).collect()
}

/// One contiguous data write + fsync, one WAL batch append + fsync (the
/// commit point), then index updates in queue order.
fn commit_batch(shared: &Shared, batch: &[PendingWrite]) -> Result<()> {
    let first_offset = batch[0].entry.offset;
    let total: usize = batch.iter().map(|p| p.bytes.len()).sum();
    let mut payload = Vec::with_capacity(total);
    for pending in batch {
        payload.extend_from_slice(&pending.bytes);
    }
    shared.data.write_reserved(first_offset, &payload)?;

    let entries: Vec<WalEntry> = batch.iter().map(|p| p.entry).collect();
    shared.wal.append_batch(&entries)?;

    let mut index = shared.index.write();
    for pending in batch {
        index.apply(
            pending.key.clone(),
            RecordLocation {
                offset: pending.entry.offset,
                length: pending.entry.length,
                sequence: pending.entry.sequence,
            },
            pending.op,
        );
    }
    debug!(writes = batch.len(), bytes = total, "batch committed");
    Ok(())
}
