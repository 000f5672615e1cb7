//! Write path: `write_record()`, `delete_record()`, lazy lock
//! acquisition, and the direct per-write commit.
//!
//! Every mutation runs under the FIFO write mutex, so the sequence number
//! a write receives, the data file offset it occupies, and its position in
//! the WAL all agree with the order the mutex was acquired in. A call
//! returns only after the WAL fsync that commits it.

use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use codec::{hash_key, serialize_record, DataRecord, OpType, WalEntry};
use index::RecordLocation;

use crate::error::{EngineError, Result};
use crate::lock::FileLock;
use crate::{Engine, Pipeline};

impl Engine {
    /// Writes `embedding` under `key`.
    ///
    /// Fails `ReadOnly` on a read-only engine and `DimensionMismatch` when
    /// the vector length is not the database dimension. The first mutation
    /// on an engine acquires the cross-process write lock, which is then
    /// held until `close()`.
    pub fn write_record(&self, key: &str, embedding: &[f32], op: OpType) -> Result<()> {
        self.check_writable()?;
        if embedding.len() != self.dimension as usize {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        self.ensure_lock_acquired()?;
        self.commit(key, embedding, op)
    }

    /// Deletes `key`, returning whether it existed.
    ///
    /// The tombstone goes through the normal write path carrying a zero
    /// vector of the database dimension, so recovery and the read path
    /// validate it like any other record.
    pub fn delete_record(&self, key: &str) -> Result<bool> {
        self.check_writable()?;
        if !self.has_key(key) {
            return Ok(false);
        }
        self.ensure_lock_acquired()?;
        let zeros = vec![0f32; self.dimension as usize];
        self.commit(key, &zeros, OpType::Delete)?;
        Ok(true)
    }

    fn check_writable(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        if self.read_only {
            return Err(EngineError::ReadOnly);
        }
        Ok(())
    }

    /// Commits one record through the configured pipeline.
    fn commit(&self, key: &str, embedding: &[f32], op: OpType) -> Result<()> {
        let completion = {
            let _ordering = self.write_mutex.lock();

            let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
            let record = DataRecord {
                op,
                sequence,
                timestamp: unix_millis(),
                key: key.to_string(),
                embedding: embedding.to_vec(),
            };
            let bytes = serialize_record(&record);

            match &self.pipeline {
                Pipeline::Direct => {
                    let offset = self.data.append(&bytes)?;
                    let entry = WalEntry {
                        op,
                        sequence,
                        offset,
                        length: bytes.len() as u32,
                        key_hash: hash_key(key),
                    };
                    // Commit point: the write is durable once this returns.
                    self.wal.append(&entry)?;
                    self.index.write().apply(
                        record.key,
                        RecordLocation {
                            offset,
                            length: entry.length,
                            sequence,
                        },
                        op,
                    );
                    return Ok(());
                }
                Pipeline::Batched(batcher) => batcher.enqueue(record.key, op, sequence, bytes)?,
            }
        };
        // The write mutex is released while we wait; the batch that
        // carries this write commits it in queue order.
        completion.wait()
    }

    /// Acquires the cross-process write lock on the first mutating
    /// operation. Concurrent first writes serialize on the slot mutex, so
    /// acquisition happens exactly once; on failure the slot stays empty
    /// and the next write retries.
    fn ensure_lock_acquired(&self) -> Result<()> {
        let mut slot = self.write_lock.lock();
        if slot.is_some() {
            return Ok(());
        }
        *slot = Some(FileLock::acquire(&self.lock_path, self.lock_timeout)?);
        Ok(())
    }
}

pub(crate) fn unix_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        // Clock before the epoch; record zero rather than failing a write.
        Err(_) => 0,
    }
}
