//! # WAL — Write-Ahead Log
//!
//! The durability backbone of RaptorDB. Every committed mutation is
//! recorded as one fixed 48-byte [`WalEntry`] pointing at the data record
//! it commits. An append returns only after `fsync` — that fsync **is**
//! the commit point: a write acknowledged to the caller has its entry on
//! stable storage.
//!
//! The WAL owns no logical state. The in-memory key index is derived from
//! it at open by replaying entries in file order.
//!
//! ## Recovery contract
//!
//! [`Wal::recover`] reads the whole file (entries are 48 bytes each, so
//! the file is bounded by the write count) and decodes consecutive slots
//! from offset 0. The scan **stops at the first invalid slot and never
//! resumes**: corruption at slot *k* means either a crash mid-fsync (only
//! the tail is affected and nothing after it committed) or file-level
//! damage (nothing after *k* can be trusted). Skipping ahead would
//! resurrect entries whose predecessors were lost.
//!
//! ## Example
//!
//! ```rust,no_run
//! use codec::{hash_key, OpType, WalEntry};
//! use wal::Wal;
//!
//! let wal = Wal::new("db.raptor-wal");
//! wal.append(&WalEntry {
//!     op: OpType::Insert,
//!     sequence: 1,
//!     offset: 16,
//!     length: 58,
//!     key_hash: hash_key("hello"),
//! })
//! .unwrap();
//!
//! let entries = wal.recover().unwrap();
//! assert_eq!(entries.len(), 1);
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use codec::{deserialize_wal_entry, serialize_wal_entry, WalEntry, WAL_ENTRY_SIZE};
use parking_lot::Mutex;
use thiserror::Error;

/// Errors that can occur during WAL operations.
///
/// Corruption is deliberately absent: an invalid slot terminates the
/// recovery scan rather than failing it — the entries before it are good.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only log of fixed-size commit entries.
///
/// The append handle is opened lazily on the first write so that opening a
/// database never creates files, and shared behind a mutex so the engine
/// and the batcher's flusher thread can both append (they never do so
/// concurrently — the write pipeline serializes them — but the type does
/// not rely on that).
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl Wal {
    /// Creates a handle for the WAL at `path`. No file is opened or
    /// created until the first append.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: Mutex::new(None),
        }
    }

    /// Path of the underlying log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry and fsyncs. Returns only after the entry is on
    /// stable storage — this is the commit point for the write it records.
    pub fn append(&self, entry: &WalEntry) -> Result<(), WalError> {
        let buf = serialize_wal_entry(entry);
        let mut slot = self.file.lock();
        let file = Self::open_for_append(&self.path, &mut slot)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        Ok(())
    }

    /// Appends a batch of entries with one write call and one fsync — the
    /// commit point for every write in the batch.
    pub fn append_batch(&self, entries: &[WalEntry]) -> Result<(), WalError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(entries.len() * WAL_ENTRY_SIZE);
        for entry in entries {
            buf.extend_from_slice(&serialize_wal_entry(entry));
        }
        let mut slot = self.file.lock();
        let file = Self::open_for_append(&self.path, &mut slot)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        Ok(())
    }

    /// Reads back every committed entry, in file order, stopping at the
    /// first invalid slot. A missing or empty file yields no entries.
    pub fn recover(&self) -> Result<Vec<WalEntry>, WalError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WalError::Io(e)),
        };
        let mut entries = Vec::with_capacity(data.len() / WAL_ENTRY_SIZE);
        for slot in data.chunks(WAL_ENTRY_SIZE) {
            match deserialize_wal_entry(slot) {
                Ok(entry) => entries.push(entry),
                // First invalid slot ends the committed prefix. A partial
                // trailing chunk lands here too (short buffer).
                Err(_) => break,
            }
        }
        Ok(entries)
    }

    /// Forces any open handle's data to stable storage.
    pub fn sync(&self) -> Result<(), WalError> {
        if let Some(file) = self.file.lock().as_ref() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Drops the append handle. Idempotent; a later append reopens.
    pub fn close(&self) {
        *self.file.lock() = None;
    }

    fn open_for_append<'a>(
        path: &Path,
        slot: &'a mut Option<File>,
    ) -> Result<&'a mut File, WalError> {
        if slot.is_none() {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            *slot = Some(file);
        }
        Ok(slot.as_mut().expect("append handle opened above"))
    }
}
