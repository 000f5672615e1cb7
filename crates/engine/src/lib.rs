//! # Engine - RaptorDB Storage Engine
//!
//! The central orchestrator that ties together the [`codec`], [`wal`],
//! [`index`], and [`topset`] crates into a durable embedded store for
//! fixed-dimension float32 vectors.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌────────────────────────────────────────────────────┐
//! │                     ENGINE                         │
//! │                                                    │
//! │ write.rs → write lock (lazy, once)                 │
//! │              |                                     │
//! │              v   FIFO write mutex                  │
//! │   direct:  data append + fsync                     │
//! │            WAL append + fsync   ← commit point     │
//! │            index update                            │
//! │   batched: reserve offset → queue → flusher thread │
//! │            (one data write + one WAL batch,        │
//! │             two fsyncs per batch)                  │
//! │                                                    │
//! │ read.rs  → index lookup → positional read → decode │
//! │ search.rs→ locations() walk → TopSet               │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                          |
//! |----------------|--------------------------------------------------|
//! | [`lib.rs`]     | `Engine` struct, options, open, close, accessors |
//! | [`write`]      | `write_record()`, `delete_record()`, lazy lock   |
//! | [`read`]       | `read_record()`, `read_embedding_at()`, index views |
//! | [`batcher`]    | group commit pipeline                            |
//! | [`recovery`]   | WAL replay into the key index                    |
//! | [`lock`]       | cross-process lock file                          |
//! | [`migrate`]    | v1 → v2 forward migration                        |
//! | [`search`]     | reference brute-force search driver              |
//!
//! ## Crash Safety
//!
//! A write is acknowledged only after the WAL fsync that commits it. The
//! data record always reaches disk before its WAL entry, so every
//! committed entry points at a fully-written record; the converse does not
//! hold — data bytes without a WAL entry are orphans and are ignored at
//! the next open. Recovery replays the WAL in file order and stops at the
//! first invalid entry.
//!
//! ## File set
//!
//! For a logical base path `B` (a supplied `.raptor` suffix is stripped):
//! `B.raptor` (header + records), `B.raptor-wal` (commit log),
//! `B.raptor.lock` (writer PID; exists only while a writer holds it).

mod batcher;
mod datafile;
mod error;
mod lock;
mod migrate;
mod read;
mod recovery;
mod search;
mod write;

pub use codec::{DataRecord, FileHeader, OpType};
pub use error::{EngineError, Result};
pub use index::RecordLocation;
pub use migrate::{detect_version, ensure_v2, migrate_v1_to_v2, BACKUP_SUFFIX};
pub use search::cosine_similarity;
pub use topset::{ScoredKey, TopSet};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{FairMutex, Mutex, RwLock};

use index::KeyIndex;
use wal::Wal;

use crate::batcher::Batcher;
use crate::datafile::DataFile;
use crate::lock::FileLock;

/// Extension of the data file.
pub const DATA_SUFFIX: &str = ".raptor";
/// Extension of the write-ahead log.
pub const WAL_SUFFIX: &str = ".raptor-wal";
/// Extension of the lock file.
pub const LOCK_SUFFIX: &str = ".raptor.lock";

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: u32 = 384;
/// Default write-lock acquisition timeout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Tuning knobs for the group-commit batcher.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Queued records that cap a single batch and trigger an immediate
    /// flush.
    pub max_batch_size: usize,
    /// Queued record bytes that cap a single batch and trigger an
    /// immediate flush.
    pub max_batch_bytes: usize,
    /// Upper bound on the flusher's sleep between wake-up checks.
    pub max_batch_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_batch_bytes: 1024 * 1024,
            max_batch_delay: Duration::from_millis(10),
        }
    }
}

/// Configuration for [`Engine::open`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Logical base path of the database. The `.raptor` family of
    /// extensions is appended; a supplied `.raptor` suffix is stripped
    /// first.
    pub data_path: PathBuf,
    /// Embedding dimension for a fresh database. An existing data file's
    /// header overrides this — the dimension belongs to the data.
    pub dimension: u32,
    /// How long a first write waits for the cross-process lock.
    pub lock_timeout: Duration,
    /// Route writes through the group-commit batcher.
    pub batching: bool,
    pub batch_options: BatchOptions,
    /// Open without write access; no lock is ever taken.
    pub read_only: bool,
}

impl EngineOptions {
    pub fn new<P: AsRef<Path>>(data_path: P) -> Self {
        Self {
            data_path: data_path.as_ref().to_path_buf(),
            dimension: DEFAULT_DIMENSION,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            batching: true,
            batch_options: BatchOptions::default(),
            read_only: false,
        }
    }
}

/// How writes reach disk. Fixed at open so write sites never check a
/// runtime toggle.
enum Pipeline {
    /// Two fsyncs per record, inside the write call.
    Direct,
    /// Group commit through the background flusher.
    Batched(Batcher),
}

/// A durable embedded vector store.
///
/// All methods take `&self`; the engine is meant to be shared
/// (`Arc<Engine>`) across threads. Writers serialize on an internal FIFO
/// mutex, readers go straight to the index and the data file.
pub struct Engine {
    data_path: PathBuf,
    wal_path: PathBuf,
    lock_path: PathBuf,
    dimension: u32,
    read_only: bool,
    lock_timeout: Duration,
    data: Arc<DataFile>,
    wal: Arc<Wal>,
    index: Arc<RwLock<KeyIndex>>,
    /// Next sequence number to assign; recovery sets it to max + 1.
    next_sequence: AtomicI64,
    /// FIFO serialization of writers: commit order = acquisition order.
    write_mutex: FairMutex<()>,
    /// The cross-process lock, acquired lazily by the first mutation.
    write_lock: Mutex<Option<FileLock>>,
    pipeline: Pipeline,
    closed: AtomicBool,
}

impl Engine {
    /// Opens (or lazily creates) the database rooted at
    /// `options.data_path`.
    ///
    /// Builds the key index by replaying the WAL. Does **not** create any
    /// file and does **not** take the write lock — read-only openers can
    /// coexist, and a pure reader never blocks a future writer.
    ///
    /// # Errors
    ///
    /// * read-only mode with neither data file nor WAL present
    /// * `MigrationRequired` when the data file header reports v1
    /// * `VersionUnsupported` for any other unknown version
    /// * `Corrupt` when the header is present but unreadable
    pub fn open(options: EngineOptions) -> Result<Engine> {
        let base = base_path(&options.data_path);
        let data_path = suffixed(&base, DATA_SUFFIX);
        let wal_path = suffixed(&base, WAL_SUFFIX);
        let lock_path = suffixed(&base, LOCK_SUFFIX);

        if options.read_only && !data_path.exists() && !wal_path.exists() {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no database at {}", base.display()),
            )));
        }
        if !options.read_only {
            if let Some(parent) = data_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        // An existing header decides both the version and the dimension.
        let mut dimension = options.dimension;
        if let Some(header) = read_header(&data_path)? {
            match header.version {
                codec::FORMAT_V2 => dimension = header.dimension,
                codec::FORMAT_V1 => return Err(EngineError::MigrationRequired),
                other => return Err(EngineError::VersionUnsupported(other)),
            }
        }

        let data = Arc::new(DataFile::open(&data_path, dimension, options.read_only)?);
        let wal = Arc::new(Wal::new(&wal_path));
        let (key_index, max_sequence) = recovery::build_from_wal(&wal, &data)?;
        let index = Arc::new(RwLock::new(key_index));

        let pipeline = if options.batching && !options.read_only {
            Pipeline::Batched(Batcher::new(
                options.batch_options.clone(),
                Arc::clone(&data),
                Arc::clone(&wal),
                Arc::clone(&index),
            ))
        } else {
            Pipeline::Direct
        };

        Ok(Engine {
            data_path,
            wal_path,
            lock_path,
            dimension,
            read_only: options.read_only,
            lock_timeout: options.lock_timeout,
            data,
            wal,
            index,
            next_sequence: AtomicI64::new(max_sequence + 1),
            write_mutex: FairMutex::new(()),
            write_lock: Mutex::new(None),
            pipeline,
            closed: AtomicBool::new(false),
        })
    }

    /// The database's embedding dimension.
    #[must_use]
    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether this engine currently holds the cross-process write lock.
    #[must_use]
    pub fn has_write_lock(&self) -> bool {
        self.write_lock.lock().is_some()
    }

    /// The sequence number the next write will receive.
    #[must_use]
    pub fn next_sequence(&self) -> i64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    #[must_use]
    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Blocks until the batcher's queue is drained. A no-op on the direct
    /// pipeline.
    pub fn flush(&self) -> Result<()> {
        match &self.pipeline {
            Pipeline::Direct => Ok(()),
            Pipeline::Batched(batcher) => batcher.flush(),
        }
    }

    /// Flushes pending writes, closes the file handles, and releases the
    /// write lock if held. Idempotent: the second call is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Pipeline::Batched(batcher) = &self.pipeline {
            batcher.shutdown()?;
        }
        self.wal.close();
        self.data.close();
        if let Some(mut lock) = self.write_lock.lock().take() {
            lock.release()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("data_path", &self.data_path)
            .field("dimension", &self.dimension)
            .field("read_only", &self.read_only)
            .field("batching", &matches!(self.pipeline, Pipeline::Batched(_)))
            .field("entries", &self.count())
            .field("next_sequence", &self.next_sequence())
            .field("has_write_lock", &self.has_write_lock())
            .finish()
    }
}

/// Best-effort close on drop.
///
/// Errors are ignored because Drop cannot propagate them — every
/// acknowledged write is already durable in the WAL, so nothing is lost
/// beyond an unflushed batch whose writers are still waiting (they
/// receive the failure through their completion handles).
impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Strips a trailing `.raptor` from a caller-supplied path, yielding the
/// logical base both forms resolve to.
pub(crate) fn base_path(path: &Path) -> PathBuf {
    let text = path.as_os_str().to_string_lossy();
    match text.strip_suffix(DATA_SUFFIX) {
        Some(stripped) => PathBuf::from(stripped),
        None => path.to_path_buf(),
    }
}

pub(crate) fn suffixed(base: &Path, suffix: &str) -> PathBuf {
    let mut os = base.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Reads the data file header, if a data file exists.
///
/// A zero-length file counts as "no header yet" (the header is written
/// together with the first record); a partial or bad-magic header is
/// reported as corruption.
fn read_header(path: &Path) -> Result<Option<codec::FileHeader>> {
    use std::io::Read;

    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(EngineError::Io(e)),
    };
    let mut buf = [0u8; codec::HEADER_SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(EngineError::Io(e)),
        }
    }
    if filled == 0 {
        return Ok(None);
    }
    if filled < buf.len() {
        return Err(EngineError::Corrupt(
            "truncated data file header".to_string(),
        ));
    }
    codec::deserialize_header(&buf)
        .map(Some)
        .map_err(|_| EngineError::Corrupt("bad data file magic".to_string()))
}

#[cfg(test)]
mod tests;
