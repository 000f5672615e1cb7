//! Unified error surface for engine operations.
//!
//! Read-side corruption is deliberately **not** here: a record that fails
//! validation is reported as absent (`Ok(None)`), never as an error — the
//! caller asks "is the data intact?" and gets a definite answer.

use std::io;

use thiserror::Error;

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Everything that can go wrong talking to a RaptorDB engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A written or queried vector does not match the database dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: u32, actual: usize },

    /// A mutation was attempted on a read-only engine.
    #[error("write attempted on a read-only engine")]
    ReadOnly,

    /// Another process holds the write lock and did not release it within
    /// the configured timeout.
    #[error("database is locked by another process (gave up after {waited_ms} ms)")]
    DatabaseLocked { waited_ms: u64 },

    /// The lock file cannot be created at all — permissions or a read-only
    /// filesystem, not contention.
    #[error("cannot create lock file at {path}: {reason}; open the database read-only or fix permissions")]
    LockPermission { path: String, reason: String },

    /// The data file header reports a version this build does not know.
    #[error("unsupported data file version {0}")]
    VersionUnsupported(u16),

    /// The data file header reports the legacy v1 layout.
    #[error("data file uses the legacy v1 layout; run the v1 to v2 migration first")]
    MigrationRequired,

    /// The data file itself is damaged in a way that prevents opening or
    /// migrating it (bad header, unparseable v1 records).
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// The engine has been closed.
    #[error("engine is closed")]
    Closed,

    /// A WAL-level failure, surfaced unchanged.
    #[error(transparent)]
    Wal(#[from] wal::WalError),

    /// An underlying filesystem call failed, surfaced unchanged.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Duplicates the error so a failed batch flush can hand the same
    /// failure to every write it contained. `io::Error` is not `Clone`;
    /// its kind and message are preserved.
    pub(crate) fn replicate(&self) -> EngineError {
        match self {
            EngineError::DimensionMismatch { expected, actual } => EngineError::DimensionMismatch {
                expected: *expected,
                actual: *actual,
            },
            EngineError::ReadOnly => EngineError::ReadOnly,
            EngineError::DatabaseLocked { waited_ms } => EngineError::DatabaseLocked {
                waited_ms: *waited_ms,
            },
            EngineError::LockPermission { path, reason } => EngineError::LockPermission {
                path: path.clone(),
                reason: reason.clone(),
            },
            EngineError::VersionUnsupported(version) => EngineError::VersionUnsupported(*version),
            EngineError::MigrationRequired => EngineError::MigrationRequired,
            EngineError::Corrupt(message) => EngineError::Corrupt(message.clone()),
            EngineError::Closed => EngineError::Closed,
            EngineError::Wal(wal::WalError::Io(e)) => {
                EngineError::Wal(wal::WalError::Io(io::Error::new(e.kind(), e.to_string())))
            }
            EngineError::Io(e) => EngineError::Io(io::Error::new(e.kind(), e.to_string())),
        }
    }
}
