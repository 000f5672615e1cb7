//! Cross-process writer exclusion.
//!
//! The lock is an atomic create-or-fail of a lock file next to the data
//! file. The file carries the holder's PID (ASCII + newline) for
//! diagnostics and is removed on release. Contention is handled by
//! retrying every 100 ms until the caller's timeout runs out.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::EngineError;

/// Interval between lock acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(unix)]
const EROFS: i32 = 30;

#[derive(Debug)]
pub(crate) struct FileLock {
    path: PathBuf,
    released: bool,
}

impl FileLock {
    /// Acquires the lock, retrying for up to `timeout` when another
    /// process holds it.
    ///
    /// Fails `DatabaseLocked` when the timeout elapses (a zero timeout
    /// fails on the first contended attempt) and `LockPermission` when the
    /// lock file cannot be created at all.
    pub(crate) fn acquire(path: &Path, timeout: Duration) -> Result<FileLock, EngineError> {
        let start = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())?;
                    file.sync_all()?;
                    debug!(path = %path.display(), "write lock acquired");
                    return Ok(FileLock {
                        path: path.to_path_buf(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        return Err(EngineError::DatabaseLocked {
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    thread::sleep(RETRY_INTERVAL.min(timeout - waited));
                }
                Err(e) if is_permission_error(&e) => {
                    return Err(EngineError::LockPermission {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(EngineError::Io(e)),
            }
        }
    }

    /// Removes the lock file. A no-op when already released; a lock file
    /// deleted out from under us is not an error either.
    pub(crate) fn release(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "write lock released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

fn is_permission_error(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    #[cfg(unix)]
    if e.raw_os_error() == Some(EROFS) {
        return true;
    }
    false
}
