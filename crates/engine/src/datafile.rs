//! Shared handle to the data file.
//!
//! All access is positional (`read_at`/`write_at` on Unix,
//! `seek_read`/`seek_write` on Windows), so the read path and the write
//! path share one handle without seek-state races. The file is created on
//! the first append — opening a database never creates files.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use codec::{serialize_header, HEADER_SIZE};

#[derive(Debug)]
pub(crate) struct DataFile {
    path: PathBuf,
    dimension: u32,
    file: RwLock<Option<Arc<File>>>,
    /// Physical file size. Appends are serialized by the write pipeline;
    /// readers only need a recent-enough value.
    len: AtomicU64,
}

impl DataFile {
    /// Opens an existing data file, or records that none exists yet.
    /// Read-only engines never call the append paths, so the only effect
    /// of `read_only` is the access mode of the handle.
    pub(crate) fn open(path: &Path, dimension: u32, read_only: bool) -> io::Result<Self> {
        let (file, len) = match OpenOptions::new().read(true).write(!read_only).open(path) {
            Ok(f) => {
                let len = f.metadata()?.len();
                (Some(Arc::new(f)), len)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => (None, 0),
            Err(e) => return Err(e),
        };
        Ok(Self {
            path: path.to_path_buf(),
            dimension,
            file: RwLock::new(file),
            len: AtomicU64::new(len),
        })
    }

    pub(crate) fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    /// Whether a file is actually on disk (and open) behind this handle.
    pub(crate) fn is_present(&self) -> bool {
        self.file.read().is_some()
    }

    /// Reads exactly `len` bytes at `offset`. `Ok(None)` when the file does
    /// not exist yet or holds fewer bytes than requested — the caller
    /// treats both as "record not there".
    pub(crate) fn read_exact_at(&self, offset: u64, len: usize) -> io::Result<Option<Vec<u8>>> {
        let file = match self.handle() {
            Some(file) => file,
            None => return Ok(None),
        };
        let mut buf = vec![0u8; len];
        let read = read_at(&file, &mut buf, offset)?;
        if read < len {
            return Ok(None);
        }
        Ok(Some(buf))
    }

    /// Reads up to `len` bytes at `offset`, returning whatever prefix is
    /// available. Used by recovery, which probes record headers near the
    /// end of the file.
    pub(crate) fn read_at_most(&self, offset: u64, len: usize) -> io::Result<Option<Vec<u8>>> {
        let file = match self.handle() {
            Some(file) => file,
            None => return Ok(None),
        };
        let mut buf = vec![0u8; len];
        let read = read_at(&file, &mut buf, offset)?;
        buf.truncate(read);
        Ok(Some(buf))
    }

    /// Appends one record with a single write call and one fsync. When the
    /// file is still empty, the 16-byte header goes out in the same write.
    /// Returns the record's offset.
    ///
    /// Callers are serialized by the write pipeline.
    pub(crate) fn append(&self, record: &[u8]) -> io::Result<u64> {
        let file = self.ensure_open()?;
        let len = self.len();
        if len == 0 {
            let mut buf = Vec::with_capacity(HEADER_SIZE + record.len());
            buf.extend_from_slice(&serialize_header(self.dimension));
            buf.extend_from_slice(record);
            write_all_at(&file, &buf, 0)?;
            file.sync_all()?;
            self.len.store(buf.len() as u64, Ordering::Release);
            Ok(HEADER_SIZE as u64)
        } else {
            write_all_at(&file, record, len)?;
            file.sync_all()?;
            self.len.store(len + record.len() as u64, Ordering::Release);
            Ok(len)
        }
    }

    /// Writes a contiguous run of records at an offset the batcher reserved
    /// earlier, prefixing the header when the file is still empty. One
    /// write call, one fsync.
    pub(crate) fn write_reserved(&self, first_offset: u64, payload: &[u8]) -> io::Result<()> {
        let file = self.ensure_open()?;
        if self.len() == 0 && first_offset == HEADER_SIZE as u64 {
            let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
            buf.extend_from_slice(&serialize_header(self.dimension));
            buf.extend_from_slice(payload);
            write_all_at(&file, &buf, 0)?;
        } else {
            write_all_at(&file, payload, first_offset)?;
        }
        file.sync_all()?;
        let end = first_offset + payload.len() as u64;
        self.len.fetch_max(end, Ordering::AcqRel);
        Ok(())
    }

    /// Drops the handle. Idempotent.
    pub(crate) fn close(&self) {
        *self.file.write() = None;
    }

    fn handle(&self) -> Option<Arc<File>> {
        self.file.read().as_ref().map(Arc::clone)
    }

    fn ensure_open(&self) -> io::Result<Arc<File>> {
        if let Some(file) = self.file.read().as_ref() {
            return Ok(Arc::clone(file));
        }
        let mut slot = self.file.write();
        if let Some(file) = slot.as_ref() {
            return Ok(Arc::clone(file));
        }
        let file = Arc::new(
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&self.path)?,
        );
        self.len.store(file.metadata()?.len(), Ordering::Release);
        *slot = Some(Arc::clone(&file));
        Ok(file)
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;

    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;

    let mut filled = 0;
    while filled < buf.len() {
        match file.seek_read(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;

    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        let written = file.seek_write(buf, offset)?;
        if written == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "failed to write whole buffer",
            ));
        }
        buf = &buf[written..];
        offset += written as u64;
    }
    Ok(())
}
