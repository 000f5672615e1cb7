//! Forward migration from the legacy v1 data file layout.
//!
//! v1 databases are a bare append log with no WAL, no checksums, and no
//! sequence numbers; duplicate keys resolve last-write-wins:
//!
//! ```text
//! header (16 B, version=1) | records...
//! record: key_len (u16 LE) | key | D×f32 | record_len (u32 LE)
//! ```
//!
//! The trailing `record_len` holds the body length (`2 + key_len + 4·D`,
//! excluding the footer itself). Migration copies the old file aside as a
//! backup, folds the records down to the last version of each key in
//! first-insertion order, deletes the stale file set, and replays the
//! survivors through a fresh v2 engine so every entry picks up a sequence
//! number, timestamp, checksum, and WAL commit.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use tracing::{info, warn};

use codec::{FileHeader, OpType, FORMAT_V1, FORMAT_V2, HEADER_SIZE};

use crate::error::{EngineError, Result};
use crate::{base_path, suffixed, Engine, EngineOptions, DATA_SUFFIX, LOCK_SUFFIX, WAL_SUFFIX};

/// Suffix appended to the data file path for the pre-migration backup.
pub const BACKUP_SUFFIX: &str = ".v1.backup";

/// Reads the version field of the data file header at `path`.
///
/// Returns `None` when the file is missing, shorter than a header, or
/// does not carry the expected magic.
pub fn detect_version<P: AsRef<Path>>(path: P) -> Result<Option<u16>> {
    Ok(peek_header(path.as_ref())?.map(|header| header.version))
}

/// Ensures the database rooted at `path` uses the v2 layout.
///
/// No file or an already-v2 file is a no-op; a v1 file is migrated in
/// place; anything else fails `VersionUnsupported`. `dimension` is the
/// opener's configured dimension — the v1 header's own dimension governs
/// the migration, and a disagreement is only worth a warning.
pub fn ensure_v2<P: AsRef<Path>>(path: P, dimension: u32) -> Result<()> {
    let data_path = suffixed(&base_path(path.as_ref()), DATA_SUFFIX);
    match peek_header(&data_path)? {
        None => Ok(()),
        Some(header) if header.version == FORMAT_V2 => Ok(()),
        Some(header) if header.version == FORMAT_V1 => {
            if header.dimension != dimension {
                warn!(
                    configured = dimension,
                    stored = header.dimension,
                    "configured dimension differs from the v1 file; the file wins"
                );
            }
            migrate_v1_to_v2(&data_path, None)?;
            Ok(())
        }
        Some(header) => Err(EngineError::VersionUnsupported(header.version)),
    }
}

/// Rewrites a v1 database into the v2 layout.
///
/// The original file is copied to `backup_path` (default: the data file
/// path + `.v1.backup`) before anything is touched. Returns the number of
/// entries carried over.
pub fn migrate_v1_to_v2<P: AsRef<Path>>(path: P, backup_path: Option<&Path>) -> Result<usize> {
    let base = base_path(path.as_ref());
    let data_path = suffixed(&base, DATA_SUFFIX);
    let wal_path = suffixed(&base, WAL_SUFFIX);
    let lock_path = suffixed(&base, LOCK_SUFFIX);

    let raw = fs::read(&data_path)?;
    if raw.len() < HEADER_SIZE {
        return Err(EngineError::Corrupt(
            "v1 data file is shorter than its header".to_string(),
        ));
    }
    let header = codec::deserialize_header(&raw)
        .map_err(|_| EngineError::Corrupt("bad v1 data file magic".to_string()))?;
    if header.version != FORMAT_V1 {
        return Err(EngineError::VersionUnsupported(header.version));
    }
    let dimension = header.dimension;

    let backup = match backup_path {
        Some(path) => path.to_path_buf(),
        None => {
            let mut os = data_path.as_os_str().to_os_string();
            os.push(BACKUP_SUFFIX);
            PathBuf::from(os)
        }
    };
    fs::copy(&data_path, &backup)?;

    let entries = parse_v1_records(&raw[HEADER_SIZE..], dimension)?;

    // Stale artifacts of the old database must not leak into the new one.
    fs::remove_file(&data_path)?;
    remove_if_present(&wal_path)?;
    remove_if_present(&lock_path)?;

    let mut options = EngineOptions::new(&base);
    options.dimension = dimension;
    options.batching = false;
    let engine = Engine::open(options)?;
    for (key, embedding) in &entries {
        engine.write_record(key, embedding, OpType::Insert)?;
    }
    engine.close()?;

    info!(
        entries = entries.len(),
        path = %data_path.display(),
        backup = %backup.display(),
        "migrated v1 database to v2"
    );
    Ok(entries.len())
}

/// Parses every v1 record, folding duplicates down to the last value per
/// key while preserving first-insertion order.
fn parse_v1_records(mut buf: &[u8], dimension: u32) -> Result<Vec<(String, Vec<f32>)>> {
    let embedding_bytes = dimension as usize * 4;
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, Vec<f32>> = HashMap::new();

    while !buf.is_empty() {
        if buf.len() < 2 {
            return Err(EngineError::Corrupt("truncated v1 record".to_string()));
        }
        let key_len = LittleEndian::read_u16(&buf[0..2]) as usize;
        let body_len = 2 + key_len + embedding_bytes;
        if buf.len() < body_len + 4 {
            return Err(EngineError::Corrupt("truncated v1 record".to_string()));
        }
        let footer = LittleEndian::read_u32(&buf[body_len..body_len + 4]) as usize;
        if footer != body_len {
            return Err(EngineError::Corrupt(format!(
                "v1 record length footer mismatch: expected {body_len}, found {footer}"
            )));
        }
        let key = std::str::from_utf8(&buf[2..2 + key_len])
            .map_err(|_| EngineError::Corrupt("v1 record key is not valid utf-8".to_string()))?
            .to_string();
        let mut embedding = vec![0f32; dimension as usize];
        LittleEndian::read_f32_into(&buf[2 + key_len..body_len], &mut embedding);

        if !latest.contains_key(&key) {
            order.push(key.clone());
        }
        latest.insert(key, embedding); // last write wins
        buf = &buf[body_len + 4..];
    }

    let mut entries = Vec::with_capacity(order.len());
    for key in order {
        if let Some(embedding) = latest.remove(&key) {
            entries.push((key, embedding));
        }
    }
    Ok(entries)
}

fn peek_header(path: &Path) -> Result<Option<FileHeader>> {
    let mut file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(EngineError::Io(e)),
    };
    let mut buf = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(EngineError::Io(e)),
        }
    }
    if filled < buf.len() {
        return Ok(None);
    }
    Ok(codec::deserialize_header(&buf).ok())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::Io(e)),
    }
}
