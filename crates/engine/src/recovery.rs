//! Cold-start recovery: rebuilding the key index from the WAL.
//!
//! The WAL carries only a key fingerprint, so the data file is the source
//! of truth for keys. For every committed entry a small probe read at the
//! entry's offset decodes the key prefix (magic + key_len + key bytes)
//! without materializing the embedding.

use codec::read_key_from_buffer;
use index::{KeyIndex, RecordLocation};
use tracing::{debug, warn};
use wal::Wal;

use crate::datafile::DataFile;
use crate::error::Result;

/// Bytes read per WAL entry to decode the record's key prefix.
const KEY_PROBE_BYTES: usize = 1024;

/// Replays the WAL against the data file, returning the rebuilt index and
/// the highest committed sequence number.
///
/// Entries whose key cannot be read (short read, bad magic) are skipped —
/// invariant 1 says every committed entry has a fully-written record
/// behind it, so an unreadable key means file-level damage and losing that
/// one entry is the conservative choice. A missing data file yields an
/// empty index and sequence 0.
pub(crate) fn build_from_wal(wal: &Wal, data: &DataFile) -> Result<(KeyIndex, i64)> {
    let mut idx = KeyIndex::new();
    let entries = wal.recover()?;
    if entries.is_empty() || !data.is_present() {
        return Ok((idx, 0));
    }

    let mut max_sequence = 0i64;
    let mut skipped = 0usize;
    for entry in entries {
        max_sequence = max_sequence.max(entry.sequence);

        let probe = match data.read_at_most(entry.offset, KEY_PROBE_BYTES)? {
            Some(probe) => probe,
            None => {
                skipped += 1;
                continue;
            }
        };
        match read_key_from_buffer(&probe, 0) {
            Some(key) => idx.apply(
                key,
                RecordLocation {
                    offset: entry.offset,
                    length: entry.length,
                    sequence: entry.sequence,
                },
                entry.op,
            ),
            None => {
                warn!(
                    sequence = entry.sequence,
                    offset = entry.offset,
                    "skipping wal entry with unreadable key"
                );
                skipped += 1;
            }
        }
    }

    debug!(
        entries = idx.len(),
        max_sequence, skipped, "index rebuilt from wal"
    );
    Ok((idx, max_sequence))
}
