use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;

use crate::format::{RECORD_MAGIC, RECORD_TRAILER, WAL_ENTRY_SIZE, WAL_FORMAT_VERSION};
use crate::record::OpType;
use crate::CodecError;

/// One fixed-size WAL commit entry.
///
/// The entry records *where* a committed data record lives, not its
/// contents; the data file remains the source of truth for keys and
/// embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalEntry {
    pub op: OpType,
    pub sequence: i64,
    /// Offset of the committed data record in the data file.
    pub offset: u64,
    /// Length of the committed data record in bytes.
    pub length: u32,
    /// FNV-1a 64 fingerprint of the record's key.
    pub key_hash: u64,
}

/// Encodes an entry into its 48-byte frame.
#[must_use]
pub fn serialize_wal_entry(entry: &WalEntry) -> [u8; WAL_ENTRY_SIZE] {
    let mut buf = [0u8; WAL_ENTRY_SIZE];
    buf[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
    buf[4..6].copy_from_slice(&WAL_FORMAT_VERSION.to_le_bytes());
    buf[6] = entry.op.as_u8();
    // buf[7] flags, buf[36..40] reserved: zero
    buf[8..16].copy_from_slice(&entry.sequence.to_le_bytes());
    buf[16..24].copy_from_slice(&entry.offset.to_le_bytes());
    buf[24..28].copy_from_slice(&entry.length.to_le_bytes());
    buf[28..36].copy_from_slice(&entry.key_hash.to_le_bytes());

    let mut hasher = Crc32::new();
    hasher.update(&buf[0..40]);
    let crc = hasher.finalize();
    buf[40..44].copy_from_slice(&crc.to_le_bytes());
    buf[44..48].copy_from_slice(&RECORD_TRAILER.to_le_bytes());
    buf
}

/// Decodes one 48-byte entry frame. Same total-failure contract as
/// [`deserialize_record`](crate::deserialize_record).
pub fn deserialize_wal_entry(buf: &[u8]) -> Result<WalEntry, CodecError> {
    if buf.len() < WAL_ENTRY_SIZE {
        return Err(CodecError::Corrupt);
    }
    if LittleEndian::read_u32(&buf[0..4]) != RECORD_MAGIC {
        return Err(CodecError::Corrupt);
    }
    if LittleEndian::read_u16(&buf[4..6]) != WAL_FORMAT_VERSION {
        return Err(CodecError::Corrupt);
    }
    let op = OpType::from_u8(buf[6]).ok_or(CodecError::Corrupt)?;

    let mut hasher = Crc32::new();
    hasher.update(&buf[0..40]);
    if hasher.finalize() != LittleEndian::read_u32(&buf[40..44]) {
        return Err(CodecError::Corrupt);
    }
    if LittleEndian::read_u32(&buf[44..48]) != RECORD_TRAILER {
        return Err(CodecError::Corrupt);
    }

    Ok(WalEntry {
        op,
        sequence: LittleEndian::read_i64(&buf[8..16]),
        offset: LittleEndian::read_u64(&buf[16..24]),
        length: LittleEndian::read_u32(&buf[24..28]),
        key_hash: LittleEndian::read_u64(&buf[28..36]),
    })
}
