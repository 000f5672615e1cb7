use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;

use crate::format::{FORMAT_V2, RECORD_MAGIC, RECORD_TRAILER};
use crate::CodecError;

/// Byte offset of the `key_len` field within a data record frame.
pub const KEY_LEN_OFFSET: usize = 24;
/// Byte offset of the first key byte within a data record frame.
pub const KEY_OFFSET: usize = 26;

/// CRC32 + trailer at the end of every record frame.
const FRAME_SUFFIX: usize = 8;

/// The kind of mutation a record or WAL entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpType {
    Insert = 0,
    Update = 1,
    Delete = 2,
}

impl OpType {
    /// Decodes the on-disk op byte.
    pub fn from_u8(value: u8) -> Option<OpType> {
        match value {
            0 => Some(OpType::Insert),
            1 => Some(OpType::Update),
            2 => Some(OpType::Delete),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// One decoded data record.
///
/// Deletes carry a zero vector of the database dimension so a tombstone
/// validates through the same path as any other record.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    pub op: OpType,
    /// Monotonic across the lifetime of the database; the first write is 1.
    pub sequence: i64,
    /// Unix milliseconds at write time.
    pub timestamp: i64,
    pub key: String,
    pub embedding: Vec<f32>,
}

/// Total encoded size of a record with the given key and dimension.
#[must_use]
pub fn record_len(key: &str, dimension: u32) -> usize {
    KEY_OFFSET + key.len() + 4 + dimension as usize * 4 + FRAME_SUFFIX
}

/// Encodes a record, computing the CRC32 over the serialized prefix.
#[must_use]
pub fn serialize_record(record: &DataRecord) -> Vec<u8> {
    let dimension = record.embedding.len() as u32;
    let mut buf = Vec::with_capacity(record_len(&record.key, dimension));

    buf.extend_from_slice(&RECORD_MAGIC.to_le_bytes());
    buf.extend_from_slice(&FORMAT_V2.to_le_bytes());
    buf.push(record.op.as_u8());
    buf.push(0); // flags
    buf.extend_from_slice(&record.sequence.to_le_bytes());
    buf.extend_from_slice(&record.timestamp.to_le_bytes());
    buf.extend_from_slice(&(record.key.len() as u16).to_le_bytes());
    buf.extend_from_slice(record.key.as_bytes());
    buf.extend_from_slice(&dimension.to_le_bytes());
    for &value in &record.embedding {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    let mut hasher = Crc32::new();
    hasher.update(&buf);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());
    buf.extend_from_slice(&RECORD_TRAILER.to_le_bytes());
    buf
}

/// Decodes the record starting at `start`, returning it together with the
/// number of bytes it occupied.
///
/// Failure is total: bad magic, wrong version, short buffer, checksum
/// mismatch, and bad trailer all come back as [`CodecError::Corrupt`].
pub fn deserialize_record(buf: &[u8], start: usize) -> Result<(DataRecord, usize), CodecError> {
    if start > buf.len() {
        return Err(CodecError::Corrupt);
    }
    let frame = &buf[start..];
    if frame.len() < KEY_OFFSET {
        return Err(CodecError::Corrupt);
    }
    if LittleEndian::read_u32(&frame[0..4]) != RECORD_MAGIC {
        return Err(CodecError::Corrupt);
    }
    if LittleEndian::read_u16(&frame[4..6]) != FORMAT_V2 {
        return Err(CodecError::Corrupt);
    }
    let op = OpType::from_u8(frame[6]).ok_or(CodecError::Corrupt)?;
    let sequence = LittleEndian::read_i64(&frame[8..16]);
    let timestamp = LittleEndian::read_i64(&frame[16..24]);
    let key_len = LittleEndian::read_u16(&frame[KEY_LEN_OFFSET..KEY_OFFSET]) as usize;

    let dim_offset = KEY_OFFSET + key_len;
    let emb_offset = dim_offset + 4;
    if frame.len() < emb_offset {
        return Err(CodecError::Corrupt);
    }
    let key = std::str::from_utf8(&frame[KEY_OFFSET..dim_offset])
        .map_err(|_| CodecError::Corrupt)?
        .to_string();

    let dimension = LittleEndian::read_u32(&frame[dim_offset..emb_offset]) as usize;
    // An absurd dimension means the frame is damaged; bail before the
    // multiplication can wrap.
    if dimension > frame.len() / 4 {
        return Err(CodecError::Corrupt);
    }
    let crc_offset = emb_offset + dimension * 4;
    let total = crc_offset + FRAME_SUFFIX;
    if frame.len() < total {
        return Err(CodecError::Corrupt);
    }

    let mut hasher = Crc32::new();
    hasher.update(&frame[..crc_offset]);
    if hasher.finalize() != LittleEndian::read_u32(&frame[crc_offset..crc_offset + 4]) {
        return Err(CodecError::Corrupt);
    }
    if LittleEndian::read_u32(&frame[crc_offset + 4..total]) != RECORD_TRAILER {
        return Err(CodecError::Corrupt);
    }

    let mut embedding = vec![0f32; dimension];
    LittleEndian::read_f32_into(&frame[emb_offset..crc_offset], &mut embedding);

    Ok((
        DataRecord {
            op,
            sequence,
            timestamp,
            key,
            embedding,
        },
        total,
    ))
}

/// Extracts just the key of the record at `start`, without materializing
/// the embedding.
///
/// Validates the frame magic, then reads `key_len` at +24 and the key
/// bytes at +26. Recovery uses this to rebuild the index with one small
/// read per WAL entry. Returns `None` when the buffer is too short, the
/// magic is wrong, or the key is not UTF-8.
#[must_use]
pub fn read_key_from_buffer(buf: &[u8], start: usize) -> Option<String> {
    if start > buf.len() {
        return None;
    }
    let frame = &buf[start..];
    if frame.len() < KEY_OFFSET {
        return None;
    }
    if LittleEndian::read_u32(&frame[0..4]) != RECORD_MAGIC {
        return None;
    }
    let key_len = LittleEndian::read_u16(&frame[KEY_LEN_OFFSET..KEY_OFFSET]) as usize;
    let end = KEY_OFFSET + key_len;
    if frame.len() < end {
        return None;
    }
    std::str::from_utf8(&frame[KEY_OFFSET..end])
        .ok()
        .map(str::to_owned)
}
