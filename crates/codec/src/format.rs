use byteorder::{ByteOrder, LittleEndian};

use crate::CodecError;

/// Magic at the start of every data file: the ASCII bytes `EMBD`.
pub const HEADER_MAGIC: [u8; 4] = *b"EMBD";
/// Size of the data file header in bytes.
pub const HEADER_SIZE: usize = 16;
/// Legacy data file version (no WAL, no checksums).
pub const FORMAT_V1: u16 = 1;
/// Current data file version.
pub const FORMAT_V2: u16 = 2;
/// Frame magic shared by data records and WAL entries.
pub const RECORD_MAGIC: u32 = 0xCAFE_BABE;
/// Frame trailer shared by data records and WAL entries.
pub const RECORD_TRAILER: u32 = 0xDEAD_BEEF;
/// On-disk size of one WAL entry.
pub const WAL_ENTRY_SIZE: usize = 48;
/// Version field of the WAL entry layout.
pub const WAL_FORMAT_VERSION: u16 = 1;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// The decoded 16-byte data file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub dimension: u32,
}

/// Encodes a v2 header for a database of the given dimension.
#[must_use]
pub fn serialize_header(dimension: u32) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..4].copy_from_slice(&HEADER_MAGIC);
    buf[4..6].copy_from_slice(&FORMAT_V2.to_le_bytes());
    buf[6..10].copy_from_slice(&dimension.to_le_bytes());
    // bytes 10..16 are reserved and stay zero
    buf
}

/// Decodes a data file header.
///
/// The version field is returned as-is; judging whether it is supported is
/// the caller's business (the migrator needs to see v1 headers).
pub fn deserialize_header(buf: &[u8]) -> Result<FileHeader, CodecError> {
    if buf.len() < HEADER_SIZE {
        return Err(CodecError::Corrupt);
    }
    if buf[0..4] != HEADER_MAGIC {
        return Err(CodecError::BadMagic);
    }
    Ok(FileHeader {
        version: LittleEndian::read_u16(&buf[4..6]),
        dimension: LittleEndian::read_u32(&buf[6..10]),
    })
}

/// FNV-1a 64 over the key's UTF-8 bytes.
///
/// This is the key fingerprint stored in WAL entries. It is not used for
/// lookups — recovery reads the real key from the data file — only as a
/// cheap integrity cross-check and debugging aid.
#[must_use]
pub fn hash_key(key: &str) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in key.as_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
