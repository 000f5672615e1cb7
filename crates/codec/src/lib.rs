//! # Codec - On-Disk Binary Formats
//!
//! Byte-exact encoding and decoding for the three structures RaptorDB
//! persists: the data file header, variable-length data records, and
//! fixed-size WAL entries. Everything in this crate is a pure function over
//! byte slices — no I/O, no shared state — so the storage engine and the
//! recovery path share one set of layouts.
//!
//! ## Data file layout (v2 – current)
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER (16 bytes)                                             │
//! │                                                               │
//! │ magic "EMBD" | version (u16 LE) | dimension (u32 LE)          │
//! │ reserved (6 bytes, zero)                                      │
//! ├───────────────────────────────────────────────────────────────┤
//! │ DATA RECORDS (appended, never rewritten in place)             │
//! │                                                               │
//! │ magic 0xCAFEBABE (u32) | version=2 (u16) | op (u8) | flags    │
//! │ sequence (i64) | timestamp ms (i64)                           │
//! │ key_len (u16) | key (UTF-8) | dimension (u32) | D×f32         │
//! │ crc32 (u32, over everything above) | trailer 0xDEADBEEF       │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL entry layout (48 bytes, fixed)
//!
//! ```text
//! magic 0xCAFEBABE (u32) | version=1 (u16) | op (u8) | flags (u8)
//! sequence (i64) | record offset (u64) | record length (u32)
//! key fingerprint: FNV-1a 64 (u64) | reserved (u32)
//! crc32 over bytes 0..40 (u32) | trailer 0xDEADBEEF (u32)
//! ```
//!
//! All multi-byte integers are little-endian; the header magic is the four
//! ASCII bytes `E`,`M`,`B`,`D` in file order. The CRC32 uses the standard
//! zlib parameters (polynomial `0xEDB88320`, initial value and final XOR
//! `0xFFFFFFFF`) via `crc32fast`.
//!
//! ## Corruption model
//!
//! Record and entry decoding is all-or-nothing: a bad magic, wrong version,
//! short buffer, checksum mismatch, or bad trailer all collapse into
//! [`CodecError::Corrupt`]. Callers only ever ask "is this frame intact?"
//! and get a definite answer.

mod entry;
mod format;
mod record;

pub use entry::{deserialize_wal_entry, serialize_wal_entry, WalEntry};
pub use format::{
    deserialize_header, hash_key, serialize_header, FileHeader, FORMAT_V1, FORMAT_V2,
    HEADER_MAGIC, HEADER_SIZE, RECORD_MAGIC, RECORD_TRAILER, WAL_ENTRY_SIZE, WAL_FORMAT_VERSION,
};
pub use record::{
    deserialize_record, read_key_from_buffer, record_len, serialize_record, DataRecord, OpType,
    KEY_LEN_OFFSET, KEY_OFFSET,
};

use thiserror::Error;

/// Errors produced while decoding on-disk structures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The data file header does not start with the `EMBD` magic.
    #[error("bad data file magic")]
    BadMagic,

    /// A record or WAL entry failed validation. Deliberately coarse: the
    /// caller cannot act differently on a bad trailer vs. a bad checksum.
    #[error("corrupt record")]
    Corrupt,
}

#[cfg(test)]
mod tests;
