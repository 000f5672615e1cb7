//! Read path: `read_record()`, `read_embedding_at()`, and the index
//! accessors.
//!
//! Corruption is handled locally: the index may point at physically
//! damaged bytes, and the read side refuses to surface a record that does
//! not validate — it reports the key as absent instead of erroring.

use byteorder::{ByteOrder, LittleEndian};

use codec::{deserialize_record, DataRecord, KEY_LEN_OFFSET, KEY_OFFSET};
use index::RecordLocation;

use crate::error::Result;
use crate::Engine;

/// Bytes read to locate an embedding: enough to cover the fixed record
/// prefix through `key_len`.
const EMBEDDING_PROBE: usize = 28;

impl Engine {
    /// Looks up the latest committed record for `key`.
    ///
    /// Returns `Ok(None)` when the key is unknown **or** when the stored
    /// bytes fail validation (bad checksum, bad trailer, short read, or a
    /// dimension that disagrees with the header).
    pub fn read_record(&self, key: &str) -> Result<Option<DataRecord>> {
        let location = match self.index.read().get(key) {
            Some(location) => *location,
            None => return Ok(None),
        };
        let buf = match self
            .data
            .read_exact_at(location.offset, location.length as usize)?
        {
            Some(buf) => buf,
            None => return Ok(None),
        };
        match deserialize_record(&buf, 0) {
            Ok((record, _)) if record.embedding.len() == self.dimension as usize => {
                Ok(Some(record))
            }
            _ => Ok(None),
        }
    }

    /// Whether `key` currently maps to a live record.
    pub fn has_key(&self, key: &str) -> bool {
        self.index.read().has(key)
    }

    /// All live keys, in unspecified order.
    pub fn keys(&self) -> Vec<String> {
        self.index.read().keys().map(str::to_owned).collect()
    }

    /// All live keys with their record locations. This is the walk
    /// interface the search driver iterates.
    pub fn locations(&self) -> Vec<(String, RecordLocation)> {
        self.index
            .read()
            .locations()
            .map(|(key, location)| (key.to_owned(), *location))
            .collect()
    }

    /// Number of live keys.
    pub fn count(&self) -> usize {
        self.index.read().len()
    }

    /// Reads just the embedding of the record at `offset`, skipping the
    /// key and the per-record dimension field.
    ///
    /// Two positional reads: a 28-byte probe for `key_len`, then the
    /// `D×4` embedding bytes at `offset + 26 + key_len + 4`. Callers that
    /// walk every entry use this to avoid full-record decoding.
    pub fn read_embedding_at(&self, offset: u64) -> Result<Option<Vec<f32>>> {
        let probe = match self.data.read_exact_at(offset, EMBEDDING_PROBE)? {
            Some(probe) => probe,
            None => return Ok(None),
        };
        let key_len = LittleEndian::read_u16(&probe[KEY_LEN_OFFSET..KEY_OFFSET]) as usize;

        let embedding_offset = offset + (KEY_OFFSET + key_len + 4) as u64;
        let embedding_len = self.dimension as usize * 4;
        let bytes = match self.data.read_exact_at(embedding_offset, embedding_len)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let mut embedding = vec![0f32; self.dimension as usize];
        LittleEndian::read_f32_into(&bytes, &mut embedding);
        Ok(Some(embedding))
    }
}
