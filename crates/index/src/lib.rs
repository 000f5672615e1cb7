use std::collections::HashMap;

use codec::OpType;

/// Where a key's latest committed record lives in the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLocation {
    pub offset: u64,
    pub length: u32,
    pub sequence: i64,
}

/// The in-memory key index: `key -> RecordLocation`.
///
/// Holds no durable state of its own — it is rebuilt from the WAL at every
/// open by applying entries in file order. Keys are unique; iteration
/// order is unspecified.
#[derive(Debug, Default)]
pub struct KeyIndex {
    map: HashMap<String, RecordLocation>,
}

impl KeyIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&RecordLocation> {
        self.map.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Applies one committed operation: inserts and updates set the
    /// latest location, deletes remove the key.
    pub fn apply(&mut self, key: String, location: RecordLocation, op: OpType) {
        match op {
            OpType::Insert | OpType::Update => {
                self.map.insert(key, location);
            }
            OpType::Delete => {
                self.map.remove(&key);
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<RecordLocation> {
        self.map.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn locations(&self) -> impl Iterator<Item = (&str, &RecordLocation)> {
        self.map.iter().map(|(k, loc)| (k.as_str(), loc))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
