//! Cross-file coherence checks: after a workload, the WAL, the data
//! file, and the index must all tell the same story.

use std::fs;

use codec::{deserialize_header, deserialize_record, hash_key, WAL_ENTRY_SIZE};
use tempfile::tempdir;
use wal::Wal;

use super::helpers::*;
use crate::OpType;

/// Runs a mixed workload and returns the database directory.
fn mixed_workload(batching: bool) -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    let engine = if batching {
        open_batched(&dir, 4)
    } else {
        open_direct(&dir, 4)
    };

    for i in 0..30 {
        engine
            .write_record(&format!("k{i}"), &embedding(4, i as f32), OpType::Insert)
            .unwrap();
    }
    for i in (0..30).step_by(3) {
        engine
            .write_record(&format!("k{i}"), &embedding(4, 100.0 + i as f32), OpType::Update)
            .unwrap();
    }
    for i in (0..30).step_by(7) {
        engine.delete_record(&format!("k{i}")).unwrap();
    }
    engine.close().unwrap();
    dir
}

fn check_coherence(dir: &tempfile::TempDir) {
    let data = fs::read(dir.path().join("db.raptor")).unwrap();
    let header = deserialize_header(&data).unwrap();
    assert_eq!(header.version, 2);
    assert_eq!(header.dimension, 4);

    let entries = Wal::new(dir.path().join("db.raptor-wal")).recover().unwrap();
    let wal_len = fs::metadata(dir.path().join("db.raptor-wal")).unwrap().len();
    assert_eq!(wal_len, (entries.len() * WAL_ENTRY_SIZE) as u64);

    let mut previous_sequence = 0i64;
    for entry in &entries {
        // Strictly increasing sequence numbers, starting at 1.
        assert!(entry.sequence > previous_sequence);
        previous_sequence = entry.sequence;

        // Every committed entry points at a fully-written record that
        // validates and agrees on op, sequence, and key fingerprint.
        let frame = &data[entry.offset as usize..entry.offset as usize + entry.length as usize];
        let (record, read) = deserialize_record(frame, 0).unwrap();
        assert_eq!(read, entry.length as usize);
        assert_eq!(record.op, entry.op);
        assert_eq!(record.sequence, entry.sequence);
        assert_eq!(hash_key(&record.key), entry.key_hash);
        assert_eq!(record.embedding.len() as u32, header.dimension);
        if record.op == OpType::Delete {
            assert!(record.embedding.iter().all(|&v| v == 0.0));
        }
    }
    assert_eq!(entries[0].sequence, 1);

    // The reopened index must equal the WAL replayed by hand.
    let engine = open_direct(dir, 4);
    let mut expected = std::collections::HashMap::new();
    for entry in &entries {
        let frame = &data[entry.offset as usize..entry.offset as usize + entry.length as usize];
        let (record, _) = deserialize_record(frame, 0).unwrap();
        match record.op {
            OpType::Delete => {
                expected.remove(&record.key);
            }
            _ => {
                expected.insert(record.key.clone(), record.embedding.clone());
            }
        }
    }
    assert_eq!(engine.count(), expected.len());
    for (key, embedding) in &expected {
        assert_eq!(
            engine.read_record(key).unwrap().unwrap().embedding,
            *embedding,
            "key {key}"
        );
    }
}

#[test]
fn direct_pipeline_files_are_coherent() {
    let dir = mixed_workload(false);
    check_coherence(&dir);
}

#[test]
fn batched_pipeline_files_are_coherent() {
    let dir = mixed_workload(true);
    check_coherence(&dir);
}

#[test]
fn records_are_densely_packed_after_the_header() {
    // Offsets in the WAL must tile the data file exactly: header, then
    // record after record with no gaps (this workload has no failed
    // writes, so no orphans).
    let dir = mixed_workload(false);
    let data_len = fs::metadata(dir.path().join("db.raptor")).unwrap().len();
    let entries = Wal::new(dir.path().join("db.raptor-wal")).recover().unwrap();

    let mut expected_offset = 16u64;
    for entry in &entries {
        assert_eq!(entry.offset, expected_offset);
        expected_offset += entry.length as u64;
    }
    assert_eq!(expected_offset, data_len);
}

#[test]
fn batched_records_are_densely_packed_too() {
    let dir = mixed_workload(true);
    let data_len = fs::metadata(dir.path().join("db.raptor")).unwrap().len();
    let entries = Wal::new(dir.path().join("db.raptor-wal")).recover().unwrap();

    let mut expected_offset = 16u64;
    for entry in &entries {
        assert_eq!(entry.offset, expected_offset);
        expected_offset += entry.length as u64;
    }
    assert_eq!(expected_offset, data_len);
}
