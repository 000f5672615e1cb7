use std::sync::Arc;
use std::thread;

use tempfile::tempdir;
use wal::Wal;

use super::helpers::*;
use crate::{EngineError, OpType};

// -------------------- Basic batched commits --------------------

#[test]
fn batched_write_is_immediately_visible() {
    let dir = tempdir().unwrap();
    let engine = open_batched(&dir, 4);

    engine
        .write_record("k", &embedding(4, 1.0), OpType::Insert)
        .unwrap();

    // write_record returned, so the commit fsync has happened and the
    // index is updated.
    assert_eq!(
        engine.read_record("k").unwrap().unwrap().embedding,
        embedding(4, 1.0)
    );
}

#[test]
fn batched_writes_survive_reopen() {
    let dir = tempdir().unwrap();
    let engine = open_batched(&dir, 4);
    for i in 0..50 {
        engine
            .write_record(&format!("k{i}"), &embedding(4, i as f32), OpType::Insert)
            .unwrap();
    }
    engine.close().unwrap();

    let engine = open_direct(&dir, 4);
    assert_eq!(engine.count(), 50);
    for i in 0..50 {
        assert_eq!(
            engine.read_record(&format!("k{i}")).unwrap().unwrap().embedding,
            embedding(4, i as f32),
            "key k{i}"
        );
    }
}

#[test]
fn batched_mixed_inserts_updates_deletes() {
    let dir = tempdir().unwrap();
    let engine = open_batched(&dir, 2);

    engine.write_record("a", &[1.0, 0.0], OpType::Insert).unwrap();
    engine.write_record("b", &[2.0, 0.0], OpType::Insert).unwrap();
    engine.write_record("a", &[3.0, 0.0], OpType::Update).unwrap();
    assert!(engine.delete_record("b").unwrap());
    engine.close().unwrap();

    let engine = open_direct(&dir, 2);
    assert_eq!(engine.count(), 1);
    assert_eq!(
        engine.read_record("a").unwrap().unwrap().embedding,
        vec![3.0, 0.0]
    );
}

// -------------------- Concurrency --------------------

#[test]
fn concurrent_writers_all_commit() {
    let dir = tempdir().unwrap();
    let engine = Arc::new(open_batched(&dir, 4));

    let mut handles = Vec::new();
    for t in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                engine
                    .write_record(
                        &format!("t{t}-k{i}"),
                        &embedding(4, (t * 25 + i) as f32),
                        OpType::Insert,
                    )
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.count(), 200);
    engine.close().unwrap();

    // Reopen and verify the committed state matches.
    let engine = open_direct(&dir, 4);
    assert_eq!(engine.count(), 200);
    assert_eq!(
        engine.read_record("t3-k7").unwrap().unwrap().embedding,
        embedding(4, 82.0)
    );
}

#[test]
fn concurrent_commits_keep_wal_strictly_ordered() {
    let dir = tempdir().unwrap();
    let engine = Arc::new(open_batched(&dir, 2));

    let mut handles = Vec::new();
    for t in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..20 {
                engine
                    .write_record(&format!("t{t}-{i}"), &[1.0, 2.0], OpType::Insert)
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    engine.close().unwrap();

    // Sequence numbers, offsets, and WAL positions must all agree.
    let entries = Wal::new(dir.path().join("db.raptor-wal")).recover().unwrap();
    assert_eq!(entries.len(), 80);
    for window in entries.windows(2) {
        assert!(window[1].sequence > window[0].sequence, "wal out of order");
        assert!(window[1].offset > window[0].offset, "offsets out of order");
    }
    assert_eq!(entries[0].sequence, 1);
}

// -------------------- Flush & close --------------------

#[test]
fn flush_drains_the_queue() {
    let dir = tempdir().unwrap();
    let engine = open_batched(&dir, 2);
    for i in 0..10 {
        engine
            .write_record(&format!("k{i}"), &[i as f32, 0.0], OpType::Insert)
            .unwrap();
    }
    engine.flush().unwrap();

    let entries = Wal::new(engine.wal_path()).recover().unwrap();
    assert_eq!(entries.len(), 10);
}

#[test]
fn flush_on_direct_pipeline_is_a_noop() {
    let dir = tempdir().unwrap();
    let engine = open_direct(&dir, 2);
    engine.flush().unwrap();
}

#[test]
fn close_then_write_fails_closed() {
    let dir = tempdir().unwrap();
    let engine = open_batched(&dir, 2);
    engine.write_record("k", &[1.0, 2.0], OpType::Insert).unwrap();
    engine.close().unwrap();

    assert!(matches!(
        engine.write_record("x", &[1.0, 2.0], OpType::Insert),
        Err(EngineError::Closed)
    ));
}

#[test]
fn batched_and_direct_sessions_interleave() {
    let dir = tempdir().unwrap();

    let engine = open_batched(&dir, 2);
    engine.write_record("a", &[1.0, 0.0], OpType::Insert).unwrap();
    engine.close().unwrap();

    let engine = open_direct(&dir, 2);
    engine.write_record("b", &[2.0, 0.0], OpType::Insert).unwrap();
    engine.close().unwrap();

    let engine = open_batched(&dir, 2);
    engine.write_record("c", &[3.0, 0.0], OpType::Insert).unwrap();
    engine.close().unwrap();

    let engine = open_direct(&dir, 2);
    assert_eq!(engine.count(), 3);
    assert_eq!(engine.next_sequence(), 4);
}
