use std::path::PathBuf;

use tempfile::TempDir;

use crate::{Engine, EngineOptions};

/// Logical base path for a database inside a temp dir.
pub fn base(dir: &TempDir) -> PathBuf {
    dir.path().join("db")
}

/// Opens an engine with the per-write (direct) pipeline.
pub fn open_direct(dir: &TempDir, dimension: u32) -> Engine {
    let mut options = EngineOptions::new(base(dir));
    options.dimension = dimension;
    options.batching = false;
    Engine::open(options).unwrap()
}

/// Opens an engine with the group-commit pipeline.
pub fn open_batched(dir: &TempDir, dimension: u32) -> Engine {
    let mut options = EngineOptions::new(base(dir));
    options.dimension = dimension;
    options.batching = true;
    Engine::open(options).unwrap()
}

/// Opens a read-only engine over an existing database.
pub fn open_read_only(dir: &TempDir, dimension: u32) -> crate::Result<Engine> {
    let mut options = EngineOptions::new(base(dir));
    options.dimension = dimension;
    options.read_only = true;
    Engine::open(options)
}

/// A deterministic embedding: `[seed, seed+1, ...]`.
pub fn embedding(dimension: u32, seed: f32) -> Vec<f32> {
    (0..dimension).map(|i| seed + i as f32).collect()
}
