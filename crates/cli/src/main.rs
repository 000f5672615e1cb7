///! # CLI - RaptorDB Interactive Shell
///!
///! A REPL-style command-line interface for the RaptorDB vector store.
///! Reads commands from stdin, executes them against the engine, and
///! prints results to stdout. Designed for both interactive use and
///! scripted testing (pipe commands via stdin). Vectors are entered as
///! comma-separated floats; embedding generation lives outside this tool.
///!
///! ## Commands
///!
///! ```text
///! PUT key v1,v2,...      Insert or update a vector under key
///! GET key                Print the stored vector (or "(nil)")
///! DEL key                Delete a key (writes a tombstone)
///! SEARCH v1,v2,... [n]   Top-n brute-force cosine search (default 5)
///! KEYS                   List all live keys
///! FLUSH                  Drain the write batcher
///! STATS                  Print engine debug info
///! EXIT / QUIT            Shut down gracefully
///! ```
///!
///! ## Configuration
///!
///! All settings are controlled via environment variables:
///!
///! ```text
///! RAPTOR_PATH             Database base path      (default: "data/db")
///! RAPTOR_DIM              Embedding dimension     (default: 384)
///! RAPTOR_BATCHING         Group-commit writes     (default: "true")
///! RAPTOR_LOCK_TIMEOUT_MS  Write-lock timeout      (default: 10000)
///! RAPTOR_READ_ONLY        Open read-only          (default: "false")
///! RUST_LOG                tracing filter          (e.g. "engine=debug")
///! ```
///!
///! ## Example
///!
///! ```text
///! $ RAPTOR_DIM=4 cargo run -p cli
///! RaptorDB started (dim=4, path=data/db, batching=true, read_only=false)
///! > PUT greeting 0.1,0.2,0.3,0.4
///! OK
///! > SEARCH 0.1,0.2,0.3,0.4 1
///! greeting  score=1.0000
///! (1 results)
///! > EXIT
///! bye
///! ```

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::Result;
use engine::{Engine, EngineOptions, OpType};
use tracing_subscriber::EnvFilter;

/// Reads a configuration value from the environment, falling back to
/// `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses a comma-separated float list: `0.1,0.2,-3.5`.
fn parse_vector(text: &str) -> Result<Vec<f32>> {
    text.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| anyhow::anyhow!("bad float {:?}: {}", part.trim(), e))
        })
        .collect()
}

fn format_vector(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = env_or("RAPTOR_PATH", "data/db");
    let dimension: u32 = env_or("RAPTOR_DIM", "384").parse().unwrap_or(384);
    let batching: bool = env_or("RAPTOR_BATCHING", "true").parse().unwrap_or(true);
    let lock_timeout_ms: u64 = env_or("RAPTOR_LOCK_TIMEOUT_MS", "10000")
        .parse()
        .unwrap_or(10_000);
    let read_only: bool = env_or("RAPTOR_READ_ONLY", "false").parse().unwrap_or(false);

    let mut options = EngineOptions::new(&path);
    options.dimension = dimension;
    options.batching = batching;
    options.lock_timeout = Duration::from_millis(lock_timeout_ms);
    options.read_only = read_only;
    let engine = Engine::open(options)?;

    println!(
        "RaptorDB started (dim={}, path={}, batching={}, read_only={})",
        engine.dimension(),
        path,
        batching,
        read_only
    );
    println!("Commands: PUT key v1,v2,... | GET key | DEL key | SEARCH v1,v2,... [n]");
    println!("          KEYS | FLUSH | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(command) = parts.next() {
            match command.to_uppercase().as_str() {
                "PUT" => match (parts.next(), parts.next()) {
                    (Some(key), Some(vector_text)) => match parse_vector(vector_text) {
                        Ok(vector) => {
                            let op = if engine.has_key(key) {
                                OpType::Update
                            } else {
                                OpType::Insert
                            };
                            match engine.write_record(key, &vector, op) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR put failed: {}", e),
                            }
                        }
                        Err(e) => println!("ERR {}", e),
                    },
                    _ => println!("ERR usage: PUT key v1,v2,..."),
                },
                "GET" => {
                    if let Some(key) = parts.next() {
                        match engine.read_record(key) {
                            Ok(Some(record)) => println!("{}", format_vector(&record.embedding)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(key) = parts.next() {
                        match engine.delete_record(key) {
                            Ok(true) => println!("OK"),
                            Ok(false) => println!("(nil)"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "SEARCH" => {
                    if let Some(vector_text) = parts.next() {
                        let top_n: usize =
                            parts.next().and_then(|n| n.parse().ok()).unwrap_or(5);
                        match parse_vector(vector_text) {
                            Ok(query) => match engine.search(&query, top_n) {
                                Ok(results) => {
                                    if results.is_empty() {
                                        println!("(empty)");
                                    } else {
                                        for result in &results {
                                            println!(
                                                "{}  score={:.4}",
                                                result.key, result.score
                                            );
                                        }
                                        println!("({} results)", results.len());
                                    }
                                }
                                Err(e) => println!("ERR search failed: {}", e),
                            },
                            Err(e) => println!("ERR {}", e),
                        }
                    } else {
                        println!("ERR usage: SEARCH v1,v2,... [n]");
                    }
                }
                "KEYS" => {
                    let mut keys = engine.keys();
                    keys.sort_unstable();
                    for key in &keys {
                        println!("{}", key);
                    }
                    println!("({} keys)", keys.len());
                }
                "FLUSH" => match engine.flush() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR flush failed: {}", e),
                },
                "STATS" => {
                    println!("{:?}", engine);
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    engine.close()?;
    Ok(())
}
