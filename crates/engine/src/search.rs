//! Reference brute-force search driver.
//!
//! The engine exposes a walk interface — `locations()`,
//! `read_embedding_at()`, `count()`, `dimension()` — and drivers are free
//! to bring their own similarity function and aggregator. This module is
//! the reference driver: a linear scan scored by cosine similarity,
//! accumulated through a fixed-capacity [`TopSet`].

use topset::{ScoredKey, TopSet};

use crate::error::{EngineError, Result};
use crate::Engine;

/// Cosine similarity: `dot(a, b) / (‖a‖·‖b‖)`.
///
/// The denominator is clamped away from zero so a zero vector scores 0
/// instead of producing NaN.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (&x, &y) in a.iter().zip(b) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    dot / (a_norm.sqrt() * b_norm.sqrt()).max(f32::EPSILON)
}

impl Engine {
    /// Brute-force nearest-neighbor search by cosine similarity.
    ///
    /// Returns up to `top_n` keys, best first.
    pub fn search(&self, query: &[f32], top_n: usize) -> Result<Vec<ScoredKey>> {
        self.search_by(query, top_n, cosine_similarity)
    }

    /// Brute-force search with a caller-supplied similarity function.
    ///
    /// Scans every indexed record; entries whose embedding cannot be read
    /// are skipped rather than failing the whole scan.
    pub fn search_by<F>(&self, query: &[f32], top_n: usize, score: F) -> Result<Vec<ScoredKey>>
    where
        F: Fn(&[f32], &[f32]) -> f32,
    {
        if query.len() != self.dimension() as usize {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        let mut top = TopSet::new(top_n);
        for (key, location) in self.locations() {
            if let Some(embedding) = self.read_embedding_at(location.offset)? {
                top.add(key, score(query, &embedding));
            }
        }
        Ok(top.entries())
    }
}
