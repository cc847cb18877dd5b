//! Deterministic embedder for tests and offline runs.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError};

/// Produces unit-length vectors seeded from a hash of the input text.
///
/// Identical inputs always map to identical vectors, so exact-text queries
/// retrieve their own chunks with similarity 1.0. No model files required.
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);

        // Expand the 64-bit hash into `dimensions` pseudo-random components
        // in [-1, 1] with a splitmix64 walk, then normalize.
        let mut state = hasher.finish();
        let mut vector = Vec::with_capacity(self.dimensions);
        for _ in 0..self.dimensions {
            state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^= z >> 31;
            vector.push((z >> 40) as f32 / (1u64 << 23) as f32 - 1.0);
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
