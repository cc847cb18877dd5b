//! Text embedding collaborators.
//!
//! The pipeline never assumes a concrete model: anything that can turn a
//! batch of strings into fixed-dimension vectors, deterministically for a
//! fixed configuration, satisfies [`Embedder`]. Two implementations ship with
//! the crate: a hash-seeded [`mock::MockEmbedder`] for tests and offline use,
//! and [`remote::RemoteEmbedder`] for OpenAI-compatible embedding endpoints.
pub mod mock;
pub mod remote;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding backend returned {got} vectors for {want} inputs")]
    CountMismatch { want: usize, got: usize },

    #[error("embedding backend response could not be parsed: {0}")]
    BadResponse(String),
}

/// Capability contract for turning text into vectors.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// behind `Arc` across the serve surface.
pub trait Embedder: Send + Sync {
    /// Embed one string.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed a batch, preserving input order and length.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Dimensionality of every vector this embedder produces.
    fn dimensions(&self) -> usize;
}
