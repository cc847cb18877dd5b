//! Flat vector index with inner-product similarity.
//!
//! Stores L2-normalized embedding vectors row-major in a single `Vec<f32>`
//! alongside per-row metadata. Search is exact brute force, which is the right
//! trade at the tens-of-thousands-of-vectors scale this crate targets.
//! Persistence lives in [`persist`]: a binary vector blob plus a
//! human-inspectable JSON metadata record.
pub mod persist;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata carried by every indexed chunk.
///
/// Field names match the persisted JSON record, which external tooling may
/// inspect directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub url: String,
    pub chunk_text: String,
    pub page_title: String,
    pub start: usize,
    pub end: usize,
}

/// One indexed row: the caller-assigned chunk id and its metadata.
///
/// The row's position (zero-based, assigned at insertion, never reused) is
/// implicit in storage order and joins the vector rows to this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub meta: ChunkMeta,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("dimension mismatch: index holds {expected}-dim vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("batch shape mismatch: {ids} ids, {vectors} vectors, {metadatas} metadatas")]
    BatchShape {
        ids: usize,
        vectors: usize,
        metadatas: usize,
    },

    #[error("corrupt index artifact: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Append-only flat similarity index over unit-normalized vectors.
pub struct VectorIndex {
    dim: usize,
    vectors: Vec<f32>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Create an empty index accepting vectors of exactly `dim` components.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a batch of vectors with their ids and metadata.
    ///
    /// Every vector is L2-normalized before storage; a zero vector is stored
    /// as-is rather than divided by its zero norm. Positions are assigned from
    /// the index size before the batch, incremented per entry. There is no
    /// update or delete: re-adding an id appends a second row.
    pub fn add(
        &mut self,
        ids: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ChunkMeta],
    ) -> Result<(), IndexError> {
        if ids.len() != vectors.len() || ids.len() != metadatas.len() {
            return Err(IndexError::BatchShape {
                ids: ids.len(),
                vectors: vectors.len(),
                metadatas: metadatas.len(),
            });
        }
        for v in vectors {
            if v.len() != self.dim {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dim,
                    actual: v.len(),
                });
            }
        }

        for ((id, vector), meta) in ids.iter().zip(vectors).zip(metadatas) {
            let mut row = vector.clone();
            l2_normalize(&mut row);
            self.vectors.extend_from_slice(&row);
            self.entries.push(IndexEntry {
                id: id.clone(),
                meta: meta.clone(),
            });
        }
        Ok(())
    }

    /// Return up to `top_k` entries by descending cosine similarity to
    /// `query` (inner product, since stored rows are unit length). Ties break
    /// by ascending position so results are deterministic.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<(IndexEntry, f32)>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }

        let mut q = query.to_vec();
        l2_normalize(&mut q);

        let mut hits: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dim.max(1))
            .enumerate()
            .map(|(position, row)| {
                let score = row.iter().zip(&q).map(|(a, b)| a * b).sum::<f32>();
                (position, score)
            })
            .collect();

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(top_k);

        Ok(hits
            .into_iter()
            .map(|(position, score)| (self.entries[position].clone(), score))
            .collect())
    }
}

/// Scale `v` to unit length in place. A zero vector is left untouched.
fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
