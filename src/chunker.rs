//! Windowed text chunking.
//!
//! Splits extracted page text into fixed-size overlapping windows measured in
//! characters. Offsets are character offsets into the source text so that a
//! chunk can always be located again after re-extraction.
use thiserror::Error;
use tracing::debug;

/// A contiguous slice of a page's text, the unit of embedding and retrieval.
///
/// `start`/`end` are character offsets with `0 <= start < end <= chars(text)`.
/// `seq` restarts at zero for every [`chunk_text`] call; callers indexing
/// multiple pages must derive their own globally unique ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub seq: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,

    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    OverlapTooLarge { overlap: usize, chunk_size: usize },
}

/// Split `text` into windows of `chunk_size` characters advancing by
/// `chunk_size - overlap`. The final window's end is clamped to the text
/// length, so the last pair of chunks may share fewer than `overlap`
/// characters.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<TextChunk>, ChunkError> {
    if chunk_size == 0 {
        return Err(ChunkError::ZeroChunkSize);
    }
    // overlap >= chunk_size would stop the cursor from ever advancing.
    if overlap >= chunk_size {
        return Err(ChunkError::OverlapTooLarge {
            overlap,
            chunk_size,
        });
    }

    // Byte offset of every character boundary, including the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = bounds.len() - 1;

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut pos = 0;
    while pos < char_count {
        let end = (pos + chunk_size).min(char_count);
        chunks.push(TextChunk {
            seq: chunks.len(),
            text: text[bounds[pos]..bounds[end]].to_string(),
            start: pos,
            end,
        });
        pos += step;
    }

    debug!(
        "split {} chars into {} chunks (size={}, overlap={})",
        char_count,
        chunks.len(),
        chunk_size,
        overlap
    );
    Ok(chunks)
}
