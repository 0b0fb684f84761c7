//! Overlap-aware text segmentation for paper ingestion.
//!
//! Splitting is deterministic: the chunk sequence is purely a function of the
//! input text and the plan. Windows are counted in characters, not bytes, so
//! splitting never lands inside a multibyte UTF-8 sequence.

use tracing::debug;

use arxivist_shared::{ArxivistError, Result};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_OVERLAP: usize = 200;

/// A validated chunk size/overlap pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    size: usize,
    overlap: usize,
}

impl ChunkPlan {
    /// Create a plan. Size must be positive and overlap strictly smaller
    /// than size; an overlap at or above the size would make the window
    /// fail to advance.
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(ArxivistError::chunking("chunk size must be positive"));
        }
        if overlap >= size {
            return Err(ArxivistError::chunking(format!(
                "overlap {overlap} must be smaller than chunk size {size}"
            )));
        }
        Ok(Self { size, overlap })
    }

    /// Chunk size in characters.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Overlap between consecutive chunks in characters.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Window advance per chunk; always positive for a valid plan.
    fn step(&self) -> usize {
        self.size - self.overlap
    }
}

impl Default for ChunkPlan {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Split `text` into overlapping chunks according to `plan`.
///
/// Every chunk holds `plan.size()` characters except possibly the last;
/// consecutive chunks share exactly `plan.overlap()` characters, except at
/// the final boundary where less of the text may remain. Empty input yields
/// no chunks.
pub fn split(text: &str, plan: &ChunkPlan) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::with_capacity(chars.len().div_ceil(plan.step()));
    let mut start = 0;

    while start < chars.len() {
        let end = (start + plan.size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        start += plan.step();
    }

    debug!(
        chunks = chunks.len(),
        chars = chars.len(),
        size = plan.size,
        overlap = plan.overlap,
        "text split"
    );

    chunks
}
