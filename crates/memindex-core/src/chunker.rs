//! Line-window chunking with overlap.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{chunk_id, Chunk, Embedding};

/// Window geometry in lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { chunk_size: 400, overlap: 80 }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be greater than zero".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Lines the window advances per step.
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }
}

/// One window: its text and 1-based inclusive line range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub text: String,
    pub line_start: usize,
    pub line_end: usize,
}

/// Splits `text` into windows of `chunk_size` lines sharing `overlap` lines
/// with their predecessor. `first_line` is the number given to the first
/// line of `text`. The last window is clipped to the final line and no
/// window starts after one has reached it.
pub fn chunk_lines(text: &str, first_line: usize, chunk_size: usize, overlap: usize) -> Vec<ChunkSpan> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let stride = chunk_size.saturating_sub(overlap).max(1);
    let mut spans = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + chunk_size).min(lines.len());
        spans.push(ChunkSpan {
            text: lines[start..end].join("\n"),
            line_start: first_line + start,
            line_end: first_line + end - 1,
        });
        if end >= lines.len() {
            break;
        }
        start += stride;
    }
    spans
}

/// Turns whole documents into `Chunk`s with stable ids.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunks without embeddings; the index fills those in afterwards.
    pub fn chunk_document(&self, file: &str, text: &str) -> Vec<Chunk> {
        chunk_lines(text, 1, self.config.chunk_size, self.config.overlap)
            .into_iter()
            .enumerate()
            .map(|(ordinal, span)| Chunk {
                id: chunk_id(file, ordinal),
                file: file.to_string(),
                line_start: span.line_start,
                line_end: span.line_end,
                text: span.text,
                embedding: Embedding::Missing,
            })
            .collect()
    }
}
