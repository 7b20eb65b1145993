
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;

/// One window of a document, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk within its document
    pub index: usize,
    /// Offset of the first character, counted in characters
    pub char_offset: usize,
    /// Number of leading characters shared with the previous chunk
    pub overlap: usize,
    pub text: String,
    /// Estimated token count
    pub token_count: usize,
}

impl Chunk {
    /// The part of this chunk not already covered by its predecessor.
    #[inline]
    pub fn fresh_text(&self) -> &str {
        let start = byte_offset_of_char(&self.text, self.overlap);
        self.text.get(start..).unwrap_or_default()
    }
}

/// Configuration for content chunking, measured in characters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunkOverlap(
                self.chunk_overlap,
                self.chunk_size,
            ));
        }
        Ok(())
    }
}

/// Splits text into fixed-size overlapping character windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            size: config.chunk_size,
            overlap: config.chunk_overlap,
        })
    }

    /// Lazily chunk `text`. Calling this again restarts from the beginning.
    #[inline]
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        debug!(
            "Chunking {} bytes with size {} and overlap {}",
            text.len(),
            self.size,
            self.overlap
        );
        Chunks {
            text,
            size: self.size,
            step: self.size - self.overlap,
            byte_pos: 0,
            char_pos: 0,
            prev_end_char: 0,
            index: 0,
        }
    }
}

/// Iterator over the chunks of one text
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    size: usize,
    step: usize,
    byte_pos: usize,
    char_pos: usize,
    prev_end_char: usize,
    index: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.text.get(self.byte_pos..)?;
        if rest.is_empty() {
            return None;
        }

        let window_end = byte_offset_of_char(rest, self.size);
        let window = rest.get(..window_end)?;
        let window_chars = window.chars().count();

        let chunk = Chunk {
            index: self.index,
            char_offset: self.char_pos,
            overlap: self.prev_end_char.saturating_sub(self.char_pos),
            text: window.to_string(),
            token_count: estimate_token_count(window),
        };

        self.prev_end_char = self.char_pos + window_chars;
        self.byte_pos += byte_offset_of_char(rest, self.step);
        self.char_pos += self.step;
        self.index += 1;

        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

/// Byte offset of the `n`th character, or the string length if it has fewer.
fn byte_offset_of_char(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map_or(text.len(), |(i, _)| i)
}

/// Estimate token count for text (rough approximation)
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
