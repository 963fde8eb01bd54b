//! Text chunking with overlap for embedding.

use serde_json::Value;

use crate::error::ChunkError;
use crate::models::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, VectorDocument};

/// How far back from the window end to look for a natural break.
const MAX_LOOKBACK: usize = 100;

/// Splits text into overlapping chunks, preferring natural boundaries.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Window size in characters
    chunk_size: usize,
    /// Characters shared between consecutive chunks
    overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn with_defaults() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into trimmed, non-empty chunks of at most `chunk_size` characters.
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();

        if total == 0 {
            return chunks;
        }

        let mut start = 0;
        loop {
            let mut end = (start + self.chunk_size).min(total);
            if end < total {
                end = self.find_break_point(&chars, start, end);
            }

            let chunk: String = chars[start..end].iter().collect();
            let trimmed = chunk.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }

            if end >= total {
                break;
            }

            // Never step backwards, even when overlap >= chunk_size.
            let next = end.saturating_sub(self.overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// Snap `end` to just after the last paragraph break, sentence end or
    /// space found near the end of the window.
    fn find_break_point(&self, chars: &[char], start: usize, end: usize) -> usize {
        let lookback = self.overlap.min(MAX_LOOKBACK);
        let search_start = end.saturating_sub(lookback).max(start);
        let window = &chars[search_start..end];

        let last_pair = |a: char, b: char| {
            window
                .windows(2)
                .rposition(|w| w[0] == a && w[1] == b)
                .map(|i| search_start + i + 2)
        };

        last_pair('\n', '\n')
            .or_else(|| last_pair('.', ' '))
            .or_else(|| {
                window
                    .iter()
                    .rposition(|c| *c == ' ')
                    .map(|i| search_start + i + 1)
            })
            .unwrap_or(end)
    }

    /// Split a document into child documents linked to their parent.
    ///
    /// A document that fits in one chunk is returned unchanged.
    pub fn chunk_document(&self, document: &VectorDocument) -> Vec<VectorDocument> {
        let pieces = self.split(&document.content);
        if pieces.len() <= 1 {
            return pieces
                .into_iter()
                .map(|content| VectorDocument {
                    content,
                    ..document.clone()
                })
                .collect();
        }

        let mut parent = document.clone();
        let parent_id = parent.ensure_id();
        let total = pieces.len();

        pieces
            .into_iter()
            .enumerate()
            .map(|(index, content)| {
                let mut metadata = document.metadata.clone();
                metadata.insert("parentId".to_string(), Value::from(parent_id.clone()));
                metadata.insert("chunkIndex".to_string(), Value::from(index));
                metadata.insert("totalChunks".to_string(), Value::from(total));
                VectorDocument {
                    id: Some(VectorDocument::chunk_id(&parent_id, index)),
                    content,
                    embedding: None,
                    metadata,
                }
            })
            .collect()
    }
}

/// Split `text` into overlapping chunks.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<String>, ChunkError> {
    Ok(TextChunker::new(chunk_size, chunk_overlap)?.split(text))
}
