//! Recursive character-budget chunker.
//!
//! Text is split on the coarsest boundary available (paragraphs, lines,
//! sentences, clauses, words) and only pieces still over budget descend to
//! the next level; words longer than the budget are cut by characters.
//! Adjacent pieces are then merged greedily up to the budget. Delimiters
//! stay attached to the piece they end, so concatenating the chunks gives
//! back the input.

use crate::error::{IngestError, Result};

/// Boundary levels, coarsest first.
const LEVELS: &[&[&str]] = &[
    &["\n\n"],
    &["\n"],
    &[". ", "! ", "? ", "… "],
    &["; ", ", "],
    &[" "],
];

pub const DEFAULT_CHUNK_SIZE: usize = 2048;

#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl RecursiveChunker {
    /// `chunk_size` is the maximum chunk length in characters.
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig("chunk_size must be positive".to_string()));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Ordered, non-empty chunks of at most `chunk_size` characters.
    /// Whitespace-only pieces are dropped.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split(text, 0)
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .collect()
    }

    fn split(&self, text: &str, level: usize) -> Vec<String> {
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }
        let Some(delims) = LEVELS.get(level) else {
            return split_chars(text, self.chunk_size);
        };

        let pieces = split_keep(text, delims);
        if pieces.len() == 1 {
            return self.split(text, level + 1);
        }

        let mut fitted = Vec::with_capacity(pieces.len());
        for piece in pieces {
            if char_len(piece) <= self.chunk_size {
                fitted.push(piece.to_string());
            } else {
                fitted.extend(self.split(piece, level + 1));
            }
        }
        merge(fitted, self.chunk_size)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split after every occurrence of any delimiter, keeping the delimiter.
fn split_keep<'a>(text: &'a str, delims: &[&str]) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let rest = &text[start..];
        let next = delims
            .iter()
            .filter_map(|d| rest.find(d).map(|i| i + d.len()))
            .min();
        match next {
            Some(end) => {
                pieces.push(&rest[..end]);
                start += end;
            }
            None => break,
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn split_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

/// Greedily concatenate pieces (each within budget) up to the budget.
fn merge(pieces: Vec<String>, size: usize) -> Vec<String> {
    let mut merged = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in pieces {
        let len = char_len(&piece);
        if current_len + len > size && !current.is_empty() {
            merged.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(&piece);
        current_len += len;
    }
    if !current.is_empty() {
        merged.push(current);
    }
    merged
}
