use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column width of `chunks.keywords`.
pub const KEYWORDS_MAX_CHARS: usize = 500;

/// Characters shown in listings.
pub const TEXT_PREVIEW_CHARS: usize = 200;
pub const KEYWORDS_PREVIEW_COUNT: usize = 5;

const LABEL_CHARS: usize = 60;
const KEYWORD_SEPARATOR: &str = ", ";

/// Authoritative chunk record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChunkRecord {
    pub id: i64,
    pub text: String,
    /// Comma-joined keyword list.
    pub keywords: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChunkRecord {
    pub fn keyword_list(&self) -> Vec<String> {
        split_keywords(&self.keywords)
    }

    pub fn text_preview(&self) -> String {
        self.text.chars().take(TEXT_PREVIEW_CHARS).collect()
    }

    pub fn keywords_preview(&self) -> String {
        let mut words = self.keyword_list();
        words.truncate(KEYWORDS_PREVIEW_COUNT);
        words.join(KEYWORD_SEPARATOR)
    }

    /// One-line label: the first 60 characters, with an ellipsis if cut.
    pub fn label(&self) -> String {
        if self.text.chars().count() > LABEL_CHARS {
            let head: String = self.text.chars().take(LABEL_CHARS).collect();
            format!("{head}...")
        } else {
            self.text.clone()
        }
    }
}

/// Input for creating or replacing a chunk record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub text: String,
    pub keywords: Vec<String>,
}

impl NewChunk {
    pub fn new(text: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            text: text.into(),
            keywords,
        }
    }

    /// Keywords as stored in the record column.
    pub fn joined_keywords(&self) -> String {
        join_keywords(&self.keywords)
    }
}

/// Split a comma-joined keyword field. Entries are trimmed, empties dropped.
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join keywords for storage, dropping whole trailing keywords that would
/// overflow the column.
pub fn join_keywords(keywords: &[String]) -> String {
    let mut out = String::new();
    let mut used = 0;
    for word in keywords.iter().map(|w| w.trim()).filter(|w| !w.is_empty()) {
        let extra = if out.is_empty() { 0 } else { KEYWORD_SEPARATOR.len() } + word.chars().count();
        if used + extra > KEYWORDS_MAX_CHARS {
            break;
        }
        if !out.is_empty() {
            out.push_str(KEYWORD_SEPARATOR);
        }
        out.push_str(word);
        used += extra;
    }
    out
}
