//! extract → chunk → keywords.

use std::path::Path;

use ragdesk_core::config::IngestConfig;
use ragdesk_core::models::chunk::NewChunk;
use tempfile::NamedTempFile;

use crate::chunker::RecursiveChunker;
use crate::error::{IngestError, Result};
use crate::extractor::{extract_text, DocumentKind, OcrOptions};
use crate::keywords::KeywordExtractor;

/// One chunk ready for embedding and storage.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedChunk {
    pub text: String,
    pub keywords: Vec<String>,
}

impl From<PreparedChunk> for NewChunk {
    fn from(chunk: PreparedChunk) -> Self {
        NewChunk::new(chunk.text, chunk.keywords)
    }
}

#[derive(Debug, Clone)]
pub struct IngestPipeline {
    chunker: RecursiveChunker,
    keywords: KeywordExtractor,
    keyword_count: usize,
    ocr: OcrOptions,
}

impl IngestPipeline {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        Ok(Self {
            chunker: RecursiveChunker::new(config.chunk_size)?,
            keywords: KeywordExtractor::new()?,
            keyword_count: config.keyword_count,
            ocr: OcrOptions::from(config),
        })
    }

    /// Extract, chunk and tag a PDF or DOCX document.
    pub async fn prepare_document(&self, path: &Path) -> Result<Vec<PreparedChunk>> {
        let text = extract_text(path, &self.ocr).await?;
        let chunks = self.prepare_text(&text);
        tracing::info!(
            path = %path.display(),
            chars = text.chars().count(),
            chunks = chunks.len(),
            "Prepared document"
        );
        Ok(chunks)
    }

    pub fn prepare_text(&self, text: &str) -> Vec<PreparedChunk> {
        self.chunker
            .chunk(text)
            .into_iter()
            .map(|chunk| {
                let keywords = self.keywords.extract(&chunk, self.keyword_count);
                PreparedChunk { text: chunk, keywords }
            })
            .collect()
    }

    /// Copy an upload into a scoped temp file (same extension) and prepare it.
    /// The temp file is removed whether or not preparation succeeds.
    pub async fn prepare_upload(&self, source: &Path) -> Result<Vec<PreparedChunk>> {
        let staged = stage_file(source)?;
        let result = self.prepare_document(staged.path()).await;
        if let Err(e) = staged.close() {
            tracing::warn!(error = %e, "Failed to remove staged upload");
        }
        result
    }
}

/// Copy `source` into a new temp file carrying its extension.
pub fn stage_file(source: &Path) -> Result<NamedTempFile> {
    let kind = DocumentKind::from_path(source)?;
    let suffix = match kind {
        DocumentKind::Pdf => ".pdf",
        DocumentKind::Docx => ".docx",
    };
    let staged = tempfile::Builder::new()
        .prefix("ragdesk-upload-")
        .suffix(suffix)
        .tempfile()?;
    std::fs::copy(source, staged.path()).map_err(IngestError::Io)?;
    Ok(staged)
}
