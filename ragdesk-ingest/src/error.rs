use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported document type: {0}")]
    UnsupportedFormat(String),

    #[error("docx error: {0}")]
    Docx(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("failed to run {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ocr failed on page {page}: {details}")]
    OcrFailed { page: usize, details: String },

    #[error("pdf rendering failed: {0}")]
    RenderFailed(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
