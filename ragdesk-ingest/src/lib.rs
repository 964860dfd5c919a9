pub mod chunker;
pub mod error;
pub mod extractor;
pub mod keywords;
pub mod pipeline;

pub use chunker::RecursiveChunker;
pub use error::IngestError;
pub use extractor::{extract_text, DocumentKind, OcrOptions};
pub use keywords::KeywordExtractor;
pub use pipeline::{stage_file, IngestPipeline, PreparedChunk};
