//! Embeddings module for ragdesk
//!
//! Provides the `EmbeddingBackend` trait used by ingestion (chunk vectors),
//! the sync endpoint (single chunk vectors) and retrieval (question vectors).
//! The production implementation is the local ONNX encoder in
//! [`crate::onnx_embedder`].

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::EmbeddingConfig;

/// Output size of `cointegrated/rubert-tiny2`.
pub const DEFAULT_DIMENSIONS: usize = 312;

// ============================================================================
// EmbeddingBackend trait
// ============================================================================

/// Abstraction over text encoders.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a batch of texts. The output has one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::MissingEmbedding)
    }

    /// Returns the embedding dimension (e.g. 312).
    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

/// Embedding generation errors
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Invalid output: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Missing embedding in model output")]
    MissingEmbedding,

    #[error("ONNX model not found at {path}")]
    ModelNotFound { path: String },

    #[error("ONNX inference error: {0}")]
    OnnxInference(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

// ============================================================================
// Config types
// ============================================================================

/// ONNX backend configuration
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimensions: usize,
    pub max_tokens: usize,
    pub batch_size: usize,
    pub intra_threads: usize,
}

impl From<&EmbeddingConfig> for OnnxConfig {
    fn from(config: &EmbeddingConfig) -> Self {
        let (model_path, tokenizer_path) =
            crate::onnx_embedder::resolve_onnx_paths(&config.model_path, &config.tokenizer_path);
        Self {
            model_path,
            tokenizer_path,
            dimensions: config.dimensions,
            max_tokens: config.max_tokens,
            batch_size: config.batch_size.max(1),
            intra_threads: config.intra_threads.unwrap_or_else(num_cpus::get).max(1),
        }
    }
}

/// Create the embedding backend from configuration.
///
/// Called once at process start; the returned handle is shared for the
/// lifetime of the process.
pub fn create_backend(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingBackend>, EmbeddingError> {
    let onnx = OnnxConfig::from(config);
    tracing::info!(
        model = %onnx.model_path.display(),
        dimensions = onnx.dimensions,
        threads = onnx.intra_threads,
        "Loading ONNX embedding model"
    );
    Ok(Box::new(crate::onnx_embedder::OnnxEmbeddingClient::new(onnx)?))
}

// ============================================================================
// TESTS
// ============================================================================
