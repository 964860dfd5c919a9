//! ONNX embedding backend — local inference via a BERT-style sentence encoder
//! (`cointegrated/rubert-tiny2` by default).
//!
//! Uses the `ort` crate for ONNX Runtime and `tokenizers` for WordPiece
//! tokenization. Sentence vectors are the attention-masked mean of the last
//! hidden state; they are not normalized.

use async_trait::async_trait;
use ndarray::{ArrayView2, ArrayView3, Axis};
use ort::session::Session;
use ort::value::Tensor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::config::expand_path;
use crate::embeddings::{EmbeddingBackend, EmbeddingError, OnnxConfig};

/// Lower bound on the number of unmasked tokens when averaging.
const MASK_FLOOR: f32 = 1e-9;

/// Local ONNX embedding client.
pub struct OnnxEmbeddingClient {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
    batch_size: usize,
}

impl std::fmt::Debug for OnnxEmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingClient")
            .field("dimensions", &self.dimensions)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingClient {
    /// Create a new ONNX embedding client.
    ///
    /// Loads the ONNX model and tokenizer from the paths specified in `config`.
    /// Returns `EmbeddingError::ModelNotFound` if either file is missing.
    pub fn new(config: OnnxConfig) -> Result<Self, EmbeddingError> {
        if !config.model_path.exists() {
            return Err(EmbeddingError::ModelNotFound {
                path: config.model_path.display().to_string(),
            });
        }
        if !config.tokenizer_path.exists() {
            return Err(EmbeddingError::ModelNotFound {
                path: config.tokenizer_path.display().to_string(),
            });
        }

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(config.intra_threads))
            .and_then(|b| b.commit_from_file(&config.model_path))
            .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions: config.dimensions,
            batch_size: config.batch_size,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OnnxEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            // ONNX inference is CPU-bound — run on the blocking thread pool.
            let session = Arc::clone(&self.session);
            let tokenizer = Arc::clone(&self.tokenizer);
            let dimensions = self.dimensions;
            let batch = batch.to_vec();

            let pooled = tokio::task::spawn_blocking(move || {
                let mut session_guard = session.lock().map_err(|e| {
                    EmbeddingError::OnnxInference(format!("session lock poisoned: {e}"))
                })?;
                embed_sync(&mut session_guard, &tokenizer, batch, dimensions)
            })
            .await
            .map_err(|e| EmbeddingError::OnnxInference(format!("spawn_blocking join error: {e}")))??;

            vectors.extend(pooled);
        }

        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

/// Run ONNX inference synchronously over one padded batch.
fn embed_sync(
    session: &mut Session,
    tokenizer: &Tokenizer,
    texts: Vec<String>,
    expected_dims: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    // 1. Tokenize (padding to the longest sequence, truncation at max_tokens)
    let encodings = tokenizer
        .encode_batch(texts, true)
        .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

    let batch = encodings.len();
    let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

    let mut input_ids = Vec::with_capacity(batch * seq_len);
    let mut attention_mask = Vec::with_capacity(batch * seq_len);
    let mut token_type_ids = Vec::with_capacity(batch * seq_len);
    for encoding in &encodings {
        input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
        attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        token_type_ids.extend(encoding.get_type_ids().iter().map(|&t| t as i64));
    }

    let shape = vec![batch as i64, seq_len as i64];

    // 2. Build input tensors
    let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids))
        .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;
    let attention_mask_tensor = Tensor::from_array((shape.clone(), attention_mask.clone()))
        .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids))
        .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;

    let inputs = ort::inputs! {
        "input_ids" => input_ids_tensor,
        "attention_mask" => attention_mask_tensor,
        "token_type_ids" => token_type_ids_tensor,
    };

    // 3. Run session
    let outputs = session
        .run(inputs)
        .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;

    // 4. Extract last hidden state, expected shape [batch, seq_len, hidden_dim]
    let (out_shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;

    if out_shape.len() != 3 {
        return Err(EmbeddingError::OnnxInference(format!(
            "Expected 3D output, got {}D",
            out_shape.len()
        )));
    }
    let dims = (
        out_shape[0] as usize,
        out_shape[1] as usize,
        out_shape[2] as usize,
    );

    let hidden = ArrayView3::from_shape(dims, data)
        .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;
    let mask = ArrayView2::from_shape((batch, seq_len), &attention_mask)
        .map_err(|e| EmbeddingError::OnnxInference(e.to_string()))?;

    // 5. Mean-pool over the sequence, masked by attention_mask
    let pooled = mean_pool(hidden, mask);

    if pooled.len() != batch {
        return Err(EmbeddingError::MissingEmbedding);
    }
    if let Some(actual) = pooled.iter().map(Vec::len).find(|&len| len != expected_dims) {
        return Err(EmbeddingError::InvalidDimensions {
            expected: expected_dims,
            actual,
        });
    }

    Ok(pooled)
}

/// Attention-masked mean over the token axis.
///
/// `hidden` is `[batch, seq_len, hidden_dim]`, `mask` is `[batch, seq_len]`.
/// The token count is floored at `1e-9`, so an all-masked row pools to zeros.
pub fn mean_pool(hidden: ArrayView3<'_, f32>, mask: ArrayView2<'_, i64>) -> Vec<Vec<f32>> {
    let (_, seq_len, hidden_dim) = hidden.dim();

    hidden
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(row, tokens)| {
            let mut pooled = vec![0.0f32; hidden_dim];
            let mut count = 0.0f32;

            for tok_idx in 0..seq_len {
                let weight = mask.get((row, tok_idx)).copied().unwrap_or(0) as f32;
                if weight > 0.0 {
                    for (slot, value) in pooled.iter_mut().zip(tokens.index_axis(Axis(0), tok_idx)) {
                        *slot += value * weight;
                    }
                    count += weight;
                }
            }

            let denom = count.max(MASK_FLOOR);
            for v in &mut pooled {
                *v /= denom;
            }
            pooled
        })
        .collect()
}

/// Resolve paths for the ONNX model and tokenizer.
///
/// If `tokenizer_path` is empty, uses `<model stem>-tokenizer.json` next to the model.
pub fn resolve_onnx_paths(model_path: &str, tokenizer_path: &str) -> (PathBuf, PathBuf) {
    let model = expand_path(model_path);
    if !tokenizer_path.is_empty() {
        return (model, expand_path(tokenizer_path));
    }

    let stem = model
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let tokenizer = model.with_file_name(format!("{stem}-tokenizer.json"));
    (model, tokenizer)
}

// ============================================================================
// TESTS
// ============================================================================
