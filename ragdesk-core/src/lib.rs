pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod generator;
pub mod models;
pub mod onnx_embedder;
pub mod records;
pub mod sync_bridge;
pub mod vector_store;

pub use config::RagdeskConfig;
pub use embeddings::{create_backend, EmbeddingBackend, EmbeddingError, OnnxConfig, DEFAULT_DIMENSIONS};
pub use error::RagdeskError;
pub use generator::{build_prompt, ChatBackend, GenerationError, LlamaChatClient};
pub use models::chunk::{ChunkRecord, NewChunk};
pub use models::document::UploadedDocument;
pub use models::sync::{SyncChunkRequest, SyncChunkResponse, SyncCommand, SyncValidationError};
pub use models::vector::{ChunkPayload, CollectionInfo, PointId, ScoredPoint, VectorPoint};
pub use onnx_embedder::OnnxEmbeddingClient;
pub use records::{ChunkQuery, ChunkRepository, DocumentRepository};
pub use sync_bridge::{ChunkEvent, HttpSyncBridge, NoopPublisher, SyncError, SyncPublisher};
pub use vector_store::{VectorStore, VectorStoreError};
