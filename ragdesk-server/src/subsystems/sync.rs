//! Sync subsystem — applies validated `/admin/sync_chunk` commands to the
//! vector store.
//!
//! Store writes rewrite the collection file, so they run on the blocking pool.

use std::sync::Arc;

use anyhow::{Context, Result};
use ragdesk_core::embeddings::EmbeddingBackend;
use ragdesk_core::models::sync::{SyncChunkResponse, SyncCommand};
use ragdesk_core::models::vector::{ChunkPayload, VectorPoint};
use ragdesk_core::vector_store::VectorStore;

pub async fn apply_sync_command(
    command: SyncCommand,
    embedder: &dyn EmbeddingBackend,
    store: &Arc<VectorStore>,
    collection: &str,
) -> Result<SyncChunkResponse> {
    let store = Arc::clone(store);
    let name = collection.to_string();

    match command {
        SyncCommand::Upsert { id, text, keywords } => {
            let vector = embedder.embed(&text).await?;
            let point = VectorPoint {
                id,
                vector,
                payload: ChunkPayload { text, keywords },
            };
            tokio::task::spawn_blocking(move || store.upsert(&name, point))
                .await
                .context("vector store task failed")??;
            tracing::info!(id, collection, "Chunk upserted");
            Ok(SyncChunkResponse::upserted(id))
        }
        SyncCommand::Delete { id } => {
            let removed = tokio::task::spawn_blocking(move || store.delete(&name, &[id]))
                .await
                .context("vector store task failed")??;
            tracing::info!(id, collection, removed, "Chunk deleted");
            Ok(SyncChunkResponse::deleted(id))
        }
    }
}
