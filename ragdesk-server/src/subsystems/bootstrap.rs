//! Bootstrap subsystem — makes sure the vector collection exists at startup
//!
//! - Existing collection: reused as is
//! - Missing collection + existing chunk records: rebuilt from the records,
//!   each point under its record id (covers uploads and earlier bootstraps)
//! - Missing collection + empty records + configured source document: the
//!   document is prepared, registered as chunk records (when a database is
//!   configured) and bulk-loaded under the record ids
//! - Otherwise an empty collection is created

use std::path::Path;

use anyhow::{Context, Result};
use ragdesk_core::embeddings::EmbeddingBackend;
use ragdesk_core::models::chunk::{ChunkRecord, NewChunk};
use ragdesk_core::models::vector::{ChunkPayload, PointId, VectorPoint};
use ragdesk_core::records::ChunkRepository;
use ragdesk_core::vector_store::VectorStore;
use ragdesk_ingest::{IngestPipeline, PreparedChunk};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Reused { points: usize },
    Rebuilt { points: usize },
    BulkLoaded { points: usize, record_ids: bool },
    CreatedEmpty,
}

pub async fn ensure_collection(
    store: &VectorStore,
    collection: &str,
    embedder: &dyn EmbeddingBackend,
    source_document: Option<&Path>,
    pipeline: &IngestPipeline,
    records: Option<&ChunkRepository>,
) -> Result<BootstrapOutcome> {
    if store.collection_exists(collection)? {
        let info = store.create_or_load(collection, embedder.dimensions())?;
        return Ok(BootstrapOutcome::Reused { points: info.points });
    }

    if let Some(repo) = records {
        if repo.count().await? > 0 {
            let existing = repo.all().await?;
            tracing::info!(collection, records = existing.len(), "Rebuilding collection from chunk records");
            return rebuild_from_records(store, collection, embedder, existing).await;
        }
    }

    let Some(source) = source_document else {
        store.create_or_load(collection, embedder.dimensions())?;
        tracing::info!(collection, "No source document configured; created empty collection");
        return Ok(BootstrapOutcome::CreatedEmpty);
    };

    tracing::info!(source = %source.display(), collection, "Building knowledge base from source document");
    let chunks = pipeline
        .prepare_document(source)
        .await
        .with_context(|| format!("failed to prepare {}", source.display()))?;

    load_chunks(store, collection, embedder, chunks, records).await
}

/// Embed existing chunk records and replace the collection with them.
pub async fn rebuild_from_records(
    store: &VectorStore,
    collection: &str,
    embedder: &dyn EmbeddingBackend,
    records: Vec<ChunkRecord>,
) -> Result<BootstrapOutcome> {
    let ids = records
        .iter()
        .map(|r| PointId::try_from(r.id).with_context(|| format!("negative chunk id {}", r.id)))
        .collect::<Result<Vec<_>>>()?;
    let chunks: Vec<PreparedChunk> = records
        .into_iter()
        .map(|r| PreparedChunk {
            keywords: r.keyword_list(),
            text: r.text,
        })
        .collect();

    let points = store_points(store, collection, embedder, chunks, ids).await?;
    Ok(BootstrapOutcome::Rebuilt { points })
}

/// Embed prepared chunks and replace the collection with them.
pub async fn load_chunks(
    store: &VectorStore,
    collection: &str,
    embedder: &dyn EmbeddingBackend,
    chunks: Vec<PreparedChunk>,
    records: Option<&ChunkRepository>,
) -> Result<BootstrapOutcome> {
    if chunks.is_empty() {
        tracing::warn!(collection, "Source document produced no chunks; created empty collection");
        store.create_or_load(collection, embedder.dimensions())?;
        return Ok(BootstrapOutcome::CreatedEmpty);
    }

    let (ids, record_ids) = match records {
        Some(repo) => {
            let new_chunks: Vec<NewChunk> = chunks.iter().cloned().map(NewChunk::from).collect();
            let inserted = repo.insert_unpublished(&new_chunks).await?;
            let ids = inserted
                .iter()
                .map(|r| PointId::try_from(r.id).with_context(|| format!("negative chunk id {}", r.id)))
                .collect::<Result<Vec<_>>>()?;
            (ids, true)
        }
        None => {
            tracing::warn!(
                "No database configured; bulk-loaded points get sequential ids that no chunk record shares"
            );
            ((1..=chunks.len() as PointId).collect(), false)
        }
    };

    let points = store_points(store, collection, embedder, chunks, ids).await?;
    Ok(BootstrapOutcome::BulkLoaded { points, record_ids })
}

async fn store_points(
    store: &VectorStore,
    collection: &str,
    embedder: &dyn EmbeddingBackend,
    chunks: Vec<PreparedChunk>,
    ids: Vec<PointId>,
) -> Result<usize> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await?;
    anyhow::ensure!(
        vectors.len() == chunks.len(),
        "embedder returned {} vectors for {} chunks",
        vectors.len(),
        chunks.len()
    );

    let points: Vec<VectorPoint> = chunks
        .into_iter()
        .zip(vectors)
        .zip(ids)
        .map(|((chunk, vector), id)| VectorPoint {
            id,
            vector,
            payload: ChunkPayload {
                text: chunk.text,
                keywords: chunk.keywords,
            },
        })
        .collect();

    Ok(store.bulk_load(collection, embedder.dimensions(), points)?)
}
