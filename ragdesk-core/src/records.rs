//! Authoritative chunk and upload records in PostgreSQL.
//!
//! Every chunk mutation publishes a [`ChunkEvent`] after the write commits.
//! Publishing is awaited but cannot fail the mutation.

use std::sync::Arc;

use sqlx::PgPool;

use crate::models::chunk::{ChunkRecord, NewChunk};
use crate::models::document::UploadedDocument;
use crate::sync_bridge::{ChunkEvent, SyncPublisher};

const CHUNK_COLUMNS: &str = "id, text, keywords, created_at, updated_at";
const DOCUMENT_COLUMNS: &str = "id, filename, file_path, uploaded_at, chunk_count";

/// Paging and filtering for chunk listings.
#[derive(Debug, Clone, Default)]
pub struct ChunkQuery {
    pub limit: i64,
    pub offset: i64,
    /// Case-insensitive substring match on text or keywords.
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct ChunkRepository {
    pool: PgPool,
    publisher: Arc<dyn SyncPublisher>,
}

impl ChunkRepository {
    pub fn new(pool: PgPool, publisher: Arc<dyn SyncPublisher>) -> Self {
        Self { pool, publisher }
    }

    pub async fn create(&self, chunk: &NewChunk) -> Result<ChunkRecord, sqlx::Error> {
        let sql = format!("INSERT INTO chunks (text, keywords) VALUES ($1, $2) RETURNING {CHUNK_COLUMNS}");
        let record: ChunkRecord = sqlx::query_as(&sql)
            .bind(&chunk.text)
            .bind(chunk.joined_keywords())
            .fetch_one(&self.pool)
            .await?;

        tracing::debug!(id = record.id, "Chunk record created");
        self.publisher.publish(ChunkEvent::Created(record.clone())).await;
        Ok(record)
    }

    /// Replace text and/or keywords. `None` leaves a field unchanged.
    /// Returns `None` if the record does not exist.
    pub async fn update(
        &self,
        id: i64,
        text: Option<&str>,
        keywords: Option<&[String]>,
    ) -> Result<Option<ChunkRecord>, sqlx::Error> {
        let joined = keywords.map(crate::models::chunk::join_keywords);
        let sql = format!(
            "UPDATE chunks \
             SET text = COALESCE($2, text), keywords = COALESCE($3, keywords), updated_at = now() \
             WHERE id = $1 RETURNING {CHUNK_COLUMNS}"
        );
        let record: Option<ChunkRecord> = sqlx::query_as(&sql)
            .bind(id)
            .bind(text)
            .bind(joined)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(record) = &record {
            tracing::debug!(id, "Chunk record updated");
            self.publisher.publish(ChunkEvent::Updated(record.clone())).await;
        }
        Ok(record)
    }

    /// Returns whether a record was removed.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let removed: Option<(i64,)> = sqlx::query_as("DELETE FROM chunks WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        if removed.is_some() {
            tracing::debug!(id, "Chunk record deleted");
            self.publisher.publish(ChunkEvent::Deleted { id }).await;
        }
        Ok(removed.is_some())
    }

    pub async fn get(&self, id: i64) -> Result<Option<ChunkRecord>, sqlx::Error> {
        let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = $1");
        sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await
    }

    /// Newest first.
    pub async fn list(&self, query: &ChunkQuery) -> Result<Vec<ChunkRecord>, sqlx::Error> {
        let pattern = query.search.as_ref().map(|s| format!("%{}%", escape_like(s)));
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks \
             WHERE $1::TEXT IS NULL OR text ILIKE $1 OR keywords ILIKE $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        sqlx::query_as(&sql)
            .bind(pattern)
            .bind(query.limit.max(0))
            .bind(query.offset.max(0))
            .fetch_all(&self.pool)
            .await
    }

    /// Every record in id order.
    pub async fn all(&self) -> Result<Vec<ChunkRecord>, sqlx::Error> {
        let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks ORDER BY id");
        sqlx::query_as(&sql).fetch_all(&self.pool).await
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks").fetch_one(&self.pool).await?;
        Ok(row.0)
    }

    /// Insert records in one transaction without publishing events.
    ///
    /// Used by the first-run bulk load, which writes the vectors itself.
    pub async fn insert_unpublished(&self, chunks: &[NewChunk]) -> Result<Vec<ChunkRecord>, sqlx::Error> {
        let sql = format!("INSERT INTO chunks (text, keywords) VALUES ($1, $2) RETURNING {CHUNK_COLUMNS}");
        let mut tx = self.pool.begin().await?;
        let mut records = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let record: ChunkRecord = sqlx::query_as(&sql)
                .bind(&chunk.text)
                .bind(chunk.joined_keywords())
                .fetch_one(&mut *tx)
                .await?;
            records.push(record);
        }
        tx.commit().await?;

        tracing::info!(count = records.len(), "Inserted chunk records without sync");
        Ok(records)
    }
}

#[derive(Clone)]
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        filename: &str,
        file_path: &str,
        chunk_count: i32,
    ) -> Result<UploadedDocument, sqlx::Error> {
        let sql = format!(
            "INSERT INTO uploaded_documents (filename, file_path, chunk_count) \
             VALUES ($1, $2, $3) RETURNING {DOCUMENT_COLUMNS}"
        );
        sqlx::query_as(&sql)
            .bind(filename)
            .bind(file_path)
            .bind(chunk_count)
            .fetch_one(&self.pool)
            .await
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<UploadedDocument>, sqlx::Error> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM uploaded_documents ORDER BY uploaded_at DESC, id DESC");
        sqlx::query_as(&sql).fetch_all(&self.pool).await
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("приём"), "приём");
    }
}
