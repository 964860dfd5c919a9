//! Sync bridge: propagates chunk record lifecycle events to the vector index
//! over HTTP.
//!
//! Each event is one independent POST with no retry. `send` reports the
//! outcome; `publish` logs it and never fails, so a record mutation is never
//! blocked or rolled back by a sync problem.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

use crate::config::SyncConfig;
use crate::models::chunk::ChunkRecord;
use crate::models::sync::{SyncChunkRequest, ACTION_ADD, ACTION_UPDATE};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sync target rejected {action} for chunk {id} ({code}): {body}")]
    Rejected {
        action: String,
        id: i64,
        code: u16,
        body: String,
    },

    #[error("Chunk id {0} cannot be used as a vector point id")]
    InvalidId(i64),
}

/// Lifecycle event of an authoritative chunk record.
#[derive(Debug, Clone)]
pub enum ChunkEvent {
    Created(ChunkRecord),
    Updated(ChunkRecord),
    Deleted { id: i64 },
}

impl ChunkEvent {
    pub fn id(&self) -> i64 {
        match self {
            ChunkEvent::Created(r) | ChunkEvent::Updated(r) => r.id,
            ChunkEvent::Deleted { id } => *id,
        }
    }

    pub fn to_request(&self) -> Result<SyncChunkRequest, SyncError> {
        let point_id = u64::try_from(self.id()).map_err(|_| SyncError::InvalidId(self.id()))?;
        Ok(match self {
            ChunkEvent::Created(r) => {
                SyncChunkRequest::upsert(ACTION_ADD, point_id, r.text.clone(), r.keyword_list())
            }
            ChunkEvent::Updated(r) => {
                SyncChunkRequest::upsert(ACTION_UPDATE, point_id, r.text.clone(), r.keyword_list())
            }
            ChunkEvent::Deleted { .. } => SyncChunkRequest::delete(point_id),
        })
    }
}

/// Receives chunk events after the record write has committed.
#[async_trait]
pub trait SyncPublisher: Send + Sync {
    /// Must not fail: failures are logged and swallowed.
    async fn publish(&self, event: ChunkEvent);
}

/// Publisher that drops every event. Used when no sync target is wanted.
#[derive(Debug, Default, Clone)]
pub struct NoopPublisher;

#[async_trait]
impl SyncPublisher for NoopPublisher {
    async fn publish(&self, event: ChunkEvent) {
        tracing::debug!(id = event.id(), "Sync disabled; event dropped");
    }
}

/// Posts events to the server's `/admin/sync_chunk` endpoint.
#[derive(Debug, Clone)]
pub struct HttpSyncBridge {
    client: Client,
    endpoint: String,
}

impl HttpSyncBridge {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one event and report the response status.
    pub async fn send(&self, event: &ChunkEvent) -> Result<StatusCode, SyncError> {
        let request = event.to_request()?;
        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Rejected {
                action: request.action,
                id: event.id(),
                code: status.as_u16(),
                body,
            });
        }
        Ok(status)
    }
}

#[async_trait]
impl SyncPublisher for HttpSyncBridge {
    async fn publish(&self, event: ChunkEvent) {
        match self.send(&event).await {
            Ok(status) => {
                tracing::info!(id = event.id(), status = status.as_u16(), "Chunk synced");
            }
            Err(e) => {
                tracing::warn!(id = event.id(), error = %e, "Chunk sync failed; vector index may diverge");
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
