use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance record for an uploaded source document. Never edited.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UploadedDocument {
    pub id: i64,
    pub filename: String,
    pub file_path: String,
    pub uploaded_at: DateTime<Utc>,
    pub chunk_count: i32,
}
