use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub title: String,
    pub doc_type: String,
    pub storage_path: String,
    pub file_size: i64,
    pub content_hash: String,
    pub chunk_count: i32,
    pub created_at: DateTime<Utc>,
}
