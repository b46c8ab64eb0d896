use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The coaching agent an interview collects rules for.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CompanionRow {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
