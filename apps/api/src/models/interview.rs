use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of an interview transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InterviewSessionRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub companion_id: Uuid,
    pub expert_name: String,
    pub expert_email: String,
    pub expertise_area: String,
    pub conversation: Json<Vec<ChatTurn>>,
    pub questions_asked: i32,
    pub is_complete: bool,
    pub status: String,
    pub revision: i32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rules_extracted_at: Option<DateTime<Utc>>,
}

/// Listing view without the transcript.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InterviewSummaryRow {
    pub id: Uuid,
    pub expert_name: String,
    pub expert_email: String,
    pub expertise_area: String,
    pub questions_asked: i32,
    pub is_complete: bool,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rules_extracted_at: Option<DateTime<Utc>>,
}
