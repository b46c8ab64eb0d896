use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RuleRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub expert_name: String,
    pub expertise_area: String,
    pub rule_text: String,
    pub trigger: Value,
    pub action: Value,
    pub priority: String,
    pub category: String,
    pub source: String,
    pub status: String,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub jira_issue_key: Option<String>,
    pub created_at: DateTime<Utc>,
}
