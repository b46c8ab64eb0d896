use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Row shape shared by `app_users` and `admin_users`.
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Public view of an account; never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

impl From<&AccountRow> for AccountView {
    fn from(row: &AccountRow) -> Self {
        AccountView {
            id: row.id,
            email: row.email.clone(),
            name: row.name.clone(),
        }
    }
}
