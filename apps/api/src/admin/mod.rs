pub mod handlers;

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use tracing::warn;

use crate::db::ping;
use crate::errors::AppError;
use crate::rules::store::{rule_stats, RuleStats};
use crate::state::AppState;

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

#[derive(Debug, Serialize, FromRow)]
pub struct InterviewCounts {
    pub total_interviews: i64,
    pub completed_interviews: i64,
    pub total_documents: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    #[serde(flatten)]
    pub interviews: InterviewCounts,
    pub rules: RuleStats,
}

#[derive(Debug, Serialize)]
pub struct VectorStoreStatus {
    pub backend: &'static str,
    pub healthy: bool,
}

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub database: bool,
    pub redis: bool,
    pub vector_store: VectorStoreStatus,
    pub jira_enabled: bool,
}

/// Listing limit clamped to `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

pub async fn stats(db: &PgPool) -> Result<DashboardStats, AppError> {
    let interviews = sqlx::query_as::<_, InterviewCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM interview_sessions) AS total_interviews,
            (SELECT COUNT(*) FROM interview_sessions WHERE is_complete) AS completed_interviews,
            (SELECT COUNT(*) FROM documents) AS total_documents
        "#,
    )
    .fetch_one(db)
    .await?;

    Ok(DashboardStats {
        interviews,
        rules: rule_stats(db).await?,
    })
}

async fn redis_ping(state: &AppState) -> bool {
    let result = async {
        let mut conn = state.redis.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await
    }
    .await;
    match result {
        Ok(_) => true,
        Err(e) => {
            warn!("Redis ping failed: {}", e);
            false
        }
    }
}

pub async fn backend_status(state: &AppState) -> BackendStatus {
    let (database, redis, vectors) = tokio::join!(
        ping(&state.db),
        redis_ping(state),
        state.vector_store.health()
    );
    BackendStatus {
        database,
        redis,
        vector_store: VectorStoreStatus {
            backend: state.vector_store.name(),
            healthy: vectors,
        },
        jira_enabled: state.jira.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(5_000)), MAX_LIST_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-3)), 1);
    }

    #[test]
    fn test_dashboard_stats_flattens_counts() {
        let stats = DashboardStats {
            interviews: InterviewCounts {
                total_interviews: 4,
                completed_interviews: 2,
                total_documents: 7,
            },
            rules: RuleStats {
                total: 3,
                pending: 1,
                approved: 1,
                rejected: 1,
            },
        };
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["total_interviews"], 4);
        assert_eq!(value["rules"]["approved"], 1);
    }
}
