use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use super::extraction::{rule_key, rule_text, without_known};
use super::{ExtractedRule, RuleStatus};
use crate::errors::AppError;
use crate::jira::JiraClient;
use crate::models::interview::InterviewSessionRow;
use crate::models::rule::RuleRow;

/// Marks a rule whose Jira task is being created.
const JIRA_KEY_FILING: &str = "filing";

#[derive(Debug, Default, Deserialize)]
pub struct RuleFilter {
    pub status: Option<RuleStatus>,
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Default, Serialize, FromRow, PartialEq)]
pub struct RuleStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

/// `event|action` keys of stored rules, read from their trigger and action JSON.
pub fn stored_rule_keys(rows: &[(Value, Value)]) -> HashSet<String> {
    rows.iter()
        .filter_map(|(trigger, action)| {
            rule_key(
                trigger.get("event").and_then(Value::as_str),
                action.get("action").and_then(Value::as_str),
            )
        })
        .collect()
}

/// Swaps the session's pending rules for a fresh extraction and stamps
/// `rules_extracted_at`. Reviewed rules are kept, and new rules that repeat
/// one of them are dropped. Runs in one transaction.
pub async fn replace_session_rules(
    db: &PgPool,
    session: &InterviewSessionRow,
    rules: &[ExtractedRule],
) -> Result<Vec<RuleRow>, AppError> {
    let mut tx = db.begin().await?;

    let removed = sqlx::query("DELETE FROM interview_rules WHERE session_id = $1 AND status = $2")
        .bind(session.id)
        .bind(RuleStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let reviewed: Vec<(Value, Value)> =
        sqlx::query_as("SELECT trigger, action FROM interview_rules WHERE session_id = $1")
            .bind(session.id)
            .fetch_all(&mut *tx)
            .await?;
    let rules = without_known(rules.to_vec(), &stored_rule_keys(&reviewed));

    let mut stored = Vec::with_capacity(rules.len());
    for rule in &rules {
        let row = sqlx::query_as::<_, RuleRow>(
            r#"
            INSERT INTO interview_rules
                (id, session_id, expert_name, expertise_area, rule_text,
                 trigger, action, priority, category, source, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session.id)
        .bind(&session.expert_name)
        .bind(&session.expertise_area)
        .bind(rule_text(rule))
        .bind(Json(&rule.trigger))
        .bind(Json(&rule.action))
        .bind(rule.priority.as_str())
        .bind(&rule.category)
        .bind(rule.source.as_str())
        .bind(RuleStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;
        stored.push(row);
    }

    sqlx::query("UPDATE interview_sessions SET rules_extracted_at = NOW() WHERE id = $1")
        .bind(session.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(
        "Session {}: replaced {} pending rules with {}",
        session.id,
        removed,
        stored.len()
    );
    Ok(stored)
}

pub async fn list_rules(db: &PgPool, filter: &RuleFilter) -> Result<Vec<RuleRow>, AppError> {
    let rows = sqlx::query_as::<_, RuleRow>(
        r#"
        SELECT * FROM interview_rules
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::uuid IS NULL OR session_id = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.session_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn rules_for_session(db: &PgPool, session_id: Uuid) -> Result<Vec<RuleRow>, AppError> {
    list_rules(
        db,
        &RuleFilter {
            status: None,
            session_id: Some(session_id),
        },
    )
    .await
}

pub async fn count_session_rules(db: &PgPool, session_id: Uuid) -> Result<i64, AppError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM interview_rules WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(db)
            .await?;
    Ok(count)
}

pub async fn rule_stats(db: &PgPool) -> Result<RuleStats, AppError> {
    let stats = sqlx::query_as::<_, RuleStats>(
        r#"
        SELECT
            COUNT(*) AS total,
            COUNT(*) FILTER (WHERE status = 'pending') AS pending,
            COUNT(*) FILTER (WHERE status = 'approved') AS approved,
            COUNT(*) FILTER (WHERE status = 'rejected') AS rejected
        FROM interview_rules
        "#,
    )
    .fetch_one(db)
    .await?;
    Ok(stats)
}

/// Rules can only be moved to a final decision, never back to pending.
pub fn validate_review_status(status: RuleStatus) -> Result<(), AppError> {
    match status {
        RuleStatus::Approved | RuleStatus::Rejected => Ok(()),
        RuleStatus::Pending => Err(AppError::Validation(
            "A rule can only be approved or rejected".to_string(),
        )),
    }
}

/// Jira description carrying the rule's provenance.
pub fn jira_description(rule: &RuleRow) -> String {
    format!(
        "{}\n\nExpert: {}\nExpertise: {}\nCategory: {}\nPriority: {}\nSource: {}\nInterview: {}\nRule id: {}",
        rule.rule_text,
        rule.expert_name,
        rule.expertise_area,
        rule.category,
        rule.priority,
        rule.source,
        rule.session_id,
        rule.id
    )
}

/// Only an approved rule that has never been filed gets a Jira task.
pub fn needs_jira_task(status: RuleStatus, jira_issue_key: Option<&str>) -> bool {
    status == RuleStatus::Approved && jira_issue_key.is_none()
}

/// Records an admin decision. Approved rules are filed in Jira when it is
/// configured; a Jira failure is logged and the approval stands.
/// Concurrent approvals file at most one task: the key column is claimed first.
pub async fn review_rule(
    db: &PgPool,
    jira: Option<&JiraClient>,
    rule_id: Uuid,
    status: RuleStatus,
    reviewer: &str,
) -> Result<RuleRow, AppError> {
    validate_review_status(status)?;

    let rule = sqlx::query_as::<_, RuleRow>(
        r#"
        UPDATE interview_rules
        SET status = $2, reviewed_by = $3, reviewed_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(rule_id)
    .bind(status.as_str())
    .bind(reviewer)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Rule {rule_id} not found")))?;

    info!("Rule {} marked {} by {}", rule.id, status, reviewer);

    let Some(jira) = jira else {
        return Ok(rule);
    };
    if !needs_jira_task(status, rule.jira_issue_key.as_deref()) {
        return Ok(rule);
    }

    let claimed = sqlx::query_scalar::<_, Uuid>(
        "UPDATE interview_rules SET jira_issue_key = $2 WHERE id = $1 AND jira_issue_key IS NULL RETURNING id",
    )
    .bind(rule.id)
    .bind(JIRA_KEY_FILING)
    .fetch_optional(db)
    .await?;
    if claimed.is_none() {
        info!("Rule {} is already filed in Jira", rule.id);
        return Ok(rule);
    }

    let key = match jira.create_task(&rule.rule_text, &jira_description(&rule)).await {
        Ok(key) => Some(key),
        Err(e) => {
            warn!("Jira task for rule {} not created: {}", rule.id, e);
            None
        }
    };

    let updated = sqlx::query_as::<_, RuleRow>(
        "UPDATE interview_rules SET jira_issue_key = $3 WHERE id = $1 AND jira_issue_key = $2 RETURNING *",
    )
    .bind(rule.id)
    .bind(JIRA_KEY_FILING)
    .bind(key)
    .fetch_optional(db)
    .await?;
    Ok(updated.unwrap_or(rule))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::extraction::normalize_rule;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_pending_is_not_a_review_decision() {
        assert!(validate_review_status(RuleStatus::Approved).is_ok());
        assert!(validate_review_status(RuleStatus::Rejected).is_ok());
        assert!(matches!(
            validate_review_status(RuleStatus::Pending),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_jira_description_has_provenance() {
        let rule = RuleRow {
            id: Uuid::nil(),
            session_id: Uuid::nil(),
            expert_name: "Dr. Rivera".into(),
            expertise_area: "Child psychology".into(),
            rule_text: "If a child melts down, then stay calm.".into(),
            trigger: json!({"event": "a child melts down"}),
            action: json!({"action": "stay calm"}),
            priority: "high".into(),
            category: "crisis_management".into(),
            source: "document".into(),
            status: "approved".into(),
            reviewed_by: Some("admin@example.com".into()),
            reviewed_at: Some(Utc::now()),
            jira_issue_key: None,
            created_at: Utc::now(),
        };
        let description = jira_description(&rule);
        assert!(description.starts_with("If a child melts down, then stay calm."));
        assert!(description.contains("Expert: Dr. Rivera"));
        assert!(description.contains("Source: document"));
    }

    #[test]
    fn test_jira_task_only_for_unfiled_approvals() {
        assert!(needs_jira_task(RuleStatus::Approved, None));
        assert!(!needs_jira_task(RuleStatus::Approved, Some("ENG-12")));
        assert!(!needs_jira_task(RuleStatus::Approved, Some(JIRA_KEY_FILING)));
        assert!(!needs_jira_task(RuleStatus::Rejected, None));
    }

    #[test]
    fn test_stored_rule_keys_read_trigger_and_action() {
        let rows = vec![
            (json!({"event": "Child Refuses Homework"}), json!({"action": "Offer a break"})),
            (json!({"context": "only context"}), json!({"response": "only response"})),
        ];
        let keys = stored_rule_keys(&rows);
        assert_eq!(keys.len(), 1);
        assert!(keys.contains("child refuses homework|offer a break"));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_regeneration_keeps_reviewed_rules(db: PgPool) {
        let session_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO interview_sessions (id, companion_id, expert_name, expert_email)
            SELECT $1, id, 'Dr. Rivera', 'rivera@example.com' FROM companions WHERE slug = 'jamie'
            "#,
        )
        .bind(session_id)
        .execute(&db)
        .await
        .unwrap();
        let session = crate::interview::engine::load_session(&db, session_id)
            .await
            .unwrap();

        let homework = normalize_rule(&json!({
            "if": {"event": "child refuses homework"},
            "then": {"action": "offer a five minute break"}
        }))
        .unwrap();
        let bedtime = normalize_rule(&json!({
            "if": {"event": "child stalls at bedtime"},
            "then": {"action": "use a visual schedule"}
        }))
        .unwrap();

        let first = replace_session_rules(&db, &session, &[homework.clone(), bedtime.clone()])
            .await
            .unwrap();
        review_rule(&db, None, first[0].id, RuleStatus::Approved, "admin@example.com")
            .await
            .unwrap();

        let second = replace_session_rules(&db, &session, &[homework, bedtime]).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].trigger["event"], "child stalls at bedtime");

        let all = rules_for_session(&db, session_id).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|r| r.id == first[0].id && r.status == "approved"));
    }

    #[test]
    fn test_filter_from_query_string() {
        let filter: RuleFilter = serde_json::from_value(json!({"status": "approved"})).unwrap();
        assert_eq!(filter.status, Some(RuleStatus::Approved));
        assert!(filter.session_id.is_none());
    }
}
