use chrono::{DateTime, Utc};
use redis::Client as RedisClient;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::extraction::extract_rules;
use super::store::{count_session_rules, replace_session_rules};
use crate::errors::AppError;
use crate::interview::engine::{companion_by_id, load_session, STATUS_COMPLETED};
use crate::models::interview::InterviewSessionRow;
use crate::models::rule::RuleRow;
use crate::state::AppState;

/// How long a job status outlives the job, and the longest a job slot can be held.
const STATUS_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Processing,
    Completed,
    Failed,
    NotStarted,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Processing => "processing",
            ProcessingState::Completed => "completed",
            ProcessingState::Failed => "failed",
            ProcessingState::NotStarted => "not_started",
        }
    }

    fn from_redis(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(ProcessingState::Processing),
            "completed" => Some(ProcessingState::Completed),
            "failed" => Some(ProcessingState::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub session_id: Uuid,
    pub status: ProcessingState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessingStatus {
    pub session_id: Uuid,
    pub status: ProcessingState,
    pub rule_count: Option<i64>,
    pub rules_extracted_at: Option<DateTime<Utc>>,
}

pub fn status_key(session_id: Uuid) -> String {
    format!("rules:status:{session_id}")
}

/// Held for as long as one extraction job runs for the session.
pub fn job_key(session_id: Uuid) -> String {
    format!("rules:job:{session_id}")
}

/// `SET .. NX` answers `OK` only to the caller that created the key.
pub fn job_claimed(set_reply: Option<&str>) -> bool {
    set_reply == Some("OK")
}

/// A live job status wins; otherwise the session row tells whether rules exist.
pub fn resolve_state(
    job_status: Option<&str>,
    rules_extracted_at: Option<DateTime<Utc>>,
) -> ProcessingState {
    if let Some(state) = job_status.and_then(ProcessingState::from_redis) {
        return state;
    }
    if rules_extracted_at.is_some() {
        ProcessingState::Completed
    } else {
        ProcessingState::NotStarted
    }
}

async fn set_job_status(
    redis: &RedisClient,
    session_id: Uuid,
    state: ProcessingState,
) -> Result<(), AppError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    redis::cmd("SET")
        .arg(status_key(session_id))
        .arg(state.as_str())
        .arg("EX")
        .arg(STATUS_TTL_SECS)
        .query_async::<_, ()>(&mut conn)
        .await?;
    Ok(())
}

async fn get_job_status(redis: &RedisClient, session_id: Uuid) -> Result<Option<String>, AppError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let value = redis::cmd("GET")
        .arg(status_key(session_id))
        .query_async::<_, Option<String>>(&mut conn)
        .await?;
    Ok(value)
}

/// Takes the session's job slot; `false` when another job already holds it.
async fn claim_job(redis: &RedisClient, session_id: Uuid) -> Result<bool, AppError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let reply = redis::cmd("SET")
        .arg(job_key(session_id))
        .arg(ProcessingState::Processing.as_str())
        .arg("NX")
        .arg("EX")
        .arg(STATUS_TTL_SECS)
        .query_async::<_, Option<String>>(&mut conn)
        .await?;
    Ok(job_claimed(reply.as_deref()))
}

async fn release_job(redis: &RedisClient, session_id: Uuid) -> Result<(), AppError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    redis::cmd("DEL")
        .arg(job_key(session_id))
        .query_async::<_, ()>(&mut conn)
        .await?;
    Ok(())
}

/// Undoes a claim whose submit never reached the job.
async fn abandon_claim(redis: &RedisClient, session_id: Uuid) {
    let mut conn = match redis.get_multiplexed_async_connection().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Could not release job slot for {}: {}", session_id, e);
            return;
        }
    };
    if let Err(e) = redis::cmd("DEL")
        .arg(job_key(session_id))
        .arg(status_key(session_id))
        .query_async::<_, ()>(&mut conn)
        .await
    {
        warn!("Could not release job slot for {}: {}", session_id, e);
    }
}

async fn mark_complete(db: &PgPool, session_id: Uuid) -> Result<InterviewSessionRow, AppError> {
    sqlx::query_as::<_, InterviewSessionRow>(
        r#"
        UPDATE interview_sessions
        SET is_complete = TRUE,
            status = $2,
            completed_at = COALESCE(completed_at, NOW()),
            updated_at = NOW(),
            revision = revision + 1
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(session_id)
    .bind(STATUS_COMPLETED)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Interview {session_id} not found")))
}

async fn run_extraction(state: &AppState, session_id: Uuid) -> Result<Vec<RuleRow>, AppError> {
    let session = load_session(&state.db, session_id).await?;
    let companion = companion_by_id(&state.db, session.companion_id).await?;
    let rules = extract_rules(state, &session, &companion.name).await?;
    replace_session_rules(&state.db, &session, &rules).await
}

/// Closes the interview and extracts its rules in the background.
/// The job slot is claimed in Redis before the session is touched. A submit
/// while a job is already running does not start a second one.
pub async fn submit_interview(state: &AppState, session_id: Uuid) -> Result<SubmitResponse, AppError> {
    let claimed = claim_job(&state.redis, session_id).await?;
    if claimed {
        if let Err(e) = set_job_status(&state.redis, session_id, ProcessingState::Processing).await {
            abandon_claim(&state.redis, session_id).await;
            return Err(e);
        }
    }

    if let Err(e) = mark_complete(&state.db, session_id).await {
        if claimed {
            abandon_claim(&state.redis, session_id).await;
        }
        return Err(e);
    }

    if claimed {
        let state = state.clone();
        tokio::spawn(async move {
            let outcome = match run_extraction(&state, session_id).await {
                Ok(rules) => {
                    info!("Session {}: {} rules extracted", session_id, rules.len());
                    ProcessingState::Completed
                }
                Err(e) => {
                    error!("Rule extraction failed for session {}: {}", session_id, e);
                    ProcessingState::Failed
                }
            };
            if let Err(e) = set_job_status(&state.redis, session_id, outcome).await {
                warn!("Could not record job status for {}: {}", session_id, e);
            }
            if let Err(e) = release_job(&state.redis, session_id).await {
                warn!("Could not release job slot for {}: {}", session_id, e);
            }
        });
    } else {
        info!("Session {}: extraction already running", session_id);
    }

    Ok(SubmitResponse {
        session_id,
        status: ProcessingState::Processing,
        message: "Interview submitted. Rules are being extracted.".to_string(),
    })
}

pub async fn processing_status(
    state: &AppState,
    session_id: Uuid,
) -> Result<ProcessingStatus, AppError> {
    let session = load_session(&state.db, session_id).await?;

    let job_status = match get_job_status(&state.redis, session_id).await {
        Ok(status) => status,
        Err(e) => {
            warn!("Job status unavailable for {}: {}", session_id, e);
            None
        }
    };

    let status = resolve_state(job_status.as_deref(), session.rules_extracted_at);
    let rule_count = match session.rules_extracted_at {
        Some(_) => Some(count_session_rules(&state.db, session_id).await?),
        None => None,
    };

    Ok(ProcessingStatus {
        session_id,
        status,
        rule_count,
        rules_extracted_at: session.rules_extracted_at,
    })
}

/// Synchronous re-extraction for admins.
pub async fn regenerate_rules(state: &AppState, session_id: Uuid) -> Result<Vec<RuleRow>, AppError> {
    let rules = run_extraction(state, session_id).await?;
    info!("Session {}: regenerated {} rules", session_id, rules.len());
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;

    #[test]
    fn test_status_key() {
        let id = Uuid::nil();
        assert_eq!(
            status_key(id),
            "rules:status:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_only_the_first_submit_claims_the_job() {
        assert!(job_claimed(Some("OK")));
        // Redis answers nil to `SET .. NX` when the slot is already held.
        assert!(!job_claimed(None));
        assert_ne!(job_key(Uuid::nil()), status_key(Uuid::nil()));
    }

    #[tokio::test]
    async fn test_submit_fails_on_redis_before_closing_the_session() {
        let state = test_state();
        let err = submit_interview(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)), "got {err:?}");
    }

    #[test]
    fn test_resolve_state_prefers_job_status() {
        assert_eq!(resolve_state(Some("failed"), Some(Utc::now())), ProcessingState::Failed);
        assert_eq!(resolve_state(Some("processing"), None), ProcessingState::Processing);
    }

    #[test]
    fn test_resolve_state_falls_back_to_session() {
        assert_eq!(resolve_state(None, Some(Utc::now())), ProcessingState::Completed);
        assert_eq!(resolve_state(None, None), ProcessingState::NotStarted);
        assert_eq!(resolve_state(Some("garbage"), None), ProcessingState::NotStarted);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(ProcessingState::NotStarted).unwrap(),
            "not_started"
        );
    }
}
