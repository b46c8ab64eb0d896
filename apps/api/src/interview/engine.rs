use serde::Serialize;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::classifier::{classify_message, is_affirmative, MessageKind};
use super::prompts::{
    build_system_prompt, canned_response, implementation_overview, introduction, COMPLETED_NOTICE,
    FINAL_NOTE,
};
use super::sanitize::tidy_reply;
use crate::documents::ingest::document_context_for;
use crate::errors::AppError;
use crate::llm_client::ChatOptions;
use crate::models::companion::CompanionRow;
use crate::models::interview::{ChatTurn, InterviewSessionRow, InterviewSummaryRow, Role};
use crate::state::AppState;

/// Scripted question count after which the interview closes itself.
pub const COMPLETION_QUESTION_COUNT: i32 = 23;
pub const DEFAULT_COMPANION_SLUG: &str = "jamie";
const CHAT_CONTEXT_CHUNKS: usize = 3;
const CHAT_CONTEXT_CHARS: usize = 4_000;

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";

/// Who is being interviewed. `user_id` is set when the expert is logged in.
#[derive(Debug, Clone)]
pub struct ExpertIdentity {
    pub name: String,
    pub email: String,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub session_id: Uuid,
    pub message: String,
    pub question_number: i32,
    pub companion: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TurnResponse {
    pub message: String,
    pub question_number: i32,
    pub is_complete: bool,
    pub final_note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationView {
    pub session_id: Uuid,
    pub user_id: Option<Uuid>,
    pub expert_name: String,
    pub expert_email: String,
    pub expertise_area: String,
    pub companion: String,
    pub messages: Vec<ChatTurn>,
    pub questions_asked: i32,
    pub is_complete: bool,
    pub status: String,
}

/// What a chat turn will do, decided before any I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnPlan {
    /// Session already finished; reply with the notice and persist nothing.
    AlreadyComplete,
    /// Opening small talk answered from a canned script.
    Canned(String),
    /// Expert agreed to continue; show the overview and the first question.
    Overview(String),
    /// Ask the interviewer model.
    AskModel,
}

pub fn plan_turn(session: &InterviewSessionRow, message: &str, companion: &str) -> TurnPlan {
    if session.is_complete {
        return TurnPlan::AlreadyComplete;
    }
    if session.questions_asked == 0 {
        let kind = classify_message(message, companion);
        if kind != MessageKind::None {
            if let Some(reply) = canned_response(kind, companion) {
                return TurnPlan::Canned(reply);
            }
        }
        if is_affirmative(message) {
            return TurnPlan::Overview(implementation_overview(companion));
        }
    }
    TurnPlan::AskModel
}

/// Question counter after a model reply, and whether the interview is now done.
pub fn advance_after_reply(questions_asked: i32, reply: &str) -> (i32, bool) {
    let next = if questions_asked > 0 {
        questions_asked + 1
    } else {
        questions_asked
    };
    let lowered = reply.to_lowercase();
    let complete = next >= COMPLETION_QUESTION_COUNT
        || lowered.contains("conclude")
        || lowered.contains("summary");
    (next, complete)
}

/// Assistant turns so far, oldest first.
pub fn asked_questions(conversation: &[ChatTurn]) -> Vec<String> {
    conversation
        .iter()
        .filter(|t| t.role == Role::Assistant)
        .map(|t| t.content.clone())
        .collect()
}

pub async fn resolve_companion(db: &PgPool, slug: Option<&str>) -> Result<CompanionRow, AppError> {
    let slug = slug
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_COMPANION_SLUG)
        .to_lowercase();

    sqlx::query_as::<_, CompanionRow>("SELECT * FROM companions WHERE slug = $1")
        .bind(&slug)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Companion '{slug}' not found")))
}

pub async fn companion_by_id(db: &PgPool, id: Uuid) -> Result<CompanionRow, AppError> {
    sqlx::query_as::<_, CompanionRow>("SELECT * FROM companions WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Companion {id} not found")))
}

pub async fn list_companions(db: &PgPool) -> Result<Vec<CompanionRow>, AppError> {
    Ok(
        sqlx::query_as::<_, CompanionRow>("SELECT * FROM companions ORDER BY name")
            .fetch_all(db)
            .await?,
    )
}

pub async fn load_session(db: &PgPool, session_id: Uuid) -> Result<InterviewSessionRow, AppError> {
    sqlx::query_as::<_, InterviewSessionRow>("SELECT * FROM interview_sessions WHERE id = $1")
        .bind(session_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interview session {session_id} not found")))
}

pub fn validate_identity(identity: &ExpertIdentity) -> Result<(), AppError> {
    if identity.name.trim().is_empty() {
        return Err(AppError::Validation("Expert name is required".to_string()));
    }
    if !identity.email.contains('@') {
        return Err(AppError::Validation("A valid expert email is required".to_string()));
    }
    Ok(())
}

/// Creates a session whose transcript starts with the canned introduction.
pub async fn start_interview(
    db: &PgPool,
    identity: ExpertIdentity,
    expertise_area: Option<String>,
    companion_slug: Option<&str>,
) -> Result<StartResponse, AppError> {
    validate_identity(&identity)?;
    let companion = resolve_companion(db, companion_slug).await?;

    let expertise_area = expertise_area
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| "General".to_string());

    let message = introduction(&companion.name);
    let conversation = vec![ChatTurn::assistant(message.clone())];
    let session_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO interview_sessions
            (id, user_id, companion_id, expert_name, expert_email, expertise_area, conversation, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(session_id)
    .bind(identity.user_id)
    .bind(companion.id)
    .bind(identity.name.trim())
    .bind(identity.email.trim().to_lowercase())
    .bind(&expertise_area)
    .bind(Json(&conversation))
    .bind(STATUS_IN_PROGRESS)
    .execute(db)
    .await?;

    info!(
        "Started interview {} with {} ({}) for {}",
        session_id, identity.name, expertise_area, companion.name
    );

    Ok(StartResponse {
        session_id,
        message,
        question_number: 0,
        companion: companion.name,
    })
}

/// Writes the transcript and counters if nobody else changed the session since it was read.
async fn persist_turn(
    db: &PgPool,
    session: &InterviewSessionRow,
    conversation: &[ChatTurn],
    questions_asked: i32,
    is_complete: bool,
) -> Result<(), AppError> {
    let status = if is_complete {
        STATUS_COMPLETED
    } else {
        STATUS_IN_PROGRESS
    };

    let result = sqlx::query(
        r#"
        UPDATE interview_sessions
        SET conversation = $2,
            questions_asked = $3,
            is_complete = $4,
            status = $5,
            completed_at = CASE WHEN $4 THEN COALESCE(completed_at, NOW()) ELSE completed_at END,
            revision = revision + 1,
            updated_at = NOW()
        WHERE id = $1 AND revision = $6
        "#,
    )
    .bind(session.id)
    .bind(Json(conversation))
    .bind(questions_asked)
    .bind(is_complete)
    .bind(status)
    .bind(session.revision)
    .execute(db)
    .await?;

    check_revision_write(result.rows_affected())
}

/// A revision-guarded update that matched no row lost the race to another writer.
fn check_revision_write(rows_affected: u64) -> Result<(), AppError> {
    if rows_affected == 0 {
        return Err(AppError::Conflict(
            "The interview was updated by another request; reload and retry".to_string(),
        ));
    }
    Ok(())
}

/// One expert message in, one interviewer message out.
pub async fn chat_turn(
    state: &AppState,
    session_id: Uuid,
    message: &str,
) -> Result<TurnResponse, AppError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("Message must not be empty".to_string()));
    }

    let session = load_session(&state.db, session_id).await?;
    let companion = companion_by_id(&state.db, session.companion_id).await?;
    let mut conversation = session.conversation.0.clone();

    let plan = plan_turn(&session, message, &companion.name);

    if plan == TurnPlan::AlreadyComplete {
        return Ok(TurnResponse {
            message: COMPLETED_NOTICE.to_string(),
            question_number: session.questions_asked + 1,
            is_complete: true,
            final_note: None,
        });
    }

    conversation.push(ChatTurn::user(message));

    let (reply, questions_asked, is_complete) = match plan {
        TurnPlan::Canned(reply) => (reply, 0, false),
        TurnPlan::Overview(reply) => (reply, 1, false),
        _ => {
            let reply = ask_interviewer(state, &session, &companion, &conversation).await?;
            let (next, complete) = advance_after_reply(session.questions_asked, &reply);
            (reply, next, complete)
        }
    };

    conversation.push(ChatTurn::assistant(reply.clone()));
    let final_note = if is_complete {
        conversation.push(ChatTurn::assistant(FINAL_NOTE));
        Some(FINAL_NOTE.to_string())
    } else {
        None
    };

    persist_turn(&state.db, &session, &conversation, questions_asked, is_complete).await?;

    if is_complete {
        info!("Interview {} completed after {} questions", session_id, questions_asked);
    }

    Ok(TurnResponse {
        message: reply,
        question_number: questions_asked + 1,
        is_complete,
        final_note,
    })
}

async fn ask_interviewer(
    state: &AppState,
    session: &InterviewSessionRow,
    companion: &CompanionRow,
    conversation: &[ChatTurn],
) -> Result<String, AppError> {
    let latest = conversation
        .last()
        .map(|t| t.content.as_str())
        .unwrap_or_default();

    let doc_context = match document_context_for(
        state,
        session.id,
        latest,
        CHAT_CONTEXT_CHUNKS,
        CHAT_CONTEXT_CHARS,
    )
    .await
    {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!("Document context unavailable for {}: {}", session.id, e);
            None
        }
    };

    let system = build_system_prompt(
        &companion.name,
        &asked_questions(conversation),
        doc_context.as_deref(),
    );

    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.push(ChatTurn::system(system));
    messages.extend_from_slice(conversation);

    let response = state.llm.chat(&messages, ChatOptions::INTERVIEW).await?;
    let raw = response.text().unwrap_or_default();
    let reply = tidy_reply(raw);
    if reply.trim().is_empty() {
        return Err(AppError::Llm("Interviewer returned an empty reply".to_string()));
    }
    Ok(reply)
}

pub async fn get_conversation(db: &PgPool, session_id: Uuid) -> Result<ConversationView, AppError> {
    let session = load_session(db, session_id).await?;
    let companion = companion_by_id(db, session.companion_id).await?;
    Ok(ConversationView {
        session_id: session.id,
        user_id: session.user_id,
        expert_name: session.expert_name,
        expert_email: session.expert_email,
        expertise_area: session.expertise_area,
        companion: companion.name,
        messages: session.conversation.0,
        questions_asked: session.questions_asked,
        is_complete: session.is_complete,
        status: session.status,
    })
}

const SUMMARY_COLUMNS: &str = "id, expert_name, expert_email, expertise_area, questions_asked, \
     is_complete, status, started_at, completed_at, rules_extracted_at";

pub async fn list_user_interviews(
    db: &PgPool,
    user_id: Uuid,
) -> Result<Vec<InterviewSummaryRow>, AppError> {
    let rows = sqlx::query_as::<_, InterviewSummaryRow>(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM interview_sessions WHERE user_id = $1 ORDER BY started_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn list_interviews(db: &PgPool, limit: i64) -> Result<Vec<InterviewSummaryRow>, AppError> {
    let rows = sqlx::query_as::<_, InterviewSummaryRow>(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM interview_sessions ORDER BY started_at DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_stale_revision_is_a_conflict() {
        assert!(check_revision_write(1).is_ok());
        assert!(matches!(check_revision_write(0), Err(AppError::Conflict(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_stale_writer_persists_nothing(db: PgPool) {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO interview_sessions (id, companion_id, expert_name, expert_email)
            SELECT $1, id, 'Dr. Rivera', 'rivera@example.com' FROM companions WHERE slug = 'jamie'
            "#,
        )
        .bind(id)
        .execute(&db)
        .await
        .unwrap();

        let first = load_session(&db, id).await.unwrap();
        let stale = first.clone();
        persist_turn(&db, &first, &[ChatTurn::user("first writer")], 1, false)
            .await
            .unwrap();

        let err = persist_turn(&db, &stale, &[ChatTurn::user("second writer")], 1, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stored = load_session(&db, id).await.unwrap();
        assert_eq!(stored.revision, first.revision + 1);
        assert_eq!(stored.conversation.0[0].content, "first writer");
    }

    fn session(questions_asked: i32, is_complete: bool) -> InterviewSessionRow {
        InterviewSessionRow {
            id: Uuid::new_v4(),
            user_id: None,
            companion_id: Uuid::new_v4(),
            expert_name: "Dr. Rivera".into(),
            expert_email: "rivera@example.com".into(),
            expertise_area: "Child psychology".into(),
            conversation: Json(vec![ChatTurn::assistant(introduction("Jamie"))]),
            questions_asked,
            is_complete,
            status: STATUS_IN_PROGRESS.into(),
            revision: 0,
            started_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
            rules_extracted_at: None,
        }
    }

    #[test]
    fn test_completed_session_short_circuits() {
        assert_eq!(
            plan_turn(&session(5, true), "hello", "Jamie"),
            TurnPlan::AlreadyComplete
        );
    }

    #[test]
    fn test_opening_smalltalk_is_canned() {
        match plan_turn(&session(0, false), "Hi!", "Jamie") {
            TurnPlan::Canned(reply) => assert!(reply.starts_with("Hi! I'm here to interview you")),
            other => panic!("expected canned reply, got {other:?}"),
        }
        assert!(matches!(
            plan_turn(&session(0, false), "who is timmy?", "Jamie"),
            TurnPlan::Canned(_)
        ));
    }

    #[test]
    fn test_opening_yes_shows_overview() {
        match plan_turn(&session(0, false), "Yes, go ahead", "Jamie") {
            TurnPlan::Overview(reply) => assert!(reply.contains("To start, could you describe")),
            other => panic!("expected overview, got {other:?}"),
        }
    }

    #[test]
    fn test_opening_other_text_asks_model() {
        assert_eq!(
            plan_turn(&session(0, false), "Tell me more about the zones", "Jamie"),
            TurnPlan::AskModel
        );
    }

    #[test]
    fn test_smalltalk_mid_interview_goes_to_model() {
        assert_eq!(plan_turn(&session(4, false), "hi again", "Jamie"), TurnPlan::AskModel);
        assert_eq!(plan_turn(&session(4, false), "yes", "Jamie"), TurnPlan::AskModel);
    }

    #[test]
    fn test_advance_only_after_first_question() {
        assert_eq!(advance_after_reply(0, "Could you describe your expertise?"), (0, false));
        assert_eq!(advance_after_reply(1, "Noted. What principles guide you?"), (2, false));
    }

    #[test]
    fn test_completion_on_question_count() {
        assert_eq!(advance_after_reply(22, "Noted. Any red flags?"), (23, true));
        assert_eq!(advance_after_reply(21, "Noted. Any red flags?"), (22, false));
    }

    #[test]
    fn test_completion_on_keywords() {
        assert!(advance_after_reply(3, "Let me Conclude with one thought.").1);
        assert!(advance_after_reply(3, "Here is a SUMMARY of what we covered.").1);
    }

    #[test]
    fn test_asked_questions_only_assistant_turns() {
        let turns = vec![
            ChatTurn::assistant("Q1?"),
            ChatTurn::user("A1"),
            ChatTurn::assistant("Q2?"),
        ];
        assert_eq!(asked_questions(&turns), vec!["Q1?".to_string(), "Q2?".to_string()]);
    }

    #[test]
    fn test_validate_identity() {
        let ok = ExpertIdentity {
            name: "Sam".into(),
            email: "sam@example.com".into(),
            user_id: None,
        };
        assert!(validate_identity(&ok).is_ok());
        let no_at = ExpertIdentity {
            email: "sam.example.com".into(),
            ..ok.clone()
        };
        assert!(validate_identity(&no_at).is_err());
        let blank = ExpertIdentity {
            name: "  ".into(),
            ..ok
        };
        assert!(validate_identity(&blank).is_err());
    }
}
