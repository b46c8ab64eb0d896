use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::extractors::UserClaims;
use crate::errors::AppError;
use crate::interview::access::{authorize_session, ensure_visible_to};
use crate::interview::engine::{
    chat_turn, get_conversation, list_companions, list_user_interviews, start_interview,
    ConversationView, ExpertIdentity, StartResponse, TurnResponse,
};
use crate::models::companion::CompanionRow;
use crate::models::interview::InterviewSummaryRow;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StartInterviewRequest {
    pub expert_name: Option<String>,
    pub expert_email: Option<String>,
    pub expertise_area: Option<String>,
    pub companion: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct InterviewListResponse {
    pub interviews: Vec<InterviewSummaryRow>,
}

#[derive(Serialize)]
pub struct CompanionListResponse {
    pub companions: Vec<CompanionRow>,
}

/// A logged-in expert's own profile wins over anything sent in the body.
fn identity_for(user: Option<&UserClaims>, req: &StartInterviewRequest) -> ExpertIdentity {
    match user {
        Some(UserClaims(claims)) => ExpertIdentity {
            name: claims.name.clone(),
            email: claims.email.clone(),
            user_id: Some(claims.sub),
        },
        None => ExpertIdentity {
            name: req.expert_name.clone().unwrap_or_default(),
            email: req.expert_email.clone().unwrap_or_default(),
            user_id: None,
        },
    }
}

/// GET /api/v1/companions
pub async fn handle_list_companions(
    State(state): State<AppState>,
) -> Result<Json<CompanionListResponse>, AppError> {
    let companions = list_companions(&state.db).await?;
    Ok(Json(CompanionListResponse { companions }))
}

/// POST /api/v1/interviews
pub async fn handle_start_interview(
    State(state): State<AppState>,
    user: Option<UserClaims>,
    Json(req): Json<StartInterviewRequest>,
) -> Result<(StatusCode, Json<StartResponse>), AppError> {
    let identity = identity_for(user.as_ref(), &req);
    let response = start_interview(
        &state.db,
        identity,
        req.expertise_area,
        req.companion.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/interviews/:id
pub async fn handle_get_interview(
    State(state): State<AppState>,
    user: Option<UserClaims>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ConversationView>, AppError> {
    let view = get_conversation(&state.db, session_id).await?;
    ensure_visible_to(view.user_id, user.as_ref())?;
    Ok(Json(view))
}

/// POST /api/v1/interviews/:id/messages
pub async fn handle_chat(
    State(state): State<AppState>,
    user: Option<UserClaims>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    authorize_session(&state.db, session_id, user.as_ref()).await?;
    Ok(Json(chat_turn(&state, session_id, &req.message).await?))
}

/// GET /api/v1/me/interviews
pub async fn handle_my_interviews(
    State(state): State<AppState>,
    UserClaims(claims): UserClaims,
) -> Result<Json<InterviewListResponse>, AppError> {
    let interviews = list_user_interviews(&state.db, claims.sub).await?;
    Ok(Json(InterviewListResponse { interviews }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::access::tests::user;

    fn request() -> StartInterviewRequest {
        StartInterviewRequest {
            expert_name: Some("Body Name".into()),
            expert_email: Some("body@example.com".into()),
            expertise_area: None,
            companion: None,
        }
    }

    #[test]
    fn test_identity_prefers_logged_in_user() {
        let id = Uuid::new_v4();
        let user = user(id);
        let identity = identity_for(Some(&user), &request());
        assert_eq!(identity.user_id, Some(id));
        assert_eq!(identity.email, "token@example.com");
    }

    #[test]
    fn test_identity_falls_back_to_body() {
        let identity = identity_for(None, &request());
        assert_eq!(identity.user_id, None);
        assert_eq!(identity.name, "Body Name");
    }
}
