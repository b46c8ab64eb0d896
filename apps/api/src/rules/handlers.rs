use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::extractors::UserClaims;
use crate::errors::AppError;
use crate::interview::access::authorize_session;
use crate::rules::processing::{processing_status, submit_interview, ProcessingStatus, SubmitResponse};
use crate::state::AppState;

/// POST /api/v1/interviews/:id/submit
/// Returns 202 immediately; extraction continues in the background.
pub async fn handle_submit_interview(
    State(state): State<AppState>,
    user: Option<UserClaims>,
    Path(session_id): Path<Uuid>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    authorize_session(&state.db, session_id, user.as_ref()).await?;
    let response = submit_interview(&state, session_id).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /api/v1/interviews/:id/rules/status
pub async fn handle_rules_status(
    State(state): State<AppState>,
    user: Option<UserClaims>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ProcessingStatus>, AppError> {
    authorize_session(&state.db, session_id, user.as_ref()).await?;
    Ok(Json(processing_status(&state, session_id).await?))
}
