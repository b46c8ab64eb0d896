use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::admin::{backend_status, clamp_limit, stats, BackendStatus, DashboardStats};
use crate::auth::extractors::AdminClaims;
use crate::errors::AppError;
use crate::interview::engine::{get_conversation, list_interviews, ConversationView};
use crate::models::interview::InterviewSummaryRow;
use crate::models::rule::RuleRow;
use crate::rules::processing::regenerate_rules;
use crate::rules::store::{list_rules, review_rule, rules_for_session, RuleFilter};
use crate::rules::RuleStatus;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub status: RuleStatus,
}

#[derive(Serialize)]
pub struct InterviewListResponse {
    pub interviews: Vec<InterviewSummaryRow>,
}

#[derive(Serialize)]
pub struct InterviewDetailResponse {
    pub interview: ConversationView,
    pub rules: Vec<RuleRow>,
}

#[derive(Serialize)]
pub struct RuleListResponse {
    pub rules: Vec<RuleRow>,
    pub count: usize,
}

/// GET /api/v1/admin/stats
pub async fn handle_stats(
    _admin: AdminClaims,
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, AppError> {
    Ok(Json(stats(&state.db).await?))
}

/// GET /api/v1/admin/interviews?limit=
pub async fn handle_list_interviews(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<InterviewListResponse>, AppError> {
    let interviews = list_interviews(&state.db, clamp_limit(params.limit)).await?;
    Ok(Json(InterviewListResponse { interviews }))
}

/// GET /api/v1/admin/interviews/:id
pub async fn handle_get_interview(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<InterviewDetailResponse>, AppError> {
    let interview = get_conversation(&state.db, session_id).await?;
    let rules = rules_for_session(&state.db, session_id).await?;
    Ok(Json(InterviewDetailResponse { interview, rules }))
}

/// POST /api/v1/admin/interviews/:id/rules/regenerate
pub async fn handle_regenerate_rules(
    AdminClaims(admin): AdminClaims,
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<RuleListResponse>, AppError> {
    tracing::info!("Admin {} regenerating rules for {}", admin.sub, session_id);
    let rules = regenerate_rules(&state, session_id).await?;
    let count = rules.len();
    Ok(Json(RuleListResponse { rules, count }))
}

/// GET /api/v1/admin/rules?status=&session_id=
pub async fn handle_list_rules(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Query(filter): Query<RuleFilter>,
) -> Result<Json<RuleListResponse>, AppError> {
    let rules = list_rules(&state.db, &filter).await?;
    let count = rules.len();
    Ok(Json(RuleListResponse { rules, count }))
}

/// PATCH /api/v1/admin/rules/:id
pub async fn handle_review_rule(
    AdminClaims(admin): AdminClaims,
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<RuleRow>, AppError> {
    let rule = review_rule(
        &state.db,
        state.jira.as_ref(),
        rule_id,
        req.status,
        &admin.email,
    )
    .await?;
    Ok(Json(rule))
}

/// GET /api/v1/admin/status
pub async fn handle_backend_status(
    _admin: AdminClaims,
    State(state): State<AppState>,
) -> Json<BackendStatus> {
    Json(backend_status(&state).await)
}
