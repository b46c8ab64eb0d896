use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::auth::{admin_login, user_login, user_register, AuthResponse};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// POST /api/v1/auth/register
pub async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let response = user_register(&state.db, &state.config, &req.name, &req.email, &req.password).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/auth/login
pub async fn handle_user_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(
        user_login(&state.db, &state.config, &req.email, &req.password).await?,
    ))
}

/// POST /api/v1/admin/login
pub async fn handle_admin_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(
        admin_login(&state.db, &state.config, &req.email, &req.password).await?,
    ))
}
