pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};

use crate::admin::handlers as admin;
use crate::auth::handlers as auth;
use crate::documents::handlers as documents;
use crate::interview::handlers as interview;
use crate::rules::handlers as rules;
use crate::state::AppState;

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/companions", get(interview::handle_list_companions))
        // Accounts
        .route("/api/v1/auth/register", post(auth::handle_register))
        .route("/api/v1/auth/login", post(auth::handle_user_login))
        .route("/api/v1/admin/login", post(auth::handle_admin_login))
        // Interviews
        .route("/api/v1/interviews", post(interview::handle_start_interview))
        .route("/api/v1/interviews/:id", get(interview::handle_get_interview))
        .route("/api/v1/interviews/:id/messages", post(interview::handle_chat))
        .route("/api/v1/interviews/:id/submit", post(rules::handle_submit_interview))
        .route("/api/v1/interviews/:id/rules/status", get(rules::handle_rules_status))
        .route("/api/v1/me/interviews", get(interview::handle_my_interviews))
        // Documents
        .route(
            "/api/v1/interviews/:id/documents",
            post(documents::handle_upload_document)
                .get(documents::handle_list_documents)
                .delete(documents::handle_delete_documents),
        )
        .route(
            "/api/v1/interviews/:id/documents/search",
            post(documents::handle_search_documents),
        )
        // Admin
        .route("/api/v1/admin/stats", get(admin::handle_stats))
        .route("/api/v1/admin/status", get(admin::handle_backend_status))
        .route("/api/v1/admin/interviews", get(admin::handle_list_interviews))
        .route("/api/v1/admin/interviews/:id", get(admin::handle_get_interview))
        .route(
            "/api/v1/admin/interviews/:id/rules/regenerate",
            post(admin::handle_regenerate_rules),
        )
        .route("/api/v1/admin/rules", get(admin::handle_list_rules))
        .route("/api/v1/admin/rules/:id", patch(admin::handle_review_rule))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
