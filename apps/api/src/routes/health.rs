use axum::Json;
use serde_json::{json, Value};

/// GET /health
/// Liveness only; backend checks live under /api/v1/admin/status.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "interview-api"
    }))
}
