use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::extractors::UserClaims;
use crate::documents::ingest::{
    delete_session_documents, ingest_document, list_session_documents, search_session_chunks,
    DeleteSummary, IngestOutcome,
};
use crate::documents::vector_store::{ChunkMatch, SessionStats};
use crate::errors::AppError;
use crate::interview::access::authorize_session;
use crate::models::document::DocumentRow;
use crate::state::AppState;

const DEFAULT_SEARCH_RESULTS: usize = 5;
const MAX_SEARCH_RESULTS: usize = 20;

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentRow>,
    pub index: SessionStats,
    pub backend: &'static str,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub results: Vec<ChunkMatch>,
}

/// POST /api/v1/interviews/:id/documents
/// Multipart upload; the file is read from the `file` field.
pub async fn handle_upload_document(
    State(state): State<AppState>,
    user: Option<UserClaims>,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<IngestOutcome>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("The file field needs a filename".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;

        authorize_session(&state.db, session_id, user.as_ref()).await?;
        let outcome = ingest_document(&state, session_id, &filename, data).await?;
        let status = if outcome.duplicate {
            StatusCode::OK
        } else {
            StatusCode::CREATED
        };
        return Ok((status, Json(outcome)));
    }

    Err(AppError::Validation(
        "Multipart field 'file' is required".to_string(),
    ))
}

/// GET /api/v1/interviews/:id/documents
pub async fn handle_list_documents(
    State(state): State<AppState>,
    user: Option<UserClaims>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<DocumentListResponse>, AppError> {
    authorize_session(&state.db, session_id, user.as_ref()).await?;
    let documents = list_session_documents(&state, session_id).await?;
    let index = state.vector_store.session_stats(session_id).await?;
    Ok(Json(DocumentListResponse {
        documents,
        index,
        backend: state.vector_store.name(),
    }))
}

/// DELETE /api/v1/interviews/:id/documents
pub async fn handle_delete_documents(
    State(state): State<AppState>,
    user: Option<UserClaims>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<DeleteSummary>, AppError> {
    authorize_session(&state.db, session_id, user.as_ref()).await?;
    Ok(Json(delete_session_documents(&state, session_id).await?))
}

/// POST /api/v1/interviews/:id/documents/search
pub async fn handle_search_documents(
    State(state): State<AppState>,
    user: Option<UserClaims>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    authorize_session(&state.db, session_id, user.as_ref()).await?;
    let limit = req
        .limit
        .unwrap_or(DEFAULT_SEARCH_RESULTS)
        .clamp(1, MAX_SEARCH_RESULTS);
    let results = search_session_chunks(&state, session_id, &req.query, limit).await?;
    Ok(Json(SearchResponse { results }))
}
