use aws_sdk_s3::primitives::ByteStream;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use super::chunker::{chunk_sections, TextChunk, DEFAULT_MAX_TOKENS};
use super::parser::parse_document;
use super::vector_store::{ChunkMatch, ChunkRecord};
use super::DocType;
use crate::errors::AppError;
use crate::models::document::DocumentRow;
use crate::state::AppState;

/// Texts per embeddings request.
pub const EMBED_BATCH_SIZE: usize = 64;

#[derive(Debug, Serialize)]
pub struct IngestOutcome {
    pub document: DocumentRow,
    pub duplicate: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteSummary {
    pub documents_deleted: u64,
    pub chunks_deleted: usize,
}

pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Drops any client-supplied directory components.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
        .to_string()
}

pub fn storage_key(session_id: Uuid, document_id: Uuid, filename: &str) -> String {
    format!("documents/{session_id}/{document_id}/{filename}")
}

/// An earlier upload of the same bytes answers the request on its own.
pub fn duplicate_outcome(existing: Option<DocumentRow>) -> Option<IngestOutcome> {
    existing.map(|document| IngestOutcome {
        document,
        duplicate: true,
    })
}

pub async fn ensure_session_exists(state: &AppState, session_id: Uuid) -> Result<(), AppError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM interview_sessions WHERE id = $1)",
    )
    .bind(session_id)
    .fetch_one(&state.db)
    .await?;

    if !exists {
        return Err(AppError::NotFound(format!("Interview session {session_id} not found")));
    }
    Ok(())
}

/// Stores, parses, chunks and embeds an uploaded file for one interview session.
///
/// Uploading identical bytes twice to the same session returns the existing
/// document with `duplicate: true`.
pub async fn ingest_document(
    state: &AppState,
    session_id: Uuid,
    filename: &str,
    data: bytes::Bytes,
) -> Result<IngestOutcome, AppError> {
    // 1. Validate the upload itself
    let filename = sanitize_filename(filename);
    if filename.is_empty() {
        return Err(AppError::Validation("A filename is required".to_string()));
    }
    if data.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    if data.len() > state.config.max_upload_bytes {
        return Err(AppError::Validation(format!(
            "File exceeds the {} byte upload limit",
            state.config.max_upload_bytes
        )));
    }
    let doc_type = DocType::from_filename(&filename)?;
    ensure_session_exists(state, session_id).await?;

    // 2. Deduplicate by content hash within the session
    let hash = content_hash(&data);
    let existing = sqlx::query_as::<_, DocumentRow>(
        "SELECT * FROM documents WHERE session_id = $1 AND content_hash = $2",
    )
    .bind(session_id)
    .bind(&hash)
    .fetch_optional(&state.db)
    .await?;

    if let Some(outcome) = duplicate_outcome(existing) {
        info!("Duplicate upload of {} for session {}", filename, session_id);
        return Ok(outcome);
    }

    // 3. Parse and chunk off the async runtime
    let parse_name = filename.clone();
    let parse_data = data.clone();
    let parsed = tokio::task::spawn_blocking(move || parse_document(&parse_name, &parse_data))
        .await
        .map_err(|e| anyhow::anyhow!("Document parser task failed: {e}"))??;
    let chunks = chunk_sections(&parsed.sections, DEFAULT_MAX_TOKENS);
    if chunks.is_empty() {
        return Err(AppError::UnprocessableEntity(format!(
            "No content extracted from {filename}"
        )));
    }

    // 4. Upload the original to S3
    let document_id = Uuid::new_v4();
    let key = storage_key(session_id, document_id, &filename);
    state
        .s3
        .put_object()
        .bucket(&state.config.s3_bucket)
        .key(&key)
        .body(ByteStream::from(data.to_vec()))
        .content_type(doc_type.content_type())
        .send()
        .await
        .map_err(|e| AppError::Storage(format!("S3 upload failed: {e}")))?;

    info!("Uploaded {} to s3://{}/{}", filename, state.config.s3_bucket, key);

    // 5. Record the document, then embed and index its chunks
    let result = index_document(
        state,
        session_id,
        document_id,
        &filename,
        doc_type,
        &key,
        data.len() as i64,
        &hash,
        &chunks,
    )
    .await;

    match result {
        Ok(document) => {
            info!(
                "Ingested {} for session {}: {} chunks via {}",
                filename,
                session_id,
                document.chunk_count,
                state.vector_store.name()
            );
            Ok(IngestOutcome {
                document,
                duplicate: false,
            })
        }
        Err(e) => {
            warn!("Ingest of {} failed, cleaning up: {}", filename, e);
            discard_document(state, document_id, &key).await;
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn index_document(
    state: &AppState,
    session_id: Uuid,
    document_id: Uuid,
    filename: &str,
    doc_type: DocType,
    key: &str,
    file_size: i64,
    hash: &str,
    chunks: &[TextChunk],
) -> Result<DocumentRow, AppError> {
    sqlx::query(
        r#"
        INSERT INTO documents (id, session_id, title, doc_type, storage_path, file_size, content_hash, chunk_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 0)
        "#,
    )
    .bind(document_id)
    .bind(session_id)
    .bind(filename)
    .bind(doc_type.as_str())
    .bind(key)
    .bind(file_size)
    .bind(hash)
    .execute(&state.db)
    .await?;

    let mut stored = 0usize;
    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embeddings = state.llm.embed(&texts).await?;

        let records: Vec<ChunkRecord> = batch
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| ChunkRecord {
                id: Uuid::new_v4(),
                document_id,
                session_id,
                title: filename.to_string(),
                doc_type: doc_type.as_str().to_string(),
                chunk_index: chunk.index,
                content: chunk.content.clone(),
                page_number: chunk.page_number,
                slide_number: chunk.slide_number,
                embedding,
            })
            .collect();

        stored += state.vector_store.add_chunks(&records).await?;
    }

    let document = sqlx::query_as::<_, DocumentRow>(
        "UPDATE documents SET chunk_count = $2 WHERE id = $1 RETURNING *",
    )
    .bind(document_id)
    .bind(stored as i32)
    .fetch_one(&state.db)
    .await?;

    Ok(document)
}

/// Best-effort removal of a half-ingested document.
async fn discard_document(state: &AppState, document_id: Uuid, key: &str) {
    if let Err(e) = state.vector_store.delete_document(document_id).await {
        warn!(
            "Failed to remove {} chunks of document {}: {}",
            state.vector_store.name(),
            document_id,
            e
        );
    }
    if let Err(e) = sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(document_id)
        .execute(&state.db)
        .await
    {
        warn!("Failed to remove document row {}: {}", document_id, e);
    }
    if let Err(e) = state
        .s3
        .delete_object()
        .bucket(&state.config.s3_bucket)
        .key(key)
        .send()
        .await
    {
        warn!("Failed to remove s3://{}/{}: {}", state.config.s3_bucket, key, e);
    }
}

pub async fn list_session_documents(
    state: &AppState,
    session_id: Uuid,
) -> Result<Vec<DocumentRow>, AppError> {
    let documents = sqlx::query_as::<_, DocumentRow>(
        "SELECT * FROM documents WHERE session_id = $1 ORDER BY created_at",
    )
    .bind(session_id)
    .fetch_all(&state.db)
    .await?;
    Ok(documents)
}

/// Removes vectors, S3 originals and document rows for a session.
pub async fn delete_session_documents(
    state: &AppState,
    session_id: Uuid,
) -> Result<DeleteSummary, AppError> {
    ensure_session_exists(state, session_id).await?;

    let chunks_deleted = state.vector_store.delete_session(session_id).await?;

    let documents = list_session_documents(state, session_id).await?;
    for document in &documents {
        if let Err(e) = state
            .s3
            .delete_object()
            .bucket(&state.config.s3_bucket)
            .key(&document.storage_path)
            .send()
            .await
        {
            warn!("Failed to remove s3://{}/{}: {}", state.config.s3_bucket, document.storage_path, e);
        }
    }

    let result = sqlx::query("DELETE FROM documents WHERE session_id = $1")
        .bind(session_id)
        .execute(&state.db)
        .await?;

    info!(
        "Deleted {} documents ({} chunks) for session {}",
        result.rows_affected(),
        chunks_deleted,
        session_id
    );

    Ok(DeleteSummary {
        documents_deleted: result.rows_affected(),
        chunks_deleted,
    })
}

async fn session_document_count(state: &AppState, session_id: Uuid) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents WHERE session_id = $1")
        .bind(session_id)
        .fetch_one(&state.db)
        .await?;
    Ok(count)
}

pub async fn search_session_chunks(
    state: &AppState,
    session_id: Uuid,
    query: &str,
    k: usize,
) -> Result<Vec<ChunkMatch>, AppError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::Validation("Search query must not be empty".to_string()));
    }
    let embedding = state.llm.embed_one(query).await?;
    Ok(state.vector_store.search(session_id, &embedding, k).await?)
}

/// Relevant chunks formatted for a prompt, or `None` when the session has no documents.
pub async fn document_context_for(
    state: &AppState,
    session_id: Uuid,
    query: &str,
    k: usize,
    max_chars: usize,
) -> Result<Option<String>, AppError> {
    if query.trim().is_empty() || session_document_count(state, session_id).await? == 0 {
        return Ok(None);
    }
    let matches = search_session_chunks(state, session_id, query, k).await?;
    Ok(format_document_context(&matches, max_chars))
}

pub fn format_document_context(matches: &[ChunkMatch], max_chars: usize) -> Option<String> {
    if matches.is_empty() {
        return None;
    }

    let mut out = String::from("RELEVANT DOCUMENT CONTEXT:");
    for m in matches {
        let location = match (m.page_number, m.slide_number) {
            (Some(page), _) => format!(", page {page}"),
            (None, Some(slide)) => format!(", slide {slide}"),
            (None, None) => String::new(),
        };
        let entry = format!("\n\n[Source: {}{}]\n{}", m.title, location, m.content.trim());
        if out.len() + entry.len() > max_chars {
            break;
        }
        out.push_str(&entry);
    }

    if out.len() == "RELEVANT DOCUMENT CONTEXT:".len() {
        return None;
    }
    Some(out)
}
