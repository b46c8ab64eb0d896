//! Vector store seam for document chunk embeddings.
//!
//! Implementations:
//! - `PgVectorStore`: `document_chunks` table with a pgvector column (default)
//! - `ChromaStore`: ChromaDB over its HTTP API

use async_trait::async_trait;
use pgvector::Vector;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::llm_client::EMBEDDING_DIMENSIONS;

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vector store API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("malformed vector store response: {0}")]
    Malformed(String),
}

/// A chunk with its embedding, ready to be stored.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub session_id: Uuid,
    pub title: String,
    pub doc_type: String,
    pub chunk_index: i32,
    pub content: String,
    pub page_number: Option<i32>,
    pub slide_number: Option<i32>,
    pub embedding: Vec<f32>,
}

/// A search hit. `similarity` is 1 - cosine distance.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChunkMatch {
    pub document_id: Uuid,
    pub title: String,
    pub content: String,
    pub chunk_index: i32,
    pub page_number: Option<i32>,
    pub slide_number: Option<i32>,
    pub similarity: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub total_chunks: i64,
    pub document_count: i64,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Stores chunks; returns how many were written.
    async fn add_chunks(&self, chunks: &[ChunkRecord]) -> Result<usize, VectorStoreError>;

    /// Nearest chunks within one session, best match first.
    async fn search(
        &self,
        session_id: Uuid,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ChunkMatch>, VectorStoreError>;

    async fn session_stats(&self, session_id: Uuid) -> Result<SessionStats, VectorStoreError>;

    /// Removes every chunk of a session; returns how many were deleted.
    async fn delete_session(&self, session_id: Uuid) -> Result<usize, VectorStoreError>;

    /// Removes the chunks of one document.
    async fn delete_document(&self, document_id: Uuid) -> Result<usize, VectorStoreError>;

    async fn health(&self) -> bool;

    fn name(&self) -> &'static str;
}

pub fn check_dimensions(embedding: &[f32]) -> Result<(), VectorStoreError> {
    if embedding.len() != EMBEDDING_DIMENSIONS {
        return Err(VectorStoreError::Dimension {
            expected: EMBEDDING_DIMENSIONS,
            actual: embedding.len(),
        });
    }
    Ok(())
}

/// Postgres + pgvector. Chunks live next to their `documents` row and cascade with it.
#[derive(Clone)]
pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct StatsRow {
    total_chunks: i64,
    document_count: i64,
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn add_chunks(&self, chunks: &[ChunkRecord]) -> Result<usize, VectorStoreError> {
        for chunk in chunks {
            check_dimensions(&chunk.embedding)?;
        }

        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO document_chunks
                    (id, document_id, session_id, chunk_index, content, page_number, slide_number, embedding)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(chunk.id)
            .bind(chunk.document_id)
            .bind(chunk.session_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.page_number)
            .bind(chunk.slide_number)
            .bind(Vector::from(chunk.embedding.clone()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(chunks.len())
    }

    async fn search(
        &self,
        session_id: Uuid,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ChunkMatch>, VectorStoreError> {
        check_dimensions(embedding)?;

        let matches = sqlx::query_as::<_, ChunkMatch>(
            r#"
            SELECT c.document_id, d.title, c.content, c.chunk_index, c.page_number, c.slide_number,
                   (1 - (c.embedding <=> $2))::real AS similarity
            FROM document_chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE c.session_id = $1
            ORDER BY c.embedding <=> $2
            LIMIT $3
            "#,
        )
        .bind(session_id)
        .bind(Vector::from(embedding.to_vec()))
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(matches)
    }

    async fn session_stats(&self, session_id: Uuid) -> Result<SessionStats, VectorStoreError> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT COUNT(*) AS total_chunks, COUNT(DISTINCT document_id) AS document_count
            FROM document_chunks
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SessionStats {
            total_chunks: row.total_chunks,
            document_count: row.document_count,
        })
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<usize, VectorStoreError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<usize, VectorStoreError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn health(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1 FROM pg_extension WHERE extname = 'vector'")
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.is_some())
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "pgvector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dimensions() {
        assert!(check_dimensions(&vec![0.0; EMBEDDING_DIMENSIONS]).is_ok());
        match check_dimensions(&[0.1, 0.2]) {
            Err(VectorStoreError::Dimension { expected, actual }) => {
                assert_eq!(expected, 1536);
                assert_eq!(actual, 2);
            }
            other => panic!("expected Dimension error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pgvector_rejects_wrong_dimension_before_touching_db() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let store = PgVectorStore::new(pool);
        let err = store.search(Uuid::new_v4(), &[1.0, 0.0], 3).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::Dimension { .. }));
        assert_eq!(store.name(), "pgvector");
    }
}
