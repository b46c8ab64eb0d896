use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tracing::{info, warn};
use uuid::Uuid;

use super::vector_store::{
    check_dimensions, ChunkMatch, ChunkRecord, SessionStats, VectorStore, VectorStoreError,
};
use crate::config::ChromaConfig;

const TOKEN_HEADER: &str = "x-chroma-token";

/// ChromaDB over the v2 HTTP API. The collection is resolved (get-or-create) on first use.
pub struct ChromaStore {
    client: Client,
    config: ChromaConfig,
    collection_id: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Map<String, Value>>>>,
}

impl ChromaStore {
    pub fn new(config: ChromaConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            config,
            collection_id: OnceCell::new(),
        })
    }

    fn database_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}",
            self.config.url, self.config.tenant, self.config.database
        )
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header(TOKEN_HEADER, key),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, VectorStoreError> {
        let response = self.authed(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn collection_id(&self) -> Result<&str, VectorStoreError> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let url = format!("{}/collections", self.database_url());
                let body = json!({
                    "name": self.config.collection,
                    "metadata": { "hnsw:space": "cosine" },
                    "get_or_create": true,
                });
                let collection: CollectionResponse =
                    self.send(self.client.post(url).json(&body)).await?;
                info!(
                    "Chroma collection '{}' resolved to {}",
                    self.config.collection, collection.id
                );
                Ok::<_, VectorStoreError>(collection.id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn collection_url(&self, action: &str) -> Result<String, VectorStoreError> {
        let id = self.collection_id().await?;
        Ok(format!("{}/collections/{}/{}", self.database_url(), id, action))
    }

    async fn entries_where(&self, filter: Value) -> Result<GetResponse, VectorStoreError> {
        let url = self.collection_url("get").await?;
        let body = json!({
            "where": filter,
            "include": ["metadatas"],
        });
        self.send(self.client.post(url).json(&body)).await
    }

    async fn session_entries(&self, session_id: Uuid) -> Result<GetResponse, VectorStoreError> {
        self.entries_where(session_filter(session_id)).await
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<usize, VectorStoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let url = self.collection_url("delete").await?;
        let body = json!({ "ids": ids });
        let _: Value = self.send(self.client.post(url).json(&body)).await?;
        Ok(ids.len())
    }
}

fn session_filter(session_id: Uuid) -> Value {
    json!({ "session_id": session_id.to_string() })
}

/// Matches the `document_id` written by [`chunk_metadata`].
pub fn document_filter(document_id: Uuid) -> Value {
    json!({ "document_id": document_id.to_string() })
}

/// Chunk id is `{session}_{document}_{index}` so re-adding a chunk is idempotent.
pub fn chunk_id(chunk: &ChunkRecord) -> String {
    format!("{}_{}_{}", chunk.session_id, chunk.document_id, chunk.chunk_index)
}

/// Chroma rejects null metadata values, so absent locations are omitted.
pub fn chunk_metadata(chunk: &ChunkRecord) -> Value {
    let mut meta = Map::new();
    meta.insert("session_id".into(), json!(chunk.session_id.to_string()));
    meta.insert("document_id".into(), json!(chunk.document_id.to_string()));
    meta.insert("title".into(), json!(chunk.title));
    meta.insert("doc_type".into(), json!(chunk.doc_type));
    meta.insert("chunk_index".into(), json!(chunk.chunk_index));
    if let Some(page) = chunk.page_number {
        meta.insert("page_number".into(), json!(page));
    }
    if let Some(slide) = chunk.slide_number {
        meta.insert("slide_number".into(), json!(slide));
    }
    Value::Object(meta)
}

fn meta_i32(meta: &Map<String, Value>, key: &str) -> Option<i32> {
    meta.get(key).and_then(Value::as_i64).map(|v| v as i32)
}

fn matches_from_query(response: QueryResponse) -> Result<Vec<ChunkMatch>, VectorStoreError> {
    let ids = response.ids.into_iter().next().unwrap_or_default();
    let documents = response
        .documents
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();
    let metadatas = response
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default();
    let distances = response
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();

    let mut matches = Vec::with_capacity(ids.len());
    for i in 0..ids.len() {
        let meta = metadatas
            .get(i)
            .cloned()
            .flatten()
            .ok_or_else(|| VectorStoreError::Malformed(format!("missing metadata for {}", ids[i])))?;
        let document_id = meta
            .get("document_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| VectorStoreError::Malformed(format!("bad document_id for {}", ids[i])))?;
        let distance = distances.get(i).copied().flatten().unwrap_or(1.0);

        matches.push(ChunkMatch {
            document_id,
            title: meta
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            content: documents.get(i).cloned().flatten().unwrap_or_default(),
            chunk_index: meta_i32(&meta, "chunk_index").unwrap_or(0),
            page_number: meta_i32(&meta, "page_number"),
            slide_number: meta_i32(&meta, "slide_number"),
            similarity: 1.0 - distance,
        });
    }
    Ok(matches)
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn add_chunks(&self, chunks: &[ChunkRecord]) -> Result<usize, VectorStoreError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        for chunk in chunks {
            check_dimensions(&chunk.embedding)?;
        }

        let url = self.collection_url("add").await?;
        let body = json!({
            "ids": chunks.iter().map(chunk_id).collect::<Vec<_>>(),
            "embeddings": chunks.iter().map(|c| &c.embedding).collect::<Vec<_>>(),
            "documents": chunks.iter().map(|c| &c.content).collect::<Vec<_>>(),
            "metadatas": chunks.iter().map(chunk_metadata).collect::<Vec<_>>(),
        });
        let _: Value = self.send(self.client.post(url).json(&body)).await?;
        Ok(chunks.len())
    }

    async fn search(
        &self,
        session_id: Uuid,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ChunkMatch>, VectorStoreError> {
        check_dimensions(embedding)?;

        let url = self.collection_url("query").await?;
        let body = json!({
            "query_embeddings": [embedding],
            "n_results": k,
            "where": { "session_id": session_id.to_string() },
            "include": ["documents", "metadatas", "distances"],
        });
        let response: QueryResponse = self.send(self.client.post(url).json(&body)).await?;
        matches_from_query(response)
    }

    async fn session_stats(&self, session_id: Uuid) -> Result<SessionStats, VectorStoreError> {
        let entries = self.session_entries(session_id).await?;
        let documents: HashSet<String> = entries
            .metadatas
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|m| m.get("document_id").and_then(Value::as_str).map(str::to_string))
            .collect();

        Ok(SessionStats {
            total_chunks: entries.ids.len() as i64,
            document_count: documents.len() as i64,
        })
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<usize, VectorStoreError> {
        let entries = self.session_entries(session_id).await?;
        self.delete_ids(&entries.ids).await
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<usize, VectorStoreError> {
        let entries = self.entries_where(document_filter(document_id)).await?;
        self.delete_ids(&entries.ids).await
    }

    async fn health(&self) -> bool {
        let url = format!("{}/api/v2/heartbeat", self.config.url);
        match self.authed(self.client.get(url)).send().await {
            Ok(r) if r.status().is_success() => true,
            Ok(r) => {
                warn!("Chroma heartbeat returned {}", r.status());
                false
            }
            Err(e) => {
                warn!("Chroma heartbeat failed: {e}");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "chroma"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(page: Option<i32>) -> ChunkRecord {
        ChunkRecord {
            id: Uuid::new_v4(),
            document_id: Uuid::nil(),
            session_id: Uuid::nil(),
            title: "plan.pdf".into(),
            doc_type: "pdf".into(),
            chunk_index: 3,
            content: "Use a calm voice".into(),
            page_number: page,
            slide_number: None,
            embedding: vec![],
        }
    }

    #[test]
    fn test_document_filter_matches_chunk_metadata() {
        let chunk = record(None);
        let metadata = chunk_metadata(&chunk);
        let filter = document_filter(chunk.document_id);
        assert_eq!(filter["document_id"], metadata["document_id"]);
    }

    #[test]
    fn test_chunk_id_format() {
        let nil = Uuid::nil();
        assert_eq!(chunk_id(&record(None)), format!("{nil}_{nil}_3"));
    }

    #[test]
    fn test_metadata_omits_missing_locations() {
        let meta = chunk_metadata(&record(None));
        assert!(meta.get("page_number").is_none());
        assert!(meta.get("slide_number").is_none());
        assert_eq!(meta["doc_type"], "pdf");

        let meta = chunk_metadata(&record(Some(4)));
        assert_eq!(meta["page_number"], 4);
    }

    #[test]
    fn test_query_response_maps_to_matches() {
        let doc_id = Uuid::new_v4();
        let raw = json!({
            "ids": [["a"]],
            "documents": [["Offer two choices"]],
            "metadatas": [[{"document_id": doc_id.to_string(), "title": "tips.txt", "chunk_index": 2, "slide_number": 5}]],
            "distances": [[0.25]]
        });
        let response: QueryResponse = serde_json::from_value(raw).unwrap();
        let matches = matches_from_query(response).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].document_id, doc_id);
        assert_eq!(matches[0].content, "Offer two choices");
        assert_eq!(matches[0].slide_number, Some(5));
        assert!((matches[0].similarity - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_query_response_without_metadata_is_malformed() {
        let raw = json!({ "ids": [["a"]], "metadatas": [[null]] });
        let response: QueryResponse = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            matches_from_query(response),
            Err(VectorStoreError::Malformed(_))
        ));
    }
}
