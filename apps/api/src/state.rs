use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use redis::Client as RedisClient;
use sqlx::PgPool;

use crate::config::Config;
use crate::documents::vector_store::VectorStore;
use crate::jira::JiraClient;
use crate::llm_client::LlmClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Rule-extraction job status.
    pub redis: RedisClient,
    pub s3: S3Client,
    pub llm: LlmClient,
    pub config: Config,
    /// pgvector or Chroma, picked by `VECTOR_BACKEND`.
    pub vector_store: Arc<dyn VectorStore>,
    /// `None` when Jira is not configured.
    pub jira: Option<JiraClient>,
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Arc;

    use aws_sdk_s3::config::{BehaviorVersion, Region};
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use uuid::Uuid;

    use super::AppState;
    use crate::auth::tokens::{issue_token, TokenKind};
    use crate::config::{Config, VectorBackend};
    use crate::documents::vector_store::PgVectorStore;
    use crate::llm_client::LlmClient;

    pub const SECRET: &str = "router-test-secret";

    /// Backends point at a closed port, so any handler that reaches one fails fast.
    pub fn test_config() -> Config {
        Config {
            database_url: "postgres://127.0.0.1:1/interview_test".into(),
            redis_url: "redis://127.0.0.1:1/".into(),
            s3_bucket: "test-bucket".into(),
            s3_endpoint: "http://127.0.0.1:1".into(),
            aws_access_key_id: "test".into(),
            aws_secret_access_key: "test".into(),
            openai_api_key: "test".into(),
            port: 8080,
            rust_log: "info".into(),
            environment: "test".into(),
            jwt_secret: SECRET.into(),
            token_expiry_hours: 1,
            vector_backend: VectorBackend::PgVector,
            chroma: None,
            jira: None,
            max_upload_bytes: 1024,
            bootstrap_admin: None,
        }
    }

    pub fn state_with_pool(db: PgPool) -> AppState {
        let config = test_config();
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        AppState {
            redis: redis::Client::open(config.redis_url.as_str()).unwrap(),
            s3: aws_sdk_s3::Client::from_conf(s3_config),
            llm: LlmClient::new(config.openai_api_key.clone()).unwrap(),
            vector_store: Arc::new(PgVectorStore::new(db.clone())),
            jira: None,
            db,
            config,
        }
    }

    /// State whose backends are never contacted unless a handler reaches them.
    pub fn test_state() -> AppState {
        let db = PgPoolOptions::new()
            .connect_lazy(&test_config().database_url)
            .unwrap();
        state_with_pool(db)
    }

    pub fn bearer_for(kind: TokenKind, subject: Uuid) -> String {
        let token = issue_token(SECRET, subject, "a@example.com", "A", kind, 1).unwrap();
        format!("Bearer {token}")
    }
}
