mod admin;
mod auth;
mod config;
mod db;
mod documents;
mod errors;
mod interview;
mod jira;
mod llm_client;
mod models;
mod routes;
mod rules;
mod state;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::ensure_bootstrap_admin;
use crate::config::{Config, VectorBackend};
use crate::db::create_pool;
use crate::documents::chroma::ChromaStore;
use crate::documents::vector_store::{PgVectorStore, VectorStore};
use crate::jira::JiraClient;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Interview API v{} ({})",
        env!("CARGO_PKG_VERSION"),
        config.environment
    );

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.vector_backend).await?;

    if let Some(admin) = &config.bootstrap_admin {
        ensure_bootstrap_admin(&db, admin)
            .await
            .map_err(|e| anyhow::anyhow!("Bootstrap admin setup failed: {e}"))?;
    }

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize LLM client
    let llm = LlmClient::new(config.openai_api_key.clone())?;
    info!("LLM client initialized (embeddings: {})", llm_client::EMBEDDING_MODEL);

    // Initialize vector store
    let vector_store: Arc<dyn VectorStore> = match config.vector_backend {
        VectorBackend::PgVector => Arc::new(PgVectorStore::new(db.clone())),
        VectorBackend::Chroma => {
            let chroma = config
                .chroma
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Chroma backend selected without CHROMA_URL"))?;
            Arc::new(ChromaStore::new(chroma)?)
        }
    };
    info!("Vector store: {}", vector_store.name());

    let jira = JiraClient::from_config(config.jira.as_ref())?;
    if jira.is_some() {
        info!("Jira integration enabled");
    }

    // Build app state
    let state = AppState {
        db,
        redis,
        s3,
        llm,
        config: config.clone(),
        vector_store,
        jira,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "interview-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
