use anyhow::{bail, Context, Result};

const DEV_JWT_SECRET: &str = "dev-insecure-jwt";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Which vector store backs document chunk search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    PgVector,
    Chroma,
}

impl VectorBackend {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pgvector" | "postgres" => Ok(VectorBackend::PgVector),
            "chroma" | "chromadb" => Ok(VectorBackend::Chroma),
            other => bail!("VECTOR_BACKEND must be 'pgvector' or 'chroma', got '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChromaConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub tenant: String,
    pub database: String,
    pub collection: String,
}

#[derive(Debug, Clone)]
pub struct JiraConfig {
    pub domain: String,
    pub email: String,
    pub api_token: String,
    pub project_key: String,
}

/// Admin account created at startup when `ADMIN_EMAIL` and `ADMIN_PASSWORD` are set.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub openai_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub environment: String,
    pub jwt_secret: String,
    pub token_expiry_hours: i64,
    pub vector_backend: VectorBackend,
    pub chroma: Option<ChromaConfig>,
    pub jira: Option<JiraConfig>,
    pub max_upload_bytes: usize,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let environment = optional_env("ENV").unwrap_or_else(|| "development".to_string());
        let jwt_secret = resolve_jwt_secret(&environment, optional_env("JWT_SECRET_KEY"))?;

        let vector_backend = match optional_env("VECTOR_BACKEND") {
            Some(raw) => VectorBackend::parse(&raw)?,
            None => VectorBackend::PgVector,
        };
        let chroma = optional_env("CHROMA_URL").map(|url| ChromaConfig {
            url: url.trim_end_matches('/').to_string(),
            api_key: optional_env("CHROMA_API_KEY"),
            tenant: optional_env("CHROMA_TENANT").unwrap_or_else(|| "default_tenant".to_string()),
            database: optional_env("CHROMA_DATABASE")
                .unwrap_or_else(|| "default_database".to_string()),
            collection: optional_env("CHROMA_COLLECTION")
                .unwrap_or_else(|| "interview_documents".to_string()),
        });
        if vector_backend == VectorBackend::Chroma && chroma.is_none() {
            bail!("VECTOR_BACKEND=chroma requires CHROMA_URL to be set");
        }

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            openai_api_key: require_env("OPENAI_API_KEY")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            environment,
            jwt_secret,
            token_expiry_hours: std::env::var("TOKEN_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse::<i64>()
                .context("TOKEN_EXPIRY_HOURS must be an integer")?,
            vector_backend,
            chroma,
            jira: jira_from_env(),
            max_upload_bytes: match optional_env("MAX_UPLOAD_BYTES") {
                Some(raw) => raw
                    .parse::<usize>()
                    .context("MAX_UPLOAD_BYTES must be a byte count")?,
                None => DEFAULT_MAX_UPLOAD_BYTES,
            },
            bootstrap_admin: bootstrap_admin_from_env(),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn resolve_jwt_secret(environment: &str, configured: Option<String>) -> Result<String> {
    match configured {
        Some(secret) => Ok(secret),
        None if environment.eq_ignore_ascii_case("production") => {
            bail!("JWT_SECRET_KEY must be set in production")
        }
        None => Ok(DEV_JWT_SECRET.to_string()),
    }
}

/// Jira is enabled only when every credential is present.
fn jira_from_env() -> Option<JiraConfig> {
    Some(JiraConfig {
        domain: optional_env("JIRA_DOMAIN")?,
        email: optional_env("JIRA_EMAIL")?,
        api_token: optional_env("JIRA_API_TOKEN")?,
        project_key: optional_env("JIRA_PROJECT_KEY")?,
    })
}

fn bootstrap_admin_from_env() -> Option<BootstrapAdmin> {
    Some(BootstrapAdmin {
        email: optional_env("ADMIN_EMAIL")?,
        password: optional_env("ADMIN_PASSWORD")?,
        name: optional_env("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
    })
}
