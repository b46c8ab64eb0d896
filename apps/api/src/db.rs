use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::VectorBackend;

/// Migration sets for a backend. Chunk storage and the `vector` extension are
/// only needed when pgvector holds the embeddings.
fn migrators(backend: VectorBackend) -> Vec<(&'static str, Migrator)> {
    let mut sets = vec![("core", sqlx::migrate!("./migrations"))];
    if backend == VectorBackend::PgVector {
        sets.push(("pgvector", sqlx::migrate!("./migrations_pgvector")));
    }
    // Both sets share one history table; each ignores the other's versions.
    for (_, migrator) in sets.iter_mut() {
        migrator.set_ignore_missing(true);
    }
    sets
}

/// Creates a PostgreSQL connection pool and applies pending migrations.
pub async fn create_pool(database_url: &str, backend: VectorBackend) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");

    for (name, migrator) in migrators(backend) {
        migrator
            .run(&pool)
            .await
            .with_context(|| format!("Failed to apply {name} database migrations"))?;
    }

    info!("Database migrations applied");
    Ok(pool)
}

/// Returns true when a trivial round-trip to Postgres succeeds.
pub async fn ping(pool: &PgPool) -> bool {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .is_ok()
}
