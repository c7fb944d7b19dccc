use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use std::time::Duration;

use crate::settings::Database;

/// PostgreSQL connection pool type alias.
pub type DbPool = Pool<Postgres>;

/// Database schema name
pub const SCHEMA: &str = "bns_index";

pub async fn connect(settings: &Database) -> Result<DbPool> {
    // Force UTF-8 client encoding FIRST to avoid Windows sqlx bug with non-ASCII error messages
    std::env::set_var("PGCLIENTENCODING", "UTF8");

    let database_url = settings
        .url
        .clone()
        .context("database.url or DATABASE_URL must be set")?;

    // Add retries with exponential backoff to survive DNS/startup races in Compose
    let mut last_err: Option<anyhow::Error> = None;
    let max_attempts: u32 = 10;
    for attempt in 1..=max_attempts {
        match PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&database_url)
            .await
        {
            Ok(pool) => {
                log::info!(
                    "✅ Successfully connected to database (attempt {}/{}).",
                    attempt,
                    max_attempts
                );
                if let Err(e) = initialize_database(&pool).await {
                    last_err = Some(e);
                } else {
                    return Ok(pool);
                }
            }
            Err(e) => {
                last_err = Some(e.into());
            }
        }
        // Backoff with cap
        let delay_ms = (1u64 << attempt.min(6)) * 200; // 400ms, 800ms, ... capped at ~12.8s
        log::warn!(
            "DB connect/init attempt {}/{} failed. Retrying in {} ms...",
            attempt,
            max_attempts,
            delay_ms
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Unknown DB connection error")))
}

/// Create the schema and the records collection if they are missing.
pub async fn initialize_database(pool: &DbPool) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
        .execute(&mut *tx)
        .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.records (
            name TEXT PRIMARY KEY,
            namespace TEXT NOT NULL,
            zonefile_hash TEXT,
            document JSONB NOT NULL,
            block_height BIGINT NOT NULL,
            indexed_at TIMESTAMPTZ NOT NULL
        )",
        SCHEMA
    ))
    .execute(&mut *tx)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS records_namespace_idx ON {}.records (namespace)",
        SCHEMA
    ))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
