//! # Document Store
//!
//! Persistence sink for enriched records. A store hands out short-lived
//! collection handles; a handle is taken for one write and returned when it is
//! dropped, so it is never held across a queue wait.
//!
//! `PostgresStore` keeps one JSONB document per name in `bns_index.records`
//! and upserts on conflict, so re-crawling a namespace replaces documents
//! instead of duplicating them.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::types::Json;
use sqlx::Postgres;

use crate::database::{DbPool, SCHEMA};
use crate::error::StoreError;
use crate::record::RecordDocument;

/// Scoped access to the records collection.
#[async_trait]
pub trait CollectionHandle: Send {
    /// Insert the document, replacing any existing document with the same name.
    async fn upsert(&mut self, document: &RecordDocument) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn CollectionHandle>, StoreError>;
}

#[derive(Clone)]
pub struct PostgresStore {
    pool: DbPool,
}

impl PostgresStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn acquire(&self) -> Result<Box<dyn CollectionHandle>, StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Unavailable("connection pool is closed".to_string()));
        }
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PostgresCollection { conn }))
    }
}

/// Pooled connection; returned to the pool on drop.
struct PostgresCollection {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl CollectionHandle for PostgresCollection {
    async fn upsert(&mut self, document: &RecordDocument) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO {}.records (name, namespace, zonefile_hash, document, block_height, indexed_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (name) DO UPDATE SET
                namespace = EXCLUDED.namespace,
                zonefile_hash = EXCLUDED.zonefile_hash,
                document = EXCLUDED.document,
                block_height = EXCLUDED.block_height,
                indexed_at = EXCLUDED.indexed_at",
            SCHEMA
        ))
        .bind(&document.name)
        .bind(&document.namespace)
        .bind(&document.zonefile_hash)
        .bind(Json(document))
        .bind(document.block_height as i64)
        .bind(document.indexed_at)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::settings::Database;

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://indexer@localhost/bns")
            .unwrap();
        pool.close().await;
        let store = PostgresStore::new(pool);

        let err = store.acquire().await.err().unwrap();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    #[ignore] // Requires database connection
    async fn test_upsert_replaces_document() {
        // To run: DATABASE_URL=... cargo test store -- --ignored
        let settings = Database {
            url: std::env::var("DATABASE_URL").ok(),
            ..Database::default()
        };
        let pool = crate::database::connect(&settings)
            .await
            .expect("Failed to connect to database");
        let store = PostgresStore::new(pool.clone());

        let first = Record::new("upsert-test.id", "id").into_document(10);
        let second = Record::new("upsert-test.id", "id").into_document(11);
        {
            let mut handle = store.acquire().await.unwrap();
            handle.upsert(&first).await.unwrap();
            handle.upsert(&second).await.unwrap();
        }

        let height: i64 = sqlx::query_scalar(&format!(
            "SELECT block_height FROM {}.records WHERE name = $1",
            SCHEMA
        ))
        .bind("upsert-test.id")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(height, 11);
    }
}
