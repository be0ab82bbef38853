use crate::postgres::{map_sqlx_error, PgExecutor};
use crate::repository::{RecordStore, Tx};
use async_trait::async_trait;
use burrow_core::{Result, ShortCode, StorageError};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{debug, Span};

/// PostgreSQL implementation of the record store.
///
/// Saves use `INSERT .. ON CONFLICT DO NOTHING`, so the uniqueness check and
/// the write are one statement and a collision shows up as zero affected rows
/// instead of an aborted transaction.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    executor: PgExecutor,
    span: Span,
}

impl PgRecordStore {
    /// Creates a repository from an existing connection pool.
    pub fn new(pool: PgPool, span: Span) -> Self {
        Self {
            executor: PgExecutor::Pool(pool),
            span,
        }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn save(&self, code: &ShortCode, url: &str) -> Result<()> {
        let mut conn = self.executor.acquire().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO short_urls (hash, original)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(code.as_str())
        .bind(url)
        .execute(conn.get()?)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict(code.to_string()));
        }

        debug!(parent: &self.span, code = %code, "saved record");
        Ok(())
    }

    async fn get(&self, code: &ShortCode) -> Result<String> {
        let mut conn = self.executor.acquire().await?;

        let row = sqlx::query(
            r#"
            SELECT original
            FROM short_urls
            WHERE hash = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(conn.get()?)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(code.to_string()));
        };

        row.try_get("original").map_err(map_sqlx_error)
    }

    async fn get_by_original(&self, url: &str) -> Result<ShortCode> {
        let mut conn = self.executor.acquire().await?;

        let row = sqlx::query(
            r#"
            SELECT hash
            FROM short_urls
            WHERE original = $1
            ORDER BY hash
            LIMIT 1
            "#,
        )
        .bind(url)
        .fetch_optional(conn.get()?)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(url.to_owned()));
        };

        let hash: String = row.try_get("hash").map_err(map_sqlx_error)?;
        Ok(ShortCode::new_unchecked(hash))
    }

    fn with_tx(self: Arc<Self>, tx: &Tx) -> Arc<dyn RecordStore> {
        match tx.as_postgres() {
            Some(pg) => Arc::new(Self {
                executor: PgExecutor::Tx(pg.clone()),
                span: self.span.clone(),
            }),
            None => self,
        }
    }
}
