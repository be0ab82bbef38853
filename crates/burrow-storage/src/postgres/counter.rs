use crate::postgres::{map_sqlx_error, PgExecutor};
use crate::repository::{CounterService, Tx};
use async_trait::async_trait;
use burrow_core::{Result, StorageError};
use sqlx::{PgPool, Row};
use std::sync::Arc;

/// Counter backed by the `url_counter` sequence.
///
/// Sequence values are not returned on rollback, so values consumed by an
/// aborted batch leave gaps. They are never reissued.
#[derive(Debug, Clone)]
pub struct PgCounter {
    executor: PgExecutor,
}

impl PgCounter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            executor: PgExecutor::Pool(pool),
        }
    }
}

#[async_trait]
impl CounterService for PgCounter {
    async fn next(&self) -> Result<u64> {
        let mut conn = self.executor.acquire().await?;

        let row = sqlx::query("SELECT nextval('url_counter') AS value")
            .fetch_one(conn.get()?)
            .await
            .map_err(map_sqlx_error)?;

        let value: i64 = row.try_get("value").map_err(map_sqlx_error)?;
        u64::try_from(value).map_err(|_| {
            StorageError::InvalidData(format!("sequence returned negative value {value}"))
        })
    }

    fn with_tx(self: Arc<Self>, tx: &Tx) -> Arc<dyn CounterService> {
        match tx.as_postgres() {
            Some(pg) => Arc::new(Self {
                executor: PgExecutor::Tx(pg.clone()),
            }),
            None => self,
        }
    }
}
