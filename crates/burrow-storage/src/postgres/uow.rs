use crate::postgres::map_sqlx_error;
use crate::repository::{BatchAtomicity, Tx, UnitOfWork};
use async_trait::async_trait;
use burrow_core::{Result, StorageError};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, Span};

/// Shared handle to an open transaction.
///
/// Repository handles bound through `with_tx` hold clones of it. Commit and
/// rollback take the transaction out, after which every clone reports
/// `TransactionClosed`.
#[derive(Clone)]
pub(crate) struct PgTx {
    inner: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
}

impl PgTx {
    fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(tx))),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Option<Transaction<'static, Postgres>>> {
        self.inner.lock().await
    }

    async fn take(&self) -> Result<Transaction<'static, Postgres>> {
        self.inner
            .lock()
            .await
            .take()
            .ok_or(StorageError::TransactionClosed)
    }

    pub(crate) async fn commit(&self) -> Result<()> {
        self.take().await?.commit().await.map_err(map_sqlx_error)
    }

    pub(crate) async fn rollback(&self) -> Result<()> {
        self.take().await?.rollback().await.map_err(map_sqlx_error)
    }
}

impl std::fmt::Debug for PgTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTx").finish_non_exhaustive()
    }
}

/// Unit of work over native PostgreSQL transactions.
///
/// Each open [`Tx`] pins one pool connection until it is committed, rolled
/// back or dropped; dropping it without committing rolls back.
#[derive(Debug, Clone)]
pub struct PgUnitOfWork {
    pool: PgPool,
    span: Span,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool, span: Span) -> Self {
        Self { pool, span }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn begin(&self) -> Result<Tx> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        debug!(parent: &self.span, "transaction started");
        Ok(Tx::postgres(PgTx::new(tx)))
    }

    fn atomicity(&self) -> BatchAtomicity {
        BatchAtomicity::Atomic
    }
}
