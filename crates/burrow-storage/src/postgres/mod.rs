//! PostgreSQL backend.
//!
//! Records live in `short_urls`, identifiers come from the `url_counter`
//! sequence, and batches run inside native transactions. Concurrency control
//! is left to the database.

pub mod counter;
pub mod records;
pub mod uow;

pub use counter::PgCounter;
pub use records::PgRecordStore;
pub use uow::PgUnitOfWork;
pub(crate) use uow::PgTx;

use crate::repository::HealthCheck;
use async_trait::async_trait;
use burrow_core::{Result, StorageError};
use sqlx::migrate::Migrator;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool, Postgres, Transaction};
use std::time::Duration;
use tokio::sync::MutexGuard;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a bounded connection pool.
///
/// An unparsable DSN is a configuration error; an unreachable server is
/// reported as unavailable.
pub async fn connect(database_dsn: &str, max_connections: u32) -> Result<PgPool> {
    let options: PgConnectOptions = database_dsn
        .parse()
        .map_err(|e| StorageError::Configuration(format!("invalid database dsn: {e}")))?;

    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)
}

/// Applies pending schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    if is_unique_violation(&err) {
        return StorageError::Conflict(message);
    }

    match err {
        sqlx::Error::Configuration(_) => StorageError::Configuration(message),
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed => StorageError::Closed,
        sqlx::Error::WorkerCrashed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StorageError::Unavailable(message)
        }
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        sqlx::Error::Migrate(_) => StorageError::Migration(message),
        _ => StorageError::Query(message),
    }
}

/// Where a repository sends its statements: the shared pool, or the
/// connection owned by an open transaction.
#[derive(Debug, Clone)]
pub(crate) enum PgExecutor {
    Pool(PgPool),
    Tx(PgTx),
}

pub(crate) enum Conn<'a> {
    Pooled(PoolConnection<Postgres>),
    Tx(MutexGuard<'a, Option<Transaction<'static, Postgres>>>),
}

impl PgExecutor {
    pub(crate) async fn acquire(&self) -> Result<Conn<'_>> {
        match self {
            PgExecutor::Pool(pool) => pool.acquire().await.map(Conn::Pooled).map_err(map_sqlx_error),
            PgExecutor::Tx(tx) => Ok(Conn::Tx(tx.lock().await)),
        }
    }
}

impl Conn<'_> {
    pub(crate) fn get(&mut self) -> Result<&mut PgConnection> {
        match self {
            Conn::Pooled(conn) => Ok(&mut **conn),
            Conn::Tx(guard) => guard
                .as_mut()
                .map(|tx| &mut **tx)
                .ok_or(StorageError::TransactionClosed),
        }
    }
}

/// Round-trips a ping over a pooled connection.
#[derive(Debug, Clone)]
pub struct PgHealthCheck {
    pool: PgPool,
}

impl PgHealthCheck {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthCheck for PgHealthCheck {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        conn.ping().await.map_err(map_sqlx_error)
    }
}
