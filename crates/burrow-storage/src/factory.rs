use crate::file::{counter_path, FileCounter, FileHealthCheck, FileRecordStore};
use crate::memory::{AtomicCounter, MemoryHealthCheck, MemoryRecordStore, NoopUnitOfWork};
use crate::postgres::{self, PgCounter, PgHealthCheck, PgRecordStore, PgUnitOfWork};
use crate::repository::{BatchAtomicity, CounterService, HealthCheck, RecordStore, UnitOfWork};
use async_trait::async_trait;
use burrow_core::{Result, StorageError};
use parking_lot::Mutex;
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Span};
use typed_builder::TypedBuilder;

/// Upper bound on a health probe, independent of the caller's deadline.
pub const PING_TIMEOUT: Duration = Duration::from_millis(500);

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Storage configuration. Blank values count as unset.
#[derive(Debug, Clone, TypedBuilder)]
pub struct StorageSettings {
    #[builder(default, setter(into))]
    pub database_dsn: Option<String>,
    #[builder(default, setter(into))]
    pub file_storage_path: Option<PathBuf>,
    #[builder(default = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,
    /// Span every backend logs under.
    #[builder(default = Span::current())]
    pub span: Span,
}

/// The backend a [`StorageSettings`] resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Memory,
    File(PathBuf),
    Postgres(String),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::File(_) => "file",
            Backend::Postgres(_) => "postgres",
        }
    }
}

impl StorageSettings {
    /// A DSN wins over a file path; with neither, storage stays in memory.
    pub fn backend(&self) -> Backend {
        if let Some(dsn) = self.database_dsn.as_deref().map(str::trim) {
            if !dsn.is_empty() {
                return Backend::Postgres(dsn.to_owned());
            }
        }

        match &self.file_storage_path {
            Some(path) if !path.as_os_str().is_empty() => Backend::File(path.clone()),
            _ => Backend::Memory,
        }
    }
}

/// Something the factory must release on shutdown.
#[async_trait]
trait Resource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl Resource for FileRecordStore {
    fn name(&self) -> &'static str {
        "record log"
    }

    async fn close(&self) -> Result<()> {
        FileRecordStore::close(self)
    }
}

#[async_trait]
impl Resource for FileCounter {
    fn name(&self) -> &'static str {
        "counter log"
    }

    async fn close(&self) -> Result<()> {
        FileCounter::close(self)
    }
}

#[async_trait]
impl Resource for PgPool {
    fn name(&self) -> &'static str {
        "connection pool"
    }

    async fn close(&self) -> Result<()> {
        PgPool::close(self).await;
        Ok(())
    }
}

/// Facade over one configured backend.
///
/// Callers only ever see the capability traits; which backend sits behind
/// them is decided once, in [`Storage::open`].
pub struct Storage {
    backend: &'static str,
    records: Arc<dyn RecordStore>,
    counter: Arc<dyn CounterService>,
    unit_of_work: Arc<dyn UnitOfWork>,
    health: Arc<dyn HealthCheck>,
    resources: Mutex<Option<Vec<Arc<dyn Resource>>>>,
    span: Span,
}

impl Storage {
    /// Opens the backend selected by `settings`.
    ///
    /// Migrations run before a PostgreSQL backend is returned, and any
    /// failure here is fatal for the caller.
    pub async fn open(settings: StorageSettings) -> Result<Self> {
        let backend = settings.backend();
        let span = settings.span.clone();

        let storage = match &backend {
            Backend::Postgres(dsn) => {
                Self::open_postgres(dsn, settings.max_connections, span).await?
            }
            Backend::File(path) => Self::open_file(path, span)?,
            Backend::Memory => Self::in_memory_with_span(span),
        };

        info!(parent: &storage.span, backend = backend.name(), "storage opened");
        Ok(storage)
    }

    /// Volatile storage for tests and local runs.
    pub fn in_memory() -> Self {
        Self::in_memory_with_span(Span::current())
    }

    fn in_memory_with_span(span: Span) -> Self {
        Self {
            backend: "memory",
            records: Arc::new(MemoryRecordStore::with_span(span.clone())),
            counter: Arc::new(AtomicCounter::new()),
            unit_of_work: Arc::new(NoopUnitOfWork),
            health: Arc::new(MemoryHealthCheck),
            resources: Mutex::new(Some(Vec::new())),
            span,
        }
    }

    fn open_file(path: &Path, span: Span) -> Result<Self> {
        let records = Arc::new(FileRecordStore::open(path, span.clone())?);
        let counter = Arc::new(FileCounter::open(&counter_path(path), span.clone())?);

        let health = FileHealthCheck::new(Arc::clone(&records), Arc::clone(&counter));
        let resources: Vec<Arc<dyn Resource>> = vec![
            Arc::clone(&records) as Arc<dyn Resource>,
            Arc::clone(&counter) as Arc<dyn Resource>,
        ];

        Ok(Self {
            backend: "file",
            records,
            counter,
            unit_of_work: Arc::new(NoopUnitOfWork),
            health: Arc::new(health),
            resources: Mutex::new(Some(resources)),
            span,
        })
    }

    async fn open_postgres(dsn: &str, max_connections: u32, span: Span) -> Result<Self> {
        let pool = postgres::connect(dsn, max_connections).await?;

        if let Err(err) = postgres::migrate(&pool).await {
            pool.close().await;
            return Err(err);
        }

        Ok(Self {
            backend: "postgres",
            records: Arc::new(PgRecordStore::new(pool.clone(), span.clone())),
            counter: Arc::new(PgCounter::new(pool.clone())),
            unit_of_work: Arc::new(PgUnitOfWork::new(pool.clone(), span.clone())),
            health: Arc::new(PgHealthCheck::new(pool.clone())),
            resources: Mutex::new(Some(vec![Arc::new(pool) as Arc<dyn Resource>])),
            span,
        })
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn records(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.records)
    }

    pub fn counter(&self) -> Arc<dyn CounterService> {
        Arc::clone(&self.counter)
    }

    pub fn unit_of_work(&self) -> Arc<dyn UnitOfWork> {
        Arc::clone(&self.unit_of_work)
    }

    pub fn atomicity(&self) -> BatchAtomicity {
        self.unit_of_work.atomicity()
    }

    pub fn is_closed(&self) -> bool {
        self.resources.lock().is_none()
    }

    /// Probes the backend, giving up after [`PING_TIMEOUT`].
    pub async fn ping(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }

        match tokio::time::timeout(PING_TIMEOUT, self.health.ping()).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(format!(
                "ping exceeded {}ms",
                PING_TIMEOUT.as_millis()
            ))),
        }
    }

    /// Releases every owned resource. Only the first call does any work.
    ///
    /// Each resource is closed even when an earlier one fails; the first
    /// failure is returned.
    pub async fn close(&self) -> Result<()> {
        let resources = self.resources.lock().take();
        let Some(resources) = resources else {
            return Ok(());
        };

        let mut first_error = None;
        for resource in resources {
            if let Err(err) = resource.close().await {
                warn!(
                    parent: &self.span,
                    resource = resource.name(),
                    error = %err,
                    "failed to close storage resource"
                );
                first_error.get_or_insert(err);
            }
        }

        debug!(parent: &self.span, backend = self.backend, "storage closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("backend", &self.backend)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
