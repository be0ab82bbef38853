pub mod factory;
pub mod file;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use burrow_core::{ErrorKind, Result, ShortCode, StorageError, UrlRecord};
pub use factory::{Backend, Storage, StorageSettings, PING_TIMEOUT};
pub use file::{FileCounter, FileHealthCheck, FileRecordStore};
pub use memory::{AtomicCounter, MemoryHealthCheck, MemoryRecordStore, NoopUnitOfWork};
pub use postgres::{PgCounter, PgHealthCheck, PgRecordStore, PgUnitOfWork};
pub use repository::{BatchAtomicity, CounterService, HealthCheck, RecordStore, Tx, UnitOfWork};
