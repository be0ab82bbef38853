//! Process-local backend. Nothing survives a restart.

use crate::repository::{
    canonical_code, BatchAtomicity, CounterService, HealthCheck, RecordStore, Tx, UnitOfWork,
};
use async_trait::async_trait;
use burrow_core::{Result, ShortCode, StorageError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, Span};

/// In-memory record store.
///
/// The existence check and the insertion happen under one write lock, so two
/// concurrent saves of the same code cannot both succeed.
#[derive(Debug)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<ShortCode, String>>,
    span: Span,
}

impl MemoryRecordStore {
    /// Creates a new in-memory record store.
    pub fn new() -> Self {
        Self::with_span(Span::none())
    }

    /// Creates an empty store that logs under `span`.
    pub fn with_span(span: Span) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            span,
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, code: &ShortCode, url: &str) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(code) {
            return Err(StorageError::Conflict(code.to_string()));
        }
        records.insert(code.clone(), url.to_owned());
        debug!(parent: &self.span, code = %code, "saved record");
        Ok(())
    }

    async fn get(&self, code: &ShortCode) -> Result<String> {
        self.records
            .read()
            .get(code)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(code.to_string()))
    }

    async fn get_by_original(&self, url: &str) -> Result<ShortCode> {
        canonical_code(self.records.read().iter(), url)
            .ok_or_else(|| StorageError::NotFound(url.to_owned()))
    }

    fn with_tx(self: Arc<Self>, _tx: &Tx) -> Arc<dyn RecordStore> {
        self
    }
}

/// Counter backed by a single atomic integer.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a counter whose first `next` returns `value + 1`.
    pub fn starting_at(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    /// The most recently issued value, or the starting value.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CounterService for AtomicCounter {
    async fn next(&self) -> Result<u64> {
        self.value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_add(1))
            .map(|previous| previous + 1)
            .map_err(|_| StorageError::InvalidData("counter exhausted".to_string()))
    }

    fn with_tx(self: Arc<Self>, _tx: &Tx) -> Arc<dyn CounterService> {
        self
    }
}

/// Unit of work for backends that cannot roll back.
///
/// `begin` hands out a no-op [`Tx`]; commit and rollback always succeed and
/// undo nothing. Its [`BatchAtomicity::BestEffort`] flag tells batch callers so.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUnitOfWork;

#[async_trait]
impl UnitOfWork for NoopUnitOfWork {
    async fn begin(&self) -> Result<Tx> {
        Ok(Tx::noop())
    }

    fn atomicity(&self) -> BatchAtomicity {
        BatchAtomicity::BestEffort
    }
}

/// Health check for the memory backend, which is always reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryHealthCheck;

#[async_trait]
impl HealthCheck for MemoryHealthCheck {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn code(id: u64) -> ShortCode {
        ShortCode::generated(id, 7)
    }

    #[tokio::test]
    async fn save_and_get() {
        let repo = MemoryRecordStore::new();

        repo.save(&code(1), "https://example.com").await.unwrap();

        assert_eq!(repo.get(&code(1)).await.unwrap(), "https://example.com");
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn get_nonexistent() {
        let repo = MemoryRecordStore::new();

        let err = repo.get(&code(1)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn save_conflict_keeps_first_url() {
        let repo = MemoryRecordStore::new();

        repo.save(&code(1), "https://a.example").await.unwrap();
        let err = repo.save(&code(1), "https://b.example").await.unwrap_err();

        assert!(matches!(err, StorageError::Conflict(_)));
        assert_eq!(repo.get(&code(1)).await.unwrap(), "https://a.example");
    }

    #[tokio::test]
    async fn get_by_original_returns_oldest_code() {
        let repo = MemoryRecordStore::new();

        repo.save(&code(7), "https://a.example").await.unwrap();
        repo.save(&code(2), "https://a.example").await.unwrap();
        repo.save(&code(3), "https://b.example").await.unwrap();

        assert_eq!(repo.get_by_original("https://a.example").await.unwrap(), code(2));
        assert!(repo
            .get_by_original("https://c.example")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn with_tx_returns_same_store() {
        let repo = Arc::new(MemoryRecordStore::new());
        let tx = NoopUnitOfWork.begin().await.unwrap();

        let bound = Arc::clone(&repo).with_tx(&tx);
        bound.save(&code(1), "https://example.com").await.unwrap();
        tx.rollback().await.unwrap();

        // Rollback is a no-op: the write is still there.
        assert_eq!(repo.get(&code(1)).await.unwrap(), "https://example.com");
    }

    #[tokio::test]
    async fn concurrent_saves_of_one_code_have_one_winner() {
        let repo = Arc::new(MemoryRecordStore::new());
        let mut handles = vec![];

        for i in 0..16 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.save(&code(42), &format!("https://example{}.com", i))
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn counter_starts_after_seed() {
        let counter = AtomicCounter::starting_at(41);
        assert_eq!(counter.next().await.unwrap(), 42);
        assert_eq!(counter.next().await.unwrap(), 43);
        assert_eq!(counter.current(), 43);
    }

    #[tokio::test]
    async fn counter_refuses_to_wrap() {
        let counter = AtomicCounter::starting_at(u64::MAX);
        let err = counter.next().await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));
        assert_eq!(counter.current(), u64::MAX);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_next_has_no_duplicates_or_gaps() {
        let counter = Arc::new(AtomicCounter::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let mut values = Vec::with_capacity(250);
                for _ in 0..250 {
                    values.push(counter.next().await.unwrap());
                }
                values
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.await.unwrap() {
                assert!(seen.insert(value), "duplicate value {value}");
            }
        }
        assert_eq!(seen.len(), 2_000);
        assert_eq!(seen.iter().copied().min(), Some(1));
        assert_eq!(seen.iter().copied().max(), Some(2_000));
    }

    #[tokio::test]
    async fn noop_unit_of_work_is_best_effort() {
        assert_eq!(NoopUnitOfWork.atomicity(), BatchAtomicity::BestEffort);
        assert!(NoopUnitOfWork.begin().await.unwrap().is_noop());
    }
}
