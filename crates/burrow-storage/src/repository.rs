use crate::postgres::PgTx;
use async_trait::async_trait;
use burrow_core::{Result, ShortCode};
use std::sync::Arc;

/// Whether a backend's unit of work makes a batch of writes all-or-nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAtomicity {
    /// Rollback discards every write made through the transaction.
    Atomic,
    /// Commit and rollback are no-ops; writes take effect as they happen.
    BestEffort,
}

impl BatchAtomicity {
    pub fn is_atomic(self) -> bool {
        matches!(self, BatchAtomicity::Atomic)
    }
}

/// Maps short codes to original URLs.
///
/// Records are immutable: there is no update or delete.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Persists a new record. Returns `Err(Conflict)` if the code already exists.
    async fn save(&self, code: &ShortCode, url: &str) -> Result<()>;

    /// Returns the URL stored under `code`, or `Err(NotFound)`.
    async fn get(&self, code: &ShortCode) -> Result<String>;

    /// Returns the canonical (lowest) code stored for `url`, or `Err(NotFound)`.
    async fn get_by_original(&self, url: &str) -> Result<ShortCode>;

    /// Returns a handle whose calls run inside `tx`.
    ///
    /// Backends without transactions return the receiver unchanged.
    fn with_tx(self: Arc<Self>, tx: &Tx) -> Arc<dyn RecordStore>;
}

/// Issues strictly increasing identifiers.
#[async_trait]
pub trait CounterService: Send + Sync + 'static {
    /// Returns a value greater than every value this counter returned before.
    async fn next(&self) -> Result<u64>;

    /// Returns a handle whose calls run inside `tx`.
    ///
    /// Backends without transactions return the receiver unchanged.
    fn with_tx(self: Arc<Self>, tx: &Tx) -> Arc<dyn CounterService>;
}

/// Opens transactional scopes over a backend.
#[async_trait]
pub trait UnitOfWork: Send + Sync + 'static {
    async fn begin(&self) -> Result<Tx>;

    /// What a rollback of a [`Tx`] from this unit of work actually undoes.
    fn atomicity(&self) -> BatchAtomicity;
}

#[async_trait]
pub trait HealthCheck: Send + Sync + 'static {
    async fn ping(&self) -> Result<()>;
}

/// A transaction opened by a [`UnitOfWork`].
///
/// Either wraps a native database transaction or is a no-op marker for
/// backends that cannot roll back. Handles obtained through `with_tx` stay
/// bound to it; once it is committed or rolled back they fail with
/// `TransactionClosed`.
pub struct Tx {
    inner: TxInner,
}

enum TxInner {
    Noop,
    Postgres(PgTx),
}

impl Tx {
    pub(crate) fn noop() -> Self {
        Self {
            inner: TxInner::Noop,
        }
    }

    pub(crate) fn postgres(tx: PgTx) -> Self {
        Self {
            inner: TxInner::Postgres(tx),
        }
    }

    pub(crate) fn as_postgres(&self) -> Option<&PgTx> {
        match &self.inner {
            TxInner::Postgres(tx) => Some(tx),
            TxInner::Noop => None,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.inner, TxInner::Noop)
    }

    pub async fn commit(self) -> Result<()> {
        match self.inner {
            TxInner::Noop => Ok(()),
            TxInner::Postgres(tx) => tx.commit().await,
        }
    }

    pub async fn rollback(self) -> Result<()> {
        match self.inner {
            TxInner::Noop => Ok(()),
            TxInner::Postgres(tx) => tx.rollback().await,
        }
    }
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.inner {
            TxInner::Noop => "noop",
            TxInner::Postgres(_) => "postgres",
        };
        f.debug_struct("Tx").field("kind", &kind).finish()
    }
}

/// Linear scan for the lowest code mapped to `url`.
///
/// Generated codes of one length sort in issue order, so this is the oldest
/// code for the URL.
pub(crate) fn canonical_code<'a, I>(records: I, url: &str) -> Option<ShortCode>
where
    I: IntoIterator<Item = (&'a ShortCode, &'a String)>,
{
    records
        .into_iter()
        .filter(|(_, original)| original.as_str() == url)
        .map(|(code, _)| code)
        .min()
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn noop_tx_commits_and_rolls_back() {
        let tx = Tx::noop();
        assert!(tx.is_noop());
        tx.commit().await.unwrap();
        Tx::noop().rollback().await.unwrap();
    }

    #[test]
    fn canonical_code_prefers_lowest() {
        let mut records = HashMap::new();
        records.insert(ShortCode::generated(9, 7), "https://a.example".to_string());
        records.insert(ShortCode::generated(3, 7), "https://a.example".to_string());
        records.insert(ShortCode::generated(1, 7), "https://b.example".to_string());

        assert_eq!(
            canonical_code(&records, "https://a.example"),
            Some(ShortCode::generated(3, 7))
        );
        assert_eq!(canonical_code(&records, "https://c.example"), None);
    }
}
