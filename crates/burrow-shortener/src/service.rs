use crate::error::ShortenerError;
use burrow_core::{ShortCode, DEFAULT_CODE_LENGTH};
use burrow_storage::{BatchAtomicity, CounterService, RecordStore, Storage};
use std::sync::Arc;
use tracing::{debug, warn, Span};
use typed_builder::TypedBuilder;

/// A batch holds one pool connection for its whole transaction, so its size
/// is capped.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, TypedBuilder)]
pub struct ShortenerConfig {
    #[builder(default = DEFAULT_CODE_LENGTH)]
    pub code_length: usize,
    #[builder(default = DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size: usize,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Result of shortening one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub code: ShortCode,
    /// `false` when the URL was already stored and its existing code was
    /// returned instead.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

impl BatchItem {
    pub fn new(correlation_id: impl Into<String>, original_url: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            original_url: original_url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub correlation_id: String,
    pub code: ShortCode,
    pub created: bool,
}

/// What a batch caller is willing to accept from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Refuse to run unless a failure rolls back every item.
    RequireAtomic,
    /// Run anyway; items written before a failure may stay visible.
    AllowBestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Whether the batch was applied all-or-nothing.
    pub atomicity: BatchAtomicity,
    /// One entry per item, in request order.
    pub entries: Vec<BatchEntry>,
}

/// Shortens and resolves URLs against a [`Storage`].
#[derive(Debug, Clone)]
pub struct ShortenerService {
    storage: Arc<Storage>,
    config: ShortenerConfig,
    span: Span,
}

impl ShortenerService {
    pub fn new(storage: Arc<Storage>, config: ShortenerConfig) -> Self {
        Self {
            storage,
            config,
            span: Span::current(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Rejects empty input. URLs are otherwise stored as given.
    fn validate_url(url: &str) -> Result<(), ShortenerError> {
        if url.trim().is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn shorten_with(
        &self,
        records: &dyn RecordStore,
        counter: &dyn CounterService,
        url: &str,
    ) -> Result<Shortened, ShortenerError> {
        let id = counter.next().await?;
        let code = ShortCode::generated(id, self.config.code_length);

        match records.save(&code, url).await {
            Ok(()) => Ok(Shortened {
                code,
                created: true,
            }),
            Err(err) if err.is_conflict() => {
                // A unique URL index turns a resubmission into a conflict;
                // hand back the code that already exists for it.
                match records.get_by_original(url).await {
                    Ok(existing) => {
                        debug!(parent: &self.span, code = %existing, "url already shortened");
                        Ok(Shortened {
                            code: existing,
                            created: false,
                        })
                    }
                    Err(lookup) if lookup.is_not_found() => Err(err.into()),
                    Err(lookup) => Err(lookup.into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn shorten(&self, url: &str) -> Result<Shortened, ShortenerError> {
        Self::validate_url(url)?;

        let records = self.storage.records();
        let counter = self.storage.counter();
        self.shorten_with(records.as_ref(), counter.as_ref(), url)
            .await
    }

    /// Shortens every item inside one unit of work.
    ///
    /// The first failure rolls the unit of work back and is returned. On a
    /// best-effort backend the items written before it remain stored.
    pub async fn shorten_batch(
        &self,
        items: Vec<BatchItem>,
        policy: BatchPolicy,
    ) -> Result<BatchOutcome, ShortenerError> {
        if items.len() > self.config.max_batch_size {
            return Err(ShortenerError::BatchTooLarge {
                size: items.len(),
                max: self.config.max_batch_size,
            });
        }
        for item in &items {
            Self::validate_url(&item.original_url)?;
        }

        let unit_of_work = self.storage.unit_of_work();
        let atomicity = unit_of_work.atomicity();
        if policy == BatchPolicy::RequireAtomic && !atomicity.is_atomic() {
            return Err(ShortenerError::AtomicBatchUnsupported);
        }

        let tx = unit_of_work.begin().await?;
        let records = self.storage.records().with_tx(&tx);
        let counter = self.storage.counter().with_tx(&tx);

        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            match self
                .shorten_with(records.as_ref(), counter.as_ref(), &item.original_url)
                .await
            {
                Ok(shortened) => entries.push(BatchEntry {
                    correlation_id: item.correlation_id,
                    code: shortened.code,
                    created: shortened.created,
                }),
                Err(err) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(parent: &self.span, error = %rollback, "batch rollback failed");
                    }
                    warn!(
                        parent: &self.span,
                        correlation_id = %item.correlation_id,
                        written = entries.len(),
                        atomic = atomicity.is_atomic(),
                        error = %err,
                        "batch aborted"
                    );
                    return Err(err);
                }
            }
        }

        tx.commit().await?;
        debug!(parent: &self.span, size = entries.len(), "batch committed");
        Ok(BatchOutcome { atomicity, entries })
    }

    /// Returns the original URL for a short code.
    pub async fn resolve(&self, code: &str) -> Result<String, ShortenerError> {
        let code = ShortCode::new(code)?;
        Ok(self.storage.records().get(&code).await?)
    }

    /// Returns the canonical short code of an already shortened URL.
    pub async fn lookup(&self, url: &str) -> Result<ShortCode, ShortenerError> {
        Self::validate_url(url)?;
        Ok(self.storage.records().get_by_original(url).await?)
    }

    pub async fn ping(&self) -> Result<(), ShortenerError> {
        Ok(self.storage.ping().await?)
    }
}
