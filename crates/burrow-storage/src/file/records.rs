use crate::file::log::AppendLog;
use crate::repository::{canonical_code, RecordStore, Tx};
use async_trait::async_trait;
use burrow_core::{Result, ShortCode, StorageError, UrlRecord};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn, Span};

/// Record store that keeps every record in memory and persists each save to
/// an append-only log.
///
/// The in-memory index is authoritative for reads and is rebuilt from the log
/// on open. A save holds the write lock across the existence check, the
/// durable append and the index insertion, so readers never observe a record
/// whose append has not completed. A failed append leaves the index untouched
/// unless the line reached the file, in which case the index takes it as the
/// next replay would.
#[derive(Debug)]
pub struct FileRecordStore {
    records: RwLock<HashMap<ShortCode, String>>,
    log: AppendLog,
    span: Span,
}

impl FileRecordStore {
    /// Opens the log at `path` and replays it into the index.
    pub fn open(path: &Path, span: Span) -> Result<Self> {
        let log = AppendLog::open(path)?;
        let mut records = HashMap::new();

        let stats = log.replay(&span, |record: UrlRecord| {
            if record.is_incomplete() {
                return Err("incomplete record");
            }
            // Later lines for a code replace earlier ones.
            records.insert(record.short_code, record.original_url);
            Ok(())
        })?;
        debug!(parent: &span, records = records.len(), skipped = stats.skipped, "record index rebuilt");

        Ok(Self {
            records: RwLock::new(records),
            log,
            span,
        })
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.log.is_open()
    }

    pub fn close(&self) -> Result<()> {
        self.log.close()
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn save(&self, code: &ShortCode, url: &str) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(code) {
            return Err(StorageError::Conflict(code.to_string()));
        }

        let record = UrlRecord::new(code.clone(), url);
        if let Err(failure) = self.log.append(&record) {
            warn!(
                parent: &self.span,
                code = %code,
                written = failure.written,
                error = %failure.error,
                "record append failed"
            );
            if failure.written {
                records.insert(record.short_code, record.original_url);
            }
            return Err(failure.into());
        }

        records.insert(record.short_code, record.original_url);
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

    // TODO: keep a reverse index if record logs grow past what a scan per
    // conflict can afford.
    async fn get_by_original(&self, url: &str) -> Result<ShortCode> {
        canonical_code(self.records.read().iter(), url)
            .ok_or_else(|| StorageError::NotFound(url.to_owned()))
    }

    fn with_tx(self: Arc<Self>, _tx: &Tx) -> Arc<dyn RecordStore> {
        self
    }
}
