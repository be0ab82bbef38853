use crate::file::log::AppendLog;
use crate::repository::{CounterService, Tx};
use async_trait::async_trait;
use burrow_core::{Result, StorageError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn, Span};

#[derive(Debug, Serialize, Deserialize)]
struct CounterEntry {
    value: u64,
}

/// Counter whose every issued value is appended to its own log first.
///
/// On open the log is replayed and the counter resumes from the highest value
/// recorded, so values are never reissued across restarts.
#[derive(Debug)]
pub struct FileCounter {
    value: Mutex<u64>,
    log: AppendLog,
    span: Span,
}

impl FileCounter {
    pub fn open(path: &Path, span: Span) -> Result<Self> {
        let log = AppendLog::open(path)?;
        let mut value = 0_u64;

        log.replay(&span, |entry: CounterEntry| {
            // Max, not last: a reordered log must still never reissue a value.
            value = value.max(entry.value);
            Ok(())
        })?;
        debug!(parent: &span, value, "counter restored");

        Ok(Self {
            value: Mutex::new(value),
            log,
            span,
        })
    }

    /// The most recently issued value.
    pub fn current(&self) -> u64 {
        *self.value.lock()
    }

    pub fn is_open(&self) -> bool {
        self.log.is_open()
    }

    pub fn close(&self) -> Result<()> {
        self.log.close()
    }
}

#[async_trait]
impl CounterService for FileCounter {
    async fn next(&self) -> Result<u64> {
        let mut value = self.value.lock();
        *value = value
            .checked_add(1)
            .ok_or_else(|| StorageError::InvalidData("counter exhausted".to_string()))?;

        if let Err(failure) = self.log.append(&CounterEntry { value: *value }) {
            // A written value is replayed on the next open, so it stays spent.
            if !failure.written {
                *value -= 1;
            }
            warn!(
                parent: &self.span,
                written = failure.written,
                error = %failure.error,
                "counter append failed"
            );
            return Err(failure.into());
        }
        Ok(*value)
    }

    fn with_tx(self: Arc<Self>, _tx: &Tx) -> Arc<dyn CounterService> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> FileCounter {
        FileCounter::open(&dir.path().join("records.jsonl.seq"), Span::none()).unwrap()
    }

    #[tokio::test]
    async fn starts_at_one() {
        let dir = TempDir::new().unwrap();
        let counter = open(&dir);

        assert_eq!(counter.next().await.unwrap(), 1);
        assert_eq!(counter.next().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn resumes_after_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let counter = open(&dir);
            for _ in 0..5 {
                counter.next().await.unwrap();
            }
            counter.close().unwrap();
        }

        let counter = open(&dir);
        assert_eq!(counter.current(), 5);
        assert_eq!(counter.next().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn replay_skips_garbage_and_keeps_highest() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("records.jsonl.seq"),
            "{\"value\":1}\n{\"value\":2}\nnope\n{\"hash\":\"a\",\"url\":\"b\"}\n{\"value\":3}\n{\"va",
        )
        .unwrap();

        let counter = open(&dir);

        assert_eq!(counter.current(), 3);
        assert_eq!(counter.next().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn failed_append_rolls_back() {
        let dir = TempDir::new().unwrap();
        let counter = open(&dir);
        assert_eq!(counter.next().await.unwrap(), 1);

        counter.close().unwrap();
        let err = counter.next().await.unwrap_err();

        assert!(matches!(err, StorageError::Closed));
        assert_eq!(counter.current(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_next_has_no_duplicates_or_gaps() {
        let dir = TempDir::new().unwrap();
        let counter = Arc::new(open(&dir));
        let mut handles = vec![];

        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let mut values = Vec::new();
                for _ in 0..50 {
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
        let expected: HashSet<u64> = (1..=200).collect();
        assert_eq!(seen, expected);

        drop(counter);
        let reopened = open(&dir);
        assert_eq!(reopened.current(), 200);
    }
}
