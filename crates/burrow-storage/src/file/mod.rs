//! File backend: in-memory indexes rebuilt from append-only JSON logs.
//!
//! Records go to the configured log path as `{"hash":..,"url":..}` lines and
//! counter values go to a sibling `<path>.seq` log as `{"value":..}` lines.

pub mod counter;
pub mod log;
pub mod records;

pub use counter::FileCounter;
pub use log::{AppendError, AppendLog, ReplayStats};
pub use records::FileRecordStore;

use crate::repository::HealthCheck;
use async_trait::async_trait;
use burrow_core::{Result, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Path of the counter log that belongs to a record log.
pub fn counter_path(records_path: &Path) -> PathBuf {
    let mut path = records_path.as_os_str().to_owned();
    path.push(".seq");
    PathBuf::from(path)
}

/// Reports healthy while both logs accept appends.
#[derive(Debug, Clone)]
pub struct FileHealthCheck {
    records: Arc<FileRecordStore>,
    counter: Arc<FileCounter>,
}

impl FileHealthCheck {
    pub fn new(records: Arc<FileRecordStore>, counter: Arc<FileCounter>) -> Self {
        Self { records, counter }
    }
}

#[async_trait]
impl HealthCheck for FileHealthCheck {
    async fn ping(&self) -> Result<()> {
        if self.records.is_open() && self.counter.is_open() {
            Ok(())
        } else {
            Err(StorageError::Closed)
        }
    }
}
