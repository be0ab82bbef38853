use burrow_core::{Result, StorageError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Span};

/// Counts from one replay of an [`AppendLog`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub skipped: usize,
}

/// An append-only file of newline-delimited JSON entries.
///
/// Entries are only ever added at the end. The whole file is read once, in
/// order, by [`AppendLog::replay`] to rebuild in-memory state.
#[derive(Debug)]
pub struct AppendLog {
    path: PathBuf,
    writer: Mutex<Option<Writer>>,
}

#[derive(Debug)]
struct Writer {
    file: File,
    /// The file does not end with a newline, either from a crash mid-write or
    /// from a failed append in this process.
    torn: bool,
}

impl AppendLog {
    /// Opens (or creates) the log at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| open_error(parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| open_error(path, e))?;
        let torn = ends_without_newline(path).map_err(|e| open_error(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(Some(Writer { file, torn })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every line in order and hands each parsed entry to `apply`.
    ///
    /// Lines that fail to parse, and entries `apply` rejects, are skipped with
    /// a warning under `span`. Only failing to read the file is an error.
    pub fn replay<T, F>(&self, span: &Span, mut apply: F) -> Result<ReplayStats>
    where
        T: DeserializeOwned,
        F: FnMut(T) -> std::result::Result<(), &'static str>,
    {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut stats = ReplayStats::default();

        for (index, line) in reader.split(b'\n').enumerate() {
            let line = line?;
            let line_no = index + 1;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<T>(&line) {
                Ok(entry) => match apply(entry) {
                    Ok(()) => stats.applied += 1,
                    Err(reason) => {
                        stats.skipped += 1;
                        warn!(parent: span, path = %self.path.display(), line = line_no, reason, "skipping log entry");
                    }
                },
                Err(err) => {
                    stats.skipped += 1;
                    warn!(parent: span, path = %self.path.display(), line = line_no, error = %err, "skipping malformed log entry");
                }
            }
        }

        info!(
            parent: span,
            path = %self.path.display(),
            applied = stats.applied,
            skipped = stats.skipped,
            "replayed log"
        );
        Ok(stats)
    }

    /// Appends one entry and syncs it to disk before returning.
    ///
    /// If the line was written but the sync failed, the entry will be
    /// replayed on the next open; the log closes itself and the error says
    /// so through [`AppendError::written`].
    pub fn append<T: Serialize>(&self, entry: &T) -> std::result::Result<(), AppendError> {
        let mut line = serde_json::to_vec(entry).map_err(|e| {
            AppendError::not_written(StorageError::InvalidData(format!("encode log entry: {e}")))
        })?;
        line.push(b'\n');

        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or(AppendError::not_written(StorageError::Closed))?;

        if writer.torn {
            writer
                .file
                .write_all(b"\n")
                .map_err(|e| AppendError::not_written(e.into()))?;
            writer.torn = false;
        }

        if let Err(err) = writer.file.write_all(&line) {
            writer.torn = true;
            return Err(AppendError::not_written(err.into()));
        }

        let synced = writer.file.sync_data();
        settle(&mut guard, synced)
    }

    pub fn is_open(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Syncs and releases the file handle. Later appends fail with `Closed`.
    ///
    /// Closing an already closed log is a no-op.
    pub fn close(&self) -> Result<()> {
        match self.writer.lock().take() {
            Some(writer) => Ok(writer.file.sync_all()?),
            None => Ok(()),
        }
    }
}

/// A failed [`AppendLog::append`].
#[derive(Debug)]
pub struct AppendError {
    pub error: StorageError,
    /// The line reached the file even though the append failed.
    pub written: bool,
}

impl AppendError {
    fn not_written(error: StorageError) -> Self {
        Self {
            error,
            written: false,
        }
    }
}

impl From<AppendError> for StorageError {
    fn from(value: AppendError) -> Self {
        value.error
    }
}

/// Closes the log when a written line could not be synced, so nothing is
/// appended after an entry of unknown durability.
fn settle(
    writer: &mut Option<Writer>,
    synced: std::io::Result<()>,
) -> std::result::Result<(), AppendError> {
    match synced {
        Ok(()) => Ok(()),
        Err(err) => {
            writer.take();
            Err(AppendError {
                error: err.into(),
                written: true,
            })
        }
    }
}

fn open_error(path: &Path, err: std::io::Error) -> StorageError {
    StorageError::Configuration(format!("cannot open log {}: {err}", path.display()))
}

fn ends_without_newline(path: &Path) -> std::io::Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Entry {
        value: u64,
    }

    fn collect(log: &AppendLog) -> (Vec<u64>, ReplayStats) {
        let mut values = Vec::new();
        let stats = log
            .replay(&Span::none(), |entry: Entry| {
                values.push(entry.value);
                Ok(())
            })
            .unwrap();
        (values, stats)
    }

    #[test]
    fn append_and_replay_in_order() {
        let dir = TempDir::new().unwrap();
        let log = AppendLog::open(&dir.path().join("log.jsonl")).unwrap();

        for value in 1..=3 {
            log.append(&Entry { value }).unwrap();
        }

        let (values, stats) = collect(&log);
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(stats, ReplayStats { applied: 3, skipped: 0 });
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/log.jsonl");

        let log = AppendLog::open(&path).unwrap();

        assert!(path.exists());
        assert_eq!(collect(&log).0, Vec::<u64>::new());
    }

    #[test]
    fn malformed_and_rejected_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        fs::write(
            &path,
            "{\"value\":1}\nnot json\n\n{\"hash\":\"x\",\"url\":\"y\"}\n{\"value\":2}\n",
        )
        .unwrap();

        let log = AppendLog::open(&path).unwrap();
        let mut values = Vec::new();
        let stats = log
            .replay(&Span::none(), |entry: Entry| {
                if entry.value == 2 {
                    return Err("rejected");
                }
                values.push(entry.value);
                Ok(())
            })
            .unwrap();

        assert_eq!(values, vec![1]);
        assert_eq!(stats, ReplayStats { applied: 1, skipped: 3 });
    }

    #[test]
    fn torn_tail_does_not_swallow_next_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        fs::write(&path, "{\"value\":1}\n{\"val").unwrap();

        let log = AppendLog::open(&path).unwrap();
        log.append(&Entry { value: 2 }).unwrap();

        let (values, stats) = collect(&log);
        assert_eq!(values, vec![1, 2]);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn append_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let log = AppendLog::open(&dir.path().join("log.jsonl")).unwrap();

        log.close().unwrap();
        log.close().unwrap();

        assert!(!log.is_open());
        let err = log.append(&Entry { value: 1 }).unwrap_err();
        assert!(!err.written);
        assert!(matches!(err.error, StorageError::Closed));
    }

    #[test]
    fn failed_sync_reports_written_and_closes_log() {
        let dir = TempDir::new().unwrap();
        let log = AppendLog::open(&dir.path().join("log.jsonl")).unwrap();

        let mut guard = log.writer.lock();
        let err = settle(&mut guard, Err(std::io::Error::other("fsync failed"))).unwrap_err();
        drop(guard);

        assert!(err.written);
        assert!(matches!(err.error, StorageError::Io(ref msg) if msg.contains("fsync failed")));
        assert!(!log.is_open());
        assert!(matches!(
            log.append(&Entry { value: 1 }).unwrap_err().error,
            StorageError::Closed
        ));
    }

    #[test]
    fn open_fails_when_path_is_a_directory() {
        let dir = TempDir::new().unwrap();
        let err = AppendLog::open(dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }
}
