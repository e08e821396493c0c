//! Local key/value storage
//!
//! String-keyed store with typed accessors. Every write updates memory at
//! once and hands a snapshot to a background thread that owns the JSON
//! file, so callers never wait on the filesystem. Writes are best-effort: a
//! failed flush is logged and the in-memory value stays authoritative.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::logging::log_persistence_failure;

/// Persisted key names
pub mod keys {
    pub const MODE: &str = "mode";
    pub const TIME: &str = "time";
    pub const FOCUS_TIME_STASH: &str = "focusTimeStash";
    pub const HAS_BREAK_STARTED: &str = "hasBreakStarted";
    pub const INITIAL_BREAK_TIME: &str = "initialBreakTime";
    pub const COMPLETED_FOCUS_TIME: &str = "completedFocusTime";
    pub const LAST_FOCUS_DATE: &str = "lastFocusDate";
    pub const FOCUS_HISTORY: &str = "focusHistory";
    /// Last focus history that failed to parse, kept for manual recovery
    pub const CORRUPT_FOCUS_HISTORY: &str = "focusHistoryCorrupt";
}

/// Local storage errors, only surfaced when opening the file
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to read storage file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to start storage writer: {0}")]
    Writer(std::io::Error),
}

#[derive(Debug)]
enum WriteRequest {
    Write(BTreeMap<String, String>),
    /// Answered once every earlier write is on disk
    Sync(oneshot::Sender<()>),
}

/// Thread owning the storage file
///
/// Snapshots queued while a write is in progress collapse into the newest.
/// The thread exits after its last write once every handle is dropped.
#[derive(Debug)]
struct FileWriter {
    path: PathBuf,
    requests: mpsc::UnboundedSender<WriteRequest>,
}

impl FileWriter {
    fn spawn(path: PathBuf) -> std::io::Result<Self> {
        let (requests, mut receiver) = mpsc::unbounded_channel();
        let target = path.clone();

        std::thread::Builder::new()
            .name("local-storage-writer".to_string())
            .spawn(move || {
                while let Some(first) = receiver.blocking_recv() {
                    let mut latest = None;
                    let mut synced = Vec::new();

                    let mut next = Some(first);
                    while let Some(request) = next {
                        match request {
                            WriteRequest::Write(entries) => latest = Some(entries),
                            WriteRequest::Sync(done) => synced.push(done),
                        }
                        next = receiver.try_recv().ok();
                    }

                    if let Some(entries) = latest {
                        if let Err(e) = write_atomically(&target, &entries) {
                            log_persistence_failure("local_storage", &e);
                        }
                    }
                    for done in synced {
                        let _ = done.send(());
                    }
                }

                debug!(path = ?target, "Local storage writer stopped");
            })?;

        Ok(Self { path, requests })
    }
}

/// Cheaply cloneable handle to the process-wide key/value store
#[derive(Debug, Clone)]
pub struct LocalStorage {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
    writer: Option<Arc<FileWriter>>,
}

impl LocalStorage {
    /// Open the store backed by `path`, creating it lazily on first write
    ///
    /// A file that exists but does not parse is treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Storage file is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Read { path, source }),
        };

        debug!(path = ?path, keys = entries.len(), "Local storage opened");

        let writer = FileWriter::spawn(path).map_err(StorageError::Writer)?;

        Ok(Self {
            entries: Arc::new(Mutex::new(entries)),
            writer: Some(Arc::new(writer)),
        })
    }

    /// Store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            entries: Arc::new(Mutex::new(BTreeMap::new())),
            writer: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.writer.as_ref().map(|writer| writer.path.as_path())
    }

    /// Wait until every write made so far has reached the file
    pub async fn sync(&self) {
        let Some(writer) = &self.writer else {
            return;
        };

        let (done, synced) = oneshot::channel();
        if writer.requests.send(WriteRequest::Sync(done)).is_ok() {
            let _ = synced.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raw string value; empty strings count as absent
    pub fn get(&self, key: &str, default: &str) -> String {
        self.lock()
            .get(key)
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Non-negative integer value; unparsable values yield `default`
    pub fn get_number(&self, key: &str, default: u64) -> u64 {
        let entries = self.lock();
        let Some(raw) = entries.get(key) else {
            return default;
        };

        raw.trim()
            .parse::<u64>()
            .ok()
            // Older writers stored floats such as "12.0"
            .or_else(|| {
                raw.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite() && *n >= 0.0)
                    .map(|n| n.trunc() as u64)
            })
            .unwrap_or(default)
    }

    pub fn get_boolean(&self, key: &str, default: bool) -> bool {
        match self.lock().get(key).map(String::as_str) {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }

    /// JSON value stored under `key`; missing or invalid data yields `None`
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.lock();
        let raw = entries.get(key)?;

        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring unreadable stored value");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value.into());
        self.flush(&entries);
    }

    /// Write several keys with a single flush
    pub fn set_many(&self, values: &[(&str, String)]) {
        let mut entries = self.lock();
        for (key, value) in values {
            entries.insert((*key).to_string(), value.clone());
        }
        self.flush(&entries);
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, raw),
            Err(e) => log_persistence_failure(key, &e),
        }
    }

    pub fn remove(&self, key: &str) {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries);
        }
    }

    /// Queue a snapshot; called with the entries still locked so snapshots
    /// reach the writer in mutation order
    fn flush(&self, entries: &BTreeMap<String, String>) {
        let Some(writer) = &self.writer else {
            return;
        };

        if writer.requests.send(WriteRequest::Write(entries.clone())).is_err() {
            log_persistence_failure("local_storage", &"storage writer has stopped");
        }
    }
}

/// Write to a sibling temp file, then rename over the target
fn write_atomically(path: &Path, entries: &BTreeMap<String, String>) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(entries)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}
