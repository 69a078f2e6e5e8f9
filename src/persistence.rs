//! Snapshot persistence: the on-disk format, the store abstraction and the
//! debounced background writer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::models::{AnswerRecord, QuestionId, Settings, Stats};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub settings: Settings,
    pub stats: Stats,
    pub answers: BTreeMap<QuestionId, AnswerRecord>,
    pub current_index: usize,
}

pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Snapshot>, PersistenceError>;
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;
}

/// Loads the stored snapshot, falling back to defaults when it is missing or
/// unreadable.
pub fn load_or_default(store: &dyn SnapshotStore) -> Snapshot {
    match store.load() {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => Snapshot::default(),
        Err(err) => {
            warn!("failed to read snapshot, continuing with defaults: {}", err);
            Snapshot::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(PersistenceError::Corrupt)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let serialized = serde_json::to_vec_pretty(snapshot).map_err(PersistenceError::Encode)?;
        let write_err = |source: std::io::Error| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }
}

/// Keeps the serialized snapshot in memory. Used when no state path is
/// configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    raw: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let raw = self.raw.lock().unwrap_or_else(|e| e.into_inner());
        raw.as_deref()
            .map(serde_json::from_str::<Snapshot>)
            .transpose()
            .map_err(PersistenceError::Corrupt)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let serialized = serde_json::to_string(snapshot).map_err(PersistenceError::Encode)?;
        *self.raw.lock().unwrap_or_else(|e| e.into_inner()) = Some(serialized);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Background writer that coalesces snapshots arriving within one debounce
/// window into a single save.
pub struct PersistScheduler {
    tx: mpsc::UnboundedSender<Snapshot>,
    task: JoinHandle<()>,
}

impl PersistScheduler {
    pub fn spawn(store: Arc<dyn SnapshotStore>, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_writer(store, debounce, rx));
        Self { tx, task }
    }

    pub fn schedule(&self, snapshot: Snapshot) {
        if self.tx.send(snapshot).is_err() {
            warn!("snapshot writer has stopped, dropping snapshot");
        }
    }

    /// Flushes the last pending snapshot and stops the writer.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.task.await {
            warn!("snapshot writer ended abnormally: {}", err);
        }
    }
}

async fn run_writer(
    store: Arc<dyn SnapshotStore>,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<Snapshot>,
) {
    while let Some(mut latest) = rx.recv().await {
        tokio::time::sleep(debounce).await;
        while let Ok(next) = rx.try_recv() {
            latest = next;
        }
        let store = store.clone();
        match tokio::task::spawn_blocking(move || store.save(&latest)).await {
            Ok(Ok(())) => debug!("snapshot saved"),
            Ok(Err(err)) => warn!("failed to save snapshot: {}", err),
            Err(err) => warn!("snapshot save task failed: {}", err),
        }
    }
}
