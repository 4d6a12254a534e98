//! Session snapshots on disk.
//!
//! Each store is saved to its own flat JSON file in the data directory:
//! `queue.json`, `playback.json` and `connection.json`. Writes are atomic
//! (temp file + rename). There are no cross-file transactions; a crash
//! between two writes can leave them from slightly different moments.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::ingest::ConnectionState;
use crate::playback::PlaybackSettings;
use crate::queue::{QueueController, QueueSnapshot};
use crate::utils::now_millis;

/// Queue snapshot file name.
pub const QUEUE_FILE: &str = "queue.json";

/// Playback settings file name.
pub const PLAYBACK_FILE: &str = "playback.json";

/// Connection snapshot file name.
pub const CONNECTION_FILE: &str = "connection.json";

/// Errors reading or writing session files.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenient Result alias for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Last known state of the ingestion channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub url: String,
    /// Unix timestamp in milliseconds.
    pub saved_at: u64,
}

/// Reads and writes session files in one directory.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Opens `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| PersistenceError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save_json<T: Serialize>(&self, file: &str, value: &T) -> PersistenceResult<()> {
        let path = self.dir.join(file);
        let io_err = |source| PersistenceError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        let contents = serde_json::to_string_pretty(value).map_err(|source| {
            PersistenceError::Json {
                path: path.clone(),
                source,
            }
        })?;

        let temp_path = self.dir.join(format!("{}.tmp", file));
        std::fs::write(&temp_path, contents).map_err(io_err)?;
        std::fs::rename(&temp_path, &path).map_err(io_err)
    }

    /// Returns `Ok(None)` when the file does not exist.
    fn load_json<T: DeserializeOwned>(&self, file: &str) -> PersistenceResult<Option<T>> {
        let path = self.dir.join(file);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PersistenceError::Io { path, source }),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| PersistenceError::Json { path, source })
    }

    /// Loads a file, logging and discarding unreadable contents.
    fn load_or_warn<T: DeserializeOwned>(&self, file: &str) -> Option<T> {
        match self.load_json(file) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("[Persistence] Ignoring saved session file: {}", e);
                None
            }
        }
    }

    pub fn save_queue(&self, snapshot: &QueueSnapshot) -> PersistenceResult<()> {
        self.save_json(QUEUE_FILE, snapshot)
    }

    pub fn load_queue(&self) -> Option<QueueSnapshot> {
        self.load_or_warn(QUEUE_FILE)
    }

    pub fn save_playback(&self, settings: &PlaybackSettings) -> PersistenceResult<()> {
        self.save_json(PLAYBACK_FILE, settings)
    }

    pub fn load_playback(&self) -> Option<PlaybackSettings> {
        self.load_or_warn(PLAYBACK_FILE)
    }

    pub fn save_connection(&self, snapshot: &ConnectionSnapshot) -> PersistenceResult<()> {
        self.save_json(CONNECTION_FILE, snapshot)
    }

    pub fn load_connection(&self) -> Option<ConnectionSnapshot> {
        self.load_or_warn(CONNECTION_FILE)
    }

    /// Writes queue and playback settings from the controller.
    pub fn save_session(&self, controller: &QueueController) {
        if let Err(e) = self.save_queue(&controller.snapshot()) {
            log::warn!("[Persistence] {}", e);
        }
        if let Err(e) = self.save_playback(&controller.settings()) {
            log::warn!("[Persistence] {}", e);
        }
    }

    /// Restores queue and playback settings into the controller.
    pub fn restore_session(&self, controller: &QueueController) {
        if let Some(settings) = self.load_playback() {
            controller.replace_settings(settings);
        }
        if let Some(snapshot) = self.load_queue() {
            controller.restore(snapshot);
        }
        if let Some(previous) = self.load_connection() {
            log::info!(
                "[Persistence] Previous session ended {:?} on {}",
                previous.state,
                previous.url
            );
        }
    }
}

/// Background task writing session files after changes.
///
/// Queue changes are debounced; connection state changes are written
/// immediately. A final save happens on cancellation.
pub struct Autosave {
    store: Arc<SessionStore>,
    controller: Arc<QueueController>,
    connection: watch::Receiver<ConnectionState>,
    url: String,
    debounce: Duration,
}

impl Autosave {
    pub fn new(
        store: Arc<SessionStore>,
        controller: Arc<QueueController>,
        connection: watch::Receiver<ConnectionState>,
        url: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            controller,
            connection,
            url: url.into(),
            debounce,
        }
    }

    fn save_connection(&self, state: ConnectionState) {
        let snapshot = ConnectionSnapshot {
            state,
            url: self.url.clone(),
            saved_at: now_millis(),
        };
        if let Err(e) = self.store.save_connection(&snapshot) {
            log::warn!("[Persistence] {}", e);
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut revisions = self.controller.subscribe_changes();
        revisions.borrow_and_update();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                changed = revisions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.debounce) => {}
                    }
                    revisions.borrow_and_update();
                    self.store.save_session(&self.controller);
                }

                changed = self.connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *self.connection.borrow_and_update();
                    self.save_connection(state);
                }
            }
        }

        self.store.save_session(&self.controller);
        let state = *self.connection.borrow();
        self.save_connection(state);
        log::debug!("[Persistence] Final session snapshot written");
    }
}
