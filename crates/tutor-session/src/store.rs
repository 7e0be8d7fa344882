//! Session persistence.
//!
//! [`FileSessionStore`] keeps one JSON file per session under a state
//! directory:
//!
//! ```text
//! <state_dir>/<session-id>.json   {"version": 1, "session": {...}}
//! <state_dir>/<session-id>.lock   present while a process drives the session
//! ```
//!
//! [`MemorySessionStore`] offers the same contract without touching disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::collaborators::SessionStore;
use crate::error::{Result, TutorError};
use crate::session::{SessionId, SessionState};

/// Version of the on-disk session format.
pub const STATE_VERSION: u32 = 1;

const STATE_EXTENSION: &str = "json";
const LOCK_EXTENSION: &str = "lock";

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    session: &'a SessionState,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    session: serde_json::Value,
}

// ============================================================================
// FileSessionStore
// ============================================================================

/// Stores sessions as JSON files in a directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The state directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the state file for `id`.
    #[must_use]
    pub fn state_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{id}.{STATE_EXTENSION}"))
    }

    /// Path of the lock file for `id`.
    #[must_use]
    pub fn lock_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{id}.{LOCK_EXTENSION}"))
    }

    fn try_create_lock(path: &Path) -> std::io::Result<()> {
        use std::io::Write;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        writeln!(file, "{}", std::process::id()).map_err(|e| {
            let _ = std::fs::remove_file(path);
            e
        })
    }

    /// Removes the lock file at `path` if the process recorded in it has
    /// exited. Returns whether the file was removed.
    fn reclaim_stale_lock(id: &SessionId, path: &Path) -> Result<bool> {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Ok(false);
        };
        // An unreadable PID may belong to a writer that has not flushed yet.
        let Ok(pid) = contents.trim().parse::<u32>() else {
            return Ok(false);
        };
        if process_alive(pid) {
            return Ok(false);
        }

        tracing::warn!(session_id = %id, pid, lock_file = %path.display(), "Removing stale session lock");
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    fn decode(path: &Path, id: &SessionId, contents: &str) -> Result<SessionState> {
        let envelope: Envelope = serde_json::from_str(contents)
            .map_err(|e| TutorError::state_corrupted(path, e.to_string()))?;

        if envelope.version != STATE_VERSION {
            return Err(TutorError::state_corrupted(
                path,
                format!(
                    "unsupported format version {} (expected {STATE_VERSION})",
                    envelope.version
                ),
            ));
        }

        let state: SessionState = serde_json::from_value(envelope.session)
            .map_err(|e| TutorError::state_corrupted(path, e.to_string()))?;
        if state.id != *id {
            return Err(TutorError::state_corrupted(
                path,
                format!("file contains session {} instead of {id}", state.id),
            ));
        }
        Ok(state)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, state: &SessionState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.state_path(&state.id);
        let temp = path.with_extension(format!("{STATE_EXTENSION}.tmp"));
        let json = serde_json::to_vec_pretty(&EnvelopeRef {
            version: STATE_VERSION,
            session: state,
        })?;

        tokio::fs::write(&temp, json).await?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        tracing::debug!(session_id = %state.id, path = %path.display(), "Saved session");
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> Result<Option<SessionState>> {
        let path = self.state_path(id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::decode(&path, id, &contents).map(Some)
    }

    async fn list(&self) -> Result<Vec<SessionId>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STATE_EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<SessionId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, id: &SessionId) -> Result<bool> {
        match tokio::fs::remove_file(self.state_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates `<id>.lock` exclusively, recording this process's PID. A lock
    /// left by a process that is no longer running is reclaimed once.
    fn acquire_lock(&self, id: &SessionId) -> Result<Option<SessionLock>> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.lock_path(id);

        for _ in 0..2 {
            match Self::try_create_lock(&path) {
                Ok(()) => {
                    tracing::debug!(session_id = %id, lock_file = %path.display(), "Acquired session lock");
                    return Ok(Some(SessionLock { path }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if !Self::reclaim_stale_lock(id, &path)? {
                        break;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(TutorError::session_locked(id, path))
    }
}

/// Whether a process with `pid` is still running.
#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// Liveness cannot be checked here, so every recorded holder counts as alive.
#[cfg(not(target_os = "linux"))]
const fn process_alive(_pid: u32) -> bool {
    true
}

/// Guard for a session lock file. Dropping it removes the file.
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock_file = %self.path.display(), error = %e, "Failed to remove session lock");
        }
    }
}

// ============================================================================
// MemorySessionStore
// ============================================================================

/// Keeps sessions in memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionState>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, state: &SessionState) -> Result<()> {
        self.sessions.write().await.insert(state.id, state.clone());
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> Result<Option<SessionState>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<SessionId>> {
        let mut ids: Vec<_> = self.sessions.read().await.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, id: &SessionId) -> Result<bool> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }
}
