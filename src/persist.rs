//! Session snapshot persistence
//!
//! Sessions live in memory for the lifetime of a connection. A
//! `SnapshotStore` lets the host save a session when the connection ends and
//! resume it on reconnect. Snapshot entries can be sealed with a
//! `SnapshotCipher`.

use crate::crypto::{SealedEntries, SnapshotCipher};
use crate::error::{Result, SessionError};
use crate::store::SessionStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Entries of a snapshot, in the clear or sealed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum SnapshotEntries {
    Plain(HashMap<String, Value>),
    Sealed(SealedEntries),
}

/// Serialized image of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session the entries belong to
    pub session_id: String,

    /// When the snapshot was taken
    pub saved_at: DateTime<Utc>,

    pub entries: SnapshotEntries,
}

impl SessionSnapshot {
    /// Capture every entry of a session
    pub fn capture(store: &dyn SessionStore) -> Result<Self> {
        Ok(Self {
            session_id: store.id().to_string(),
            saved_at: Utc::now(),
            entries: SnapshotEntries::Plain(store.snapshot()?),
        })
    }

    /// Whether the entries are sealed
    pub fn is_sealed(&self) -> bool {
        matches!(self.entries, SnapshotEntries::Sealed(_))
    }

    /// Seal the entries for this snapshot's session; no-op if already sealed
    pub fn seal(self, cipher: &dyn SnapshotCipher) -> Result<Self> {
        let entries = match self.entries {
            SnapshotEntries::Plain(plain) => {
                SnapshotEntries::Sealed(cipher.seal(&self.session_id, &plain)?)
            }
            sealed => sealed,
        };
        Ok(Self { entries, ..self })
    }

    /// Open sealed entries for this snapshot's session; no-op if plain
    pub fn open(self, cipher: &dyn SnapshotCipher) -> Result<Self> {
        let entries = match self.entries {
            SnapshotEntries::Sealed(sealed) => {
                SnapshotEntries::Plain(cipher.open(&self.session_id, &sealed)?)
            }
            plain => plain,
        };
        Ok(Self { entries, ..self })
    }

    /// Plaintext entries; fails on sealed snapshots
    pub fn into_entries(self) -> Result<HashMap<String, Value>> {
        match self.entries {
            SnapshotEntries::Plain(entries) => Ok(entries),
            SnapshotEntries::Sealed(sealed) => Err(SessionError::Crypto(format!(
                "Snapshot for '{}' is sealed with '{}' and no cipher is configured",
                self.session_id, sealed.key_id
            ))),
        }
    }
}

/// Trait for persisting session snapshots by session id
pub trait SnapshotStore: Send + Sync {
    /// Save a snapshot, replacing any previous one for the same session
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;

    /// Load the snapshot of a session, if any
    fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>>;

    /// Remove the snapshot of a session; returns whether one existed
    fn remove(&self, session_id: &str) -> Result<bool>;
}

/// Session ids become file names, so only `[A-Za-z0-9_-]` is accepted
fn validate_session_id(session_id: &str) -> Result<()> {
    let plain = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !plain {
        return Err(SessionError::Persistence(format!(
            "Invalid session id '{}'",
            session_id
        )));
    }
    Ok(())
}

/// JSON file-based snapshot store
///
/// One `<session-id>.json` file per session under a directory.
/// Atomic writes via temp file + rename to prevent corruption.
pub struct FileSnapshotStore {
    dir: PathBuf,
    cipher: Option<Arc<dyn SnapshotCipher>>,
}

impl FileSnapshotStore {
    /// Create a snapshot store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cipher: None,
        }
    }

    /// Seal entries on save and open them on load
    pub fn with_cipher(mut self, cipher: Arc<dyn SnapshotCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Snapshot directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a session id
    ///
    /// Fails for ids that are not a single plain file name component.
    pub fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{}.json", session_id)))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let path = self.path_for(&snapshot.session_id)?;
        let snapshot = match &self.cipher {
            Some(cipher) => snapshot.clone().seal(cipher.as_ref())?,
            None => snapshot.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        let tmp_path = path.with_extension("tmp");

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            SessionError::Persistence(format!(
                "Failed to create snapshot directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        std::fs::write(&tmp_path, json).map_err(|e| {
            SessionError::Persistence(format!(
                "Failed to write snapshot file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        std::fs::rename(&tmp_path, &path).map_err(|e| {
            SessionError::Persistence(format!(
                "Failed to rename snapshot file {} → {}: {}",
                tmp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::debug!(
            path = %path.display(),
            sealed = snapshot.is_sealed(),
            "Snapshot saved"
        );
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path).map_err(|e| {
            SessionError::Persistence(format!(
                "Failed to read snapshot file {}: {}",
                path.display(),
                e
            ))
        })?;

        let snapshot: SessionSnapshot = serde_json::from_str(&json).map_err(|e| {
            SessionError::Persistence(format!(
                "Failed to parse snapshot file {}: {}",
                path.display(),
                e
            ))
        })?;

        if snapshot.session_id != session_id {
            return Err(SessionError::Persistence(format!(
                "Snapshot file {} belongs to session '{}'",
                path.display(),
                snapshot.session_id
            )));
        }

        let snapshot = match &self.cipher {
            Some(cipher) => snapshot.open(cipher.as_ref())?,
            None => snapshot,
        };
        tracing::debug!(path = %path.display(), "Snapshot loaded");
        Ok(Some(snapshot))
    }

    fn remove(&self, session_id: &str) -> Result<bool> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| {
            SessionError::Persistence(format!(
                "Failed to remove snapshot file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(true)
    }
}

/// In-memory snapshot store for testing
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: std::sync::RwLock<HashMap<String, SessionSnapshot>>,
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().map_err(|e| {
            SessionError::Lock(format!("Failed to acquire snapshot lock: {}", e))
        })?;
        snapshots.insert(snapshot.session_id.clone(), snapshot.clone());
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        let snapshots = self.snapshots.read().map_err(|e| {
            SessionError::Lock(format!("Failed to acquire snapshot lock: {}", e))
        })?;
        Ok(snapshots.get(session_id).cloned())
    }

    fn remove(&self, session_id: &str) -> Result<bool> {
        let mut snapshots = self.snapshots.write().map_err(|e| {
            SessionError::Lock(format!("Failed to acquire snapshot lock: {}", e))
        })?;
        Ok(snapshots.remove(session_id).is_some())
    }
}
