//! Per-connection session registry
//!
//! `SessionManager` owns one `MemorySession` per client connection: created
//! on first interaction, destroyed when the connection ends or goes idle.
//! With a `SnapshotStore` configured, closed sessions are saved and can be
//! resumed by id.

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::persist::{FileSnapshotStore, SessionSnapshot, SnapshotStore};
use crate::store::{MemorySession, SessionStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Status of a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session id
    pub id: String,
    /// When the session was opened or resumed
    pub created_at: DateTime<Utc>,
    /// Last `open`, `get`, or `resume` of this session
    pub last_seen: DateTime<Utc>,
    /// Number of entries in the session
    pub entries: usize,
}

struct Entry {
    session: Arc<MemorySession>,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl Entry {
    fn new(session: Arc<MemorySession>) -> Self {
        let now = Utc::now();
        Self {
            session,
            created_at: now,
            last_seen: now,
        }
    }
}

/// Registry of live sessions
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Entry>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    idle_timeout: Duration,
}

impl SessionManager {
    /// Create a manager without persistence
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            snapshots: None,
            idle_timeout,
        }
    }

    /// Create a manager from config
    ///
    /// A `snapshotDir` enables file snapshots in that directory.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let mut manager = Self::new(config.idle_timeout());
        if let Some(dir) = &config.snapshot_dir {
            manager.snapshots = Some(Arc::new(FileSnapshotStore::new(dir)));
        }
        Ok(manager)
    }

    /// Save sessions to `store` when they are closed
    pub fn with_snapshots(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Open a fresh session
    pub async fn open(&self) -> Arc<MemorySession> {
        let session = Arc::new(MemorySession::new());
        let id = session.id().to_string();

        self.sessions
            .write()
            .await
            .insert(id.clone(), Entry::new(session.clone()));

        tracing::info!(session = %id, "Session opened");
        session
    }

    /// Get a live session and mark it as seen
    pub async fn get(&self, id: &str) -> Result<Arc<MemorySession>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        entry.last_seen = Utc::now();
        Ok(entry.session.clone())
    }

    /// Get a live session, or rebuild it from its snapshot
    ///
    /// Concurrent resumes of the same id share one session: whichever load
    /// finishes first is registered, later ones get the registered session.
    pub async fn resume(&self, id: &str) -> Result<Arc<MemorySession>> {
        if let Ok(session) = self.get(id).await {
            return Ok(session);
        }

        let store = self
            .snapshots
            .as_ref()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let snapshot = store
            .load(id)?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let entries = snapshot.into_entries()?;

        let mut sessions = self.sessions.write().await;
        let mut rebuilt = false;
        let entry = sessions.entry(id.to_string()).or_insert_with(|| {
            rebuilt = true;
            Entry::new(Arc::new(MemorySession::from_entries(id, entries)))
        });
        entry.last_seen = Utc::now();
        let session = entry.session.clone();
        drop(sessions);

        if rebuilt {
            tracing::info!(session = %id, "Session resumed from snapshot");
        }
        Ok(session)
    }

    /// Save a live session's snapshot without closing it
    pub async fn persist(&self, id: &str) -> Result<()> {
        let store = self.snapshots.as_ref().ok_or_else(|| {
            SessionError::Config("No snapshot store configured".to_string())
        })?;
        let session = {
            let sessions = self.sessions.read().await;
            sessions
                .get(id)
                .map(|e| e.session.clone())
                .ok_or_else(|| SessionError::NotFound(id.to_string()))?
        };
        store.save(&SessionSnapshot::capture(&*session)?)
    }

    /// Destroy a session; returns whether it was live
    ///
    /// The session is snapshotted first when persistence is configured. A
    /// failed save is logged and the session is closed anyway.
    pub async fn close(&self, id: &str) -> bool {
        let entry = self.sessions.write().await.remove(id);
        match entry {
            Some(entry) => {
                self.retire(id, entry);
                true
            }
            None => false,
        }
    }

    /// Close every session idle for longer than the idle timeout
    ///
    /// Idleness is checked under the same write lock that removes the
    /// entries, so a session touched before the sweep gets the lock stays
    /// live. Returns the evicted ids.
    pub async fn evict_idle(&self, now: DateTime<Utc>) -> Vec<String> {
        let removed: Vec<(String, Entry)> = {
            let mut sessions = self.sessions.write().await;
            let idle: Vec<String> = sessions
                .iter()
                .filter(|(_, entry)| self.is_idle(entry, now))
                .map(|(id, _)| id.clone())
                .collect();
            idle.into_iter()
                .filter_map(|id| sessions.remove_entry(&id))
                .collect()
        };

        let mut evicted = Vec::with_capacity(removed.len());
        for (id, entry) in removed {
            self.retire(&id, entry);
            evicted.push(id);
        }

        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "Idle sessions evicted");
        }
        evicted
    }

    fn is_idle(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        (now - entry.last_seen)
            .to_std()
            .map(|elapsed| elapsed > self.idle_timeout)
            .unwrap_or(false)
    }

    /// Snapshot a session already removed from the registry
    fn retire(&self, id: &str, entry: Entry) {
        if let Some(store) = &self.snapshots {
            let saved = SessionSnapshot::capture(&*entry.session)
                .and_then(|snapshot| store.save(&snapshot));
            if let Err(e) = saved {
                tracing::warn!(session = %id, error = %e, "Failed to save session snapshot");
            }
        }
        tracing::info!(session = %id, "Session closed");
    }

    /// Status of every live session
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(id, entry)| SessionInfo {
                id: id.clone(),
                created_at: entry.created_at,
                last_seen: entry.last_seen,
                entries: entry.session.len().unwrap_or(0),
            })
            .collect()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is live
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
