//! Session store abstraction
//!
//! A `SessionStore` is the per-connection key-value map every machine reads
//! and writes. Hosts inject one store per user session; nothing in this
//! crate reaches for a global.

use crate::error::{Result, SessionError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Separator between a machine key and its auxiliary variable names
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Build the session key of an auxiliary variable: `{key}__{name}`
pub fn namespaced(key: &str, name: &str) -> String {
    format!("{}{}{}", key, NAMESPACE_SEPARATOR, name)
}

/// String-keyed session storage
///
/// Reads and writes are immediately visible to subsequent calls. Stores are
/// shared by reference across a render pass, so every method takes `&self`.
pub trait SessionStore: Send + Sync {
    /// Session identifier
    fn id(&self) -> &str;

    /// Get a value
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Set a value, replacing any previous one
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Set a value only if the key is absent; returns whether it wrote
    fn set_if_absent(&self, key: &str, value: Value) -> Result<bool>;

    /// Delete a value; returns the removed value
    fn delete(&self, key: &str) -> Result<Option<Value>>;

    /// All keys starting with `prefix`
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// All entries whose key starts with `prefix`
    fn entries_with_prefix(&self, prefix: &str) -> Result<HashMap<String, Value>>;

    /// Delete every `{key}__*` entry and set `key` to `value`
    ///
    /// Returns the number of auxiliary entries removed. Implementations
    /// must make both steps visible together.
    fn reset_namespace(&self, key: &str, value: Value) -> Result<usize>;

    /// Copy of every entry
    fn snapshot(&self) -> Result<HashMap<String, Value>>;

    /// Replace every entry
    fn restore(&self, entries: HashMap<String, Value>) -> Result<()>;

    /// Number of entries
    fn len(&self) -> Result<usize>;

    /// Whether the session holds no entries
    fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }
}

/// In-memory session store
///
/// One `HashMap` behind a `RwLock`. Lost on drop unless snapshotted
/// through a `SnapshotStore`.
pub struct MemorySession {
    id: String,
    entries: RwLock<HashMap<String, Value>>,
}

impl MemorySession {
    /// Create an empty session with a fresh `session-<uuid>` id
    pub fn new() -> Self {
        Self::with_id(format!("session-{}", uuid::Uuid::new_v4()))
    }

    /// Create an empty session with a caller-chosen id
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session pre-populated from a snapshot
    pub fn from_entries(id: impl Into<String>, entries: HashMap<String, Value>) -> Self {
        Self {
            id: id.into(),
            entries: RwLock::new(entries),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Value>>> {
        self.entries
            .read()
            .map_err(|e| SessionError::Lock(format!("Failed to acquire session lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Value>>> {
        self.entries
            .write()
            .map_err(|e| SessionError::Lock(format!("Failed to acquire session lock: {}", e)))
    }
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.write()?.insert(key.to_string(), value);
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: Value) -> Result<bool> {
        let mut entries = self.write()?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.write()?.remove(key))
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn entries_with_prefix(&self, prefix: &str) -> Result<HashMap<String, Value>> {
        Ok(self
            .read()?
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn reset_namespace(&self, key: &str, value: Value) -> Result<usize> {
        let prefix = namespaced(key, "");
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(&prefix));
        let removed = before - entries.len();
        entries.insert(key.to_string(), value);

        tracing::debug!(session = %self.id, key = %key, removed, "Namespace reset");
        Ok(removed)
    }

    fn snapshot(&self) -> Result<HashMap<String, Value>> {
        Ok(self.read()?.clone())
    }

    fn restore(&self, entries: HashMap<String, Value>) -> Result<()> {
        *self.write()? = entries;
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_namespaced_key() {
        assert_eq!(namespaced("auth_state", "profile"), "auth_state__profile");
        assert_eq!(namespaced("a", ""), "a__");
    }

    #[test]
    fn test_session_id_prefix() {
        let session = MemorySession::new();
        assert!(session.id().starts_with("session-"));
        assert_ne!(session.id(), MemorySession::new().id());
    }

    #[test]
    fn test_set_get_delete() {
        let session = MemorySession::default();
        assert_eq!(session.get("k").unwrap(), None);

        session.set("k", json!("v")).unwrap();
        assert_eq!(session.get("k").unwrap(), Some(json!("v")));

        assert_eq!(session.delete("k").unwrap(), Some(json!("v")));
        assert_eq!(session.get("k").unwrap(), None);
        assert_eq!(session.delete("k").unwrap(), None);
    }

    #[test]
    fn test_set_if_absent() {
        let session = MemorySession::default();
        assert!(session.set_if_absent("k", json!(1)).unwrap());
        assert!(!session.set_if_absent("k", json!(2)).unwrap());
        assert_eq!(session.get("k").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_prefix_scans() {
        let session = MemorySession::default();
        session.set("a", json!("s")).unwrap();
        session.set("a__x", json!(1)).unwrap();
        session.set("a__y", json!(2)).unwrap();
        session.set("ab__x", json!(3)).unwrap();

        let mut keys = session.keys_with_prefix("a__").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a__x", "a__y"]);

        let entries = session.entries_with_prefix("a__").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["a__y"], json!(2));
    }

    #[test]
    fn test_reset_namespace() {
        let session = MemorySession::default();
        session.set("a", json!("later")).unwrap();
        session.set("a__x", json!(1)).unwrap();
        session.set("a__y", json!(2)).unwrap();
        session.set("b__x", json!(3)).unwrap();

        let removed = session.reset_namespace("a", json!("start")).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(session.get("a").unwrap(), Some(json!("start")));
        assert_eq!(session.get("a__x").unwrap(), None);
        assert_eq!(session.get("b__x").unwrap(), Some(json!(3)));
    }

    #[test]
    fn test_snapshot_restore() {
        let session = MemorySession::default();
        session.set("k", json!({"n": 1})).unwrap();
        let snap = session.snapshot().unwrap();

        let other = MemorySession::default();
        other.set("stale", json!(true)).unwrap();
        other.restore(snap).unwrap();

        assert_eq!(other.len().unwrap(), 1);
        assert_eq!(other.get("k").unwrap(), Some(json!({"n": 1})));
        assert!(!other.is_empty().unwrap());
        assert!(MemorySession::default().is_empty().unwrap());
    }
}
