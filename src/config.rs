//! Session layer configuration

use crate::error::{Result, SessionError};
use crate::machine::Machine;
use crate::store::SessionStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for render loops, session lifetimes, and snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Extra render passes allowed before a render is considered stuck
    #[serde(default = "default_max_reruns")]
    pub max_reruns: u32,

    /// Seconds without interaction before a session may be evicted
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Directory for session snapshots (no persistence when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<PathBuf>,

    /// Log every transition of machines built via `SessionConfig::machine`
    #[serde(default)]
    pub log_transitions: bool,
}

fn default_max_reruns() -> u32 {
    8
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_reruns: default_max_reruns(),
            idle_timeout_secs: default_idle_timeout_secs(),
            snapshot_dir: None,
            log_transitions: false,
        }
    }
}

impl SessionConfig {
    /// Load and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SessionError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Self = serde_json::from_str(&json).map_err(|e| {
            SessionError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make sessions unusable
    pub fn validate(&self) -> Result<()> {
        if self.max_reruns == 0 {
            return Err(SessionError::Config(
                "maxReruns must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout_secs == 0 {
            return Err(SessionError::Config(
                "idleTimeoutSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Idle timeout as a `Duration`
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Build a machine with this config's logging default
    pub fn machine<'a, S>(
        &self,
        store: &'a dyn SessionStore,
        key: impl Into<String>,
        initial: S,
    ) -> Result<Machine<'a, S>>
    where
        S: Serialize + DeserializeOwned,
    {
        Ok(Machine::new(store, key, initial)?.with_logging(self.log_transitions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySession;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_reruns, 8);
        assert_eq!(config.idle_timeout(), Duration::from_secs(1800));
        assert!(config.snapshot_dir.is_none());
        assert!(!config.log_transitions);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"maxReruns": 3, "logTransitions": true}"#).unwrap();
        assert_eq!(config.max_reruns, 3);
        assert_eq!(config.idle_timeout_secs, 1800);
        assert!(config.log_transitions);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = SessionConfig {
            max_reruns: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SessionError::Config(_))));

        let config = SessionConfig {
            idle_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = std::env::temp_dir().join(format!("a3s-session-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.json");
        std::fs::write(
            &path,
            r#"{"maxReruns": 4, "idleTimeoutSecs": 60, "snapshotDir": "/tmp/snaps"}"#,
        )
        .unwrap();

        let config = SessionConfig::from_file(&path).unwrap();
        assert_eq!(config.max_reruns, 4);
        assert_eq!(config.idle_timeout_secs, 60);
        assert_eq!(config.snapshot_dir, Some(PathBuf::from("/tmp/snaps")));

        std::fs::write(&path, r#"{"maxReruns": 0}"#).unwrap();
        assert!(SessionConfig::from_file(&path).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_from_file_missing() {
        let result = SessionConfig::from_file("/tmp/nonexistent-a3s-session-config.json");
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[test]
    fn test_machine_builder() {
        let session = MemorySession::new();
        let config = SessionConfig {
            log_transitions: true,
            ..Default::default()
        };
        let m = config.machine(&session, "auth_state", "form".to_string()).unwrap();
        assert_eq!(m.current().unwrap(), "form");
    }
}
