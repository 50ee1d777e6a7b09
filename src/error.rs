//! Error types for a3s-session

use thiserror::Error;

/// Errors that can occur in the session layer
#[derive(Debug, Error)]
pub enum SessionError {
    /// Primary state missing for a machine key
    ///
    /// Construction always writes the key, so this only happens when the
    /// session was modified behind the machine's back.
    #[error("State missing for key '{0}'")]
    StateMissing(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Session store lock poisoned
    #[error("Lock error: {0}")]
    Lock(String),

    /// Session not found
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Render loop kept requesting reruns
    #[error("Render did not settle after {limit} reruns")]
    RerunLimit { limit: u32 },

    /// Snapshot read/write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Encryption or decryption failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
