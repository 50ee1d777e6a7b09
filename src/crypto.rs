//! Sealing session snapshots at rest
//!
//! A sealed snapshot keeps `base64(nonce || ciphertext)` next to the id of
//! the key that produced it. The owning session id is bound as AES-GCM
//! associated data, so a blob lifted out of one session's snapshot does not
//! open under any other session id.

use crate::error::{Result, SessionError};
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// AES-GCM nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// Sealed session entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedEntries {
    /// Keyring entry that sealed the blob
    pub key_id: String,
    /// `base64(nonce || ciphertext)`
    pub blob: String,
}

/// Seals and opens the entries of one session
pub trait SnapshotCipher: Send + Sync {
    /// Seal `entries` for `session_id`
    fn seal(&self, session_id: &str, entries: &HashMap<String, Value>) -> Result<SealedEntries>;

    /// Open entries sealed for `session_id`
    ///
    /// Fails when the blob was sealed for a different session, with an
    /// unknown key, or has been tampered with.
    fn open(&self, session_id: &str, sealed: &SealedEntries) -> Result<HashMap<String, Value>>;
}

/// AES-256-GCM keyring
///
/// New snapshots are sealed with the active key. Older keys stay in the
/// keyring so snapshots written before a rotation still open.
pub struct AesGcmKeyring {
    active: String,
    ciphers: BTreeMap<String, Aes256Gcm>,
}

impl AesGcmKeyring {
    /// Keyring with a single active key
    pub fn new(key_id: impl Into<String>, key: &[u8; 32]) -> Self {
        let active = key_id.into();
        let mut ciphers = BTreeMap::new();
        ciphers.insert(active.clone(), Aes256Gcm::new(&Key::<Aes256Gcm>::from(*key)));
        Self { active, ciphers }
    }

    /// Add a key that opens snapshots but does not seal new ones
    pub fn with_key(mut self, key_id: impl Into<String>, key: &[u8; 32]) -> Self {
        self.ciphers
            .insert(key_id.into(), Aes256Gcm::new(&Key::<Aes256Gcm>::from(*key)));
        self
    }

    /// Seal new snapshots with `key_id` from now on
    pub fn activate(&mut self, key_id: &str) -> Result<()> {
        if !self.ciphers.contains_key(key_id) {
            return Err(SessionError::Crypto(format!(
                "Cannot activate '{}': not in the keyring",
                key_id
            )));
        }
        tracing::info!(from = %self.active, to = %key_id, "Snapshot key rotated");
        self.active = key_id.to_string();
        Ok(())
    }

    pub fn active_key_id(&self) -> &str {
        &self.active
    }

    /// Key ids in the keyring, sorted
    pub fn key_ids(&self) -> Vec<&str> {
        self.ciphers.keys().map(String::as_str).collect()
    }
}

impl SnapshotCipher for AesGcmKeyring {
    fn seal(&self, session_id: &str, entries: &HashMap<String, Value>) -> Result<SealedEntries> {
        let cipher = self.ciphers.get(&self.active).ok_or_else(|| {
            SessionError::Crypto(format!("Active key '{}' missing from keyring", self.active))
        })?;

        let plaintext = serde_json::to_vec(entries)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: &plaintext,
                    aad: session_id.as_bytes(),
                },
            )
            .map_err(|_| {
                SessionError::Crypto(format!("Failed to seal snapshot for '{}'", session_id))
            })?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);

        Ok(SealedEntries {
            key_id: self.active.clone(),
            blob: BASE64.encode(blob),
        })
    }

    fn open(&self, session_id: &str, sealed: &SealedEntries) -> Result<HashMap<String, Value>> {
        let cipher = self.ciphers.get(&sealed.key_id).ok_or_else(|| {
            SessionError::Crypto(format!(
                "Snapshot sealed with '{}', which is not in the keyring",
                sealed.key_id
            ))
        })?;

        let blob = BASE64
            .decode(&sealed.blob)
            .map_err(|e| SessionError::Crypto(format!("Sealed blob is not base64: {}", e)))?;
        if blob.len() <= NONCE_LEN {
            return Err(SessionError::Crypto(format!(
                "Sealed blob too short: {} bytes",
                blob.len()
            )));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);

        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: session_id.as_bytes(),
                },
            )
            .map_err(|_| {
                SessionError::Crypto(format!("Snapshot does not open for session '{}'", session_id))
            })?;

        Ok(serde_json::from_slice(&plaintext)?)
    }
}
