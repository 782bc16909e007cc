//! services/api/src/credentials.rs
//!
//! The process-wide credential vault: AnkiWeb session, API key hash, server secret,
//! TTS key and refresh-token rotation state.
//!
//! One `CredentialStore` is built at startup and handed (as an `Arc`) to everything
//! that needs it. Every access goes through the readers-writer lock; `save` and
//! `load` hold the write lock for their whole duration so no reader ever sees a
//! half-replaced record.

use anki_sync_core::{RwLock, SessionAuth, SessionRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

//=========================================================================================
// Record and Error Types
//=========================================================================================

/// Everything the vault knows. Persisted as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub anki_session: Option<SessionAuth>,
    pub gcp_tts_api_key: Option<String>,
    /// Argon2 PHC string of the login API key, as bytes.
    pub hashed_api_key: Option<Vec<u8>>,
    pub server_secret_key: Option<String>,
    /// `issued_at` of the only refresh token currently accepted.
    pub refresh_token_created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Credential file is unreadable: {0}")]
    Format(#[from] serde_json::Error),
}

//=========================================================================================
// The Store
//=========================================================================================

#[derive(Debug, Default)]
pub struct CredentialStore {
    record: RwLock<CredentialRecord>,
}

impl CredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(record: CredentialRecord) -> Self {
        Self {
            record: RwLock::new(record),
        }
    }

    /// A consistent copy of the whole record.
    pub fn snapshot(&self) -> CredentialRecord {
        self.record.read().clone()
    }

    // --- Readers ---

    pub fn anki_session(&self) -> Option<SessionAuth> {
        self.record.read().anki_session.clone()
    }

    pub fn gcp_tts_api_key(&self) -> Option<String> {
        self.record.read().gcp_tts_api_key.clone()
    }

    pub fn hashed_api_key(&self) -> Option<Vec<u8>> {
        self.record.read().hashed_api_key.clone()
    }

    pub fn server_secret_key(&self) -> Option<String> {
        self.record.read().server_secret_key.clone()
    }

    pub fn refresh_token_created_at(&self) -> Option<DateTime<Utc>> {
        self.record.read().refresh_token_created_at
    }

    // --- Writers ---

    pub fn set_anki_session(&self, session: impl Into<Option<SessionAuth>>) {
        self.record.write().anki_session = session.into();
    }

    pub fn set_gcp_tts_api_key(&self, api_key: impl Into<Option<String>>) {
        self.record.write().gcp_tts_api_key = api_key.into();
    }

    pub fn set_hashed_api_key(&self, hashed: impl Into<Option<Vec<u8>>>) {
        self.record.write().hashed_api_key = hashed.into();
    }

    pub fn set_server_secret_key(&self, secret: impl Into<Option<String>>) {
        self.record.write().server_secret_key = secret.into();
    }

    pub fn set_refresh_token_created_at(&self, created_at: impl Into<Option<DateTime<Utc>>>) {
        self.record.write().refresh_token_created_at = created_at.into();
    }

    /// Replaces the refresh-token `iat` only if it still equals `current`.
    ///
    /// Returns whether the swap happened. Compare and write share one write lock.
    pub fn replace_refresh_token_created_at(
        &self,
        current: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> bool {
        let mut record = self.record.write();
        if record.refresh_token_created_at != Some(current) {
            return false;
        }
        record.refresh_token_created_at = Some(next);
        true
    }

    // --- Persistence ---

    /// Writes the whole record to `path`. Errors are returned untouched.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CredentialError> {
        let path = path.as_ref();
        let record = self.record.write();
        let encoded = serde_json::to_vec_pretty(&*record)?;
        fs::write(path, encoded)?;
        info!(path = %path.display(), "Credentials saved");
        Ok(())
    }

    /// Replaces the in-memory record with the one stored at `path`.
    ///
    /// On failure the current record is left as it was.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<(), CredentialError> {
        let path = path.as_ref();
        let mut record = self.record.write();
        let bytes = fs::read(path)?;
        *record = serde_json::from_slice(&bytes)?;
        info!(path = %path.display(), "Credentials loaded");
        Ok(())
    }
}

impl SessionRepository for CredentialStore {
    fn anki_session(&self) -> Option<SessionAuth> {
        CredentialStore::anki_session(self)
    }

    fn set_anki_session(&self, session: SessionAuth) {
        CredentialStore::set_anki_session(self, session);
    }
}
