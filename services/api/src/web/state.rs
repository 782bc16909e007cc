//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::tokens::{TokenError, TokenIssuer};
use anki_sync_core::{SessionAuth, SessionRepository, SyncOrchestrator, SyncService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub credentials: Arc<CredentialStore>,
}

impl AppState {
    pub fn new(config: Arc<Config>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            config,
            credentials,
        }
    }

    /// A token issuer keyed by the secret currently in the store.
    ///
    /// Built per request so that a credential reload takes effect immediately.
    pub fn token_issuer(&self) -> Result<TokenIssuer, TokenError> {
        Ok(TokenIssuer::from_store(self.credentials.clone())?
            .with_ttls(self.config.access_token_ttl, self.config.refresh_token_ttl))
    }

    /// An orchestrator that reads and rebinds the AnkiWeb session through this
    /// state's credential store. A rebound session is written to the credential file.
    pub fn sync_orchestrator(&self, remote: Arc<dyn SyncService>) -> SyncOrchestrator {
        let sessions = PersistedSessions {
            credentials: self.credentials.clone(),
            path: self.config.credentials_path.clone(),
        };
        SyncOrchestrator::new(remote, Arc::new(sessions))
            .with_media_sync_timeout(self.config.media_sync_timeout)
    }

    /// Writes the whole store to the configured credential file.
    pub fn persist_credentials(&self) {
        persist(&self.credentials, &self.config.credentials_path);
    }
}

//=========================================================================================
// Write-through session repository
//=========================================================================================

/// The credential store as the orchestrator's [`SessionRepository`], saving to
/// disk after every session change so a migration survives a restart.
struct PersistedSessions {
    credentials: Arc<CredentialStore>,
    path: PathBuf,
}

impl SessionRepository for PersistedSessions {
    fn anki_session(&self) -> Option<SessionAuth> {
        self.credentials.anki_session()
    }

    fn set_anki_session(&self, session: SessionAuth) {
        self.credentials.set_anki_session(session);
        persist(&self.credentials, &self.path);
    }
}

/// A failed save is logged and otherwise ignored; memory stays authoritative
/// until the next successful write.
fn persist(credentials: &CredentialStore, path: &Path) {
    if let Err(e) = credentials.save(path) {
        error!("Failed to save credentials to {}: {}", path.display(), e);
    }
}
