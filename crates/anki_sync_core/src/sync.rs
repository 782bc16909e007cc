//! crates/anki_sync_core/src/sync.rs
//!
//! The synchronization orchestrator: decides, around every content-mutating
//! operation, whether AnkiWeb needs a sync, which kind, follows server-directed
//! endpoint migrations, and waits for the media sync job to drain.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::{SessionAuth, SyncOutcome, SyncOutcomeKind, SyncRequired};
use crate::ports::{IntervalPacer, PollPacer, PortError, PortResult, SessionRepository, SyncService};

/// Number of media-sync polls (one per pacer tick) before giving up.
pub const DEFAULT_MEDIA_SYNC_TIMEOUT: u32 = 600;

//=========================================================================================
// Errors
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("No AnkiWeb session is configured")]
    MissingSession,

    /// The server wants a destructive full transfer but this cycle may not discard
    /// local data.
    #[error("Failed to sync, force download is not allowed")]
    ForceDownloadNotAllowed,

    #[error("Media sync timed out after {polls} polls")]
    MediaSyncTimeout { polls: u32 },

    #[error("Server redirected sync to an invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// A remote call failed; passed through unmodified.
    #[error("Remote sync call failed: {0}")]
    Remote(#[from] PortError),

    #[error("Collection mutation failed: {0}")]
    Mutation(#[source] PortError),
}

//=========================================================================================
// The Orchestrator
//=========================================================================================

/// Drives one sync cycle at a time against a [`SyncService`].
///
/// The orchestrator itself holds no lock; callers serialise cycles through
/// [`CollectionGate`].
pub struct SyncOrchestrator {
    remote: Arc<dyn SyncService>,
    sessions: Arc<dyn SessionRepository>,
    pacer: Arc<dyn PollPacer>,
    media_sync_timeout: u32,
}

impl SyncOrchestrator {
    pub fn new(remote: Arc<dyn SyncService>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self {
            remote,
            sessions,
            pacer: Arc::new(IntervalPacer::default()),
            media_sync_timeout: DEFAULT_MEDIA_SYNC_TIMEOUT,
        }
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn PollPacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_media_sync_timeout(mut self, polls: u32) -> Self {
        self.media_sync_timeout = polls;
        self
    }

    pub fn media_sync_timeout(&self) -> u32 {
        self.media_sync_timeout
    }

    /// Runs a single sync cycle.
    ///
    /// `allow_force_download` is only set for the sync that precedes a write. The
    /// follow-up sync never silently discards local data: a full sync or full
    /// download request fails with [`SyncError::ForceDownloadNotAllowed`] instead.
    pub async fn run_cycle(&self, allow_force_download: bool) -> Result<(), SyncError> {
        let session = self
            .sessions
            .anki_session()
            .ok_or(SyncError::MissingSession)?;

        if self.remote.sync_status(&session).await? == SyncRequired::NoChanges {
            debug!(endpoint = %session.endpoint, "Collection already in sync");
            return Ok(());
        }

        let outcome = self.remote.sync_collection(&session, false).await?;
        // From here on every call goes to the rebound session, never the original.
        let session = self.rebind(session, &outcome)?;

        match outcome.required {
            SyncOutcomeKind::NoChanges => {
                info!("No collection changes required");
            }
            SyncOutcomeKind::NormalSync => {
                info!("Normal sync required");
                self.remote.sync_collection(&session, true).await?;
            }
            SyncOutcomeKind::FullUpload => {
                info!("No data on server, skipping full upload");
                return Ok(());
            }
            SyncOutcomeKind::FullSync | SyncOutcomeKind::FullDownload => {
                if !allow_force_download {
                    warn!(outcome = ?outcome.required, "Refusing full download outside a pre-write sync");
                    return Err(SyncError::ForceDownloadNotAllowed);
                }
                info!(outcome = ?outcome.required, "Full download required");
                self.remote.full_transfer(&session, false).await?;
            }
        }

        self.sync_media(&session).await
    }

    /// Applies a server-directed endpoint migration by retargeting the current
    /// host key, and records the rebound session for later cycles.
    fn rebind(&self, session: SessionAuth, outcome: &SyncOutcome) -> Result<SessionAuth, SyncError> {
        let Some(target) = outcome.migration_target() else {
            return Ok(session);
        };

        let endpoint = Url::parse(target).map_err(|e| SyncError::InvalidEndpoint {
            endpoint: target.to_string(),
            reason: e.to_string(),
        })?;

        info!(from = %session.endpoint, to = %endpoint, "Sync endpoint migrated");
        let rebound = session.retarget(endpoint);
        self.sessions.set_anki_session(rebound.clone());
        Ok(rebound)
    }

    async fn sync_media(&self, session: &SessionAuth) -> Result<(), SyncError> {
        info!("Syncing media");
        self.remote.start_media_sync(session).await?;

        for poll in 1..=self.media_sync_timeout {
            let status = self.remote.media_sync_status().await?;
            debug!(progress = %status.progress, "Media sync progress");
            if !status.active {
                return Ok(());
            }
            // No tick after the last poll: the budget is spent either way.
            if poll < self.media_sync_timeout {
                self.pacer.wait().await;
            }
        }

        warn!(polls = self.media_sync_timeout, "Media sync did not finish in time");
        Err(SyncError::MediaSyncTimeout {
            polls: self.media_sync_timeout,
        })
    }
}

//=========================================================================================
// CollectionGate (mutate-then-sync under one mutex)
//=========================================================================================

/// Owns a collection handle and serialises every mutate+sync cycle against it.
///
/// The mutex is held across the pre-write sync, the mutation and the follow-up
/// sync, including the media poll loop. Concurrent writers queue.
pub struct CollectionGate<C> {
    collection: Mutex<C>,
    orchestrator: SyncOrchestrator,
}

impl<C: Send> CollectionGate<C> {
    pub fn new(collection: C, orchestrator: SyncOrchestrator) -> Self {
        Self {
            collection: Mutex::new(collection),
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    /// Syncs (allowing a full download), applies `mutation`, then syncs again
    /// (never allowing one).
    ///
    /// A failing follow-up sync does not undo the mutation; the change stays in the
    /// local collection and goes out with the next successful sync.
    pub async fn mutate<T, F>(&self, mutation: F) -> Result<T, SyncError>
    where
        F: FnOnce(&mut C) -> PortResult<T>,
    {
        let mut collection = self.collection.lock().await;

        self.orchestrator.run_cycle(true).await?;
        let value = mutation(&mut *collection).map_err(SyncError::Mutation)?;
        self.orchestrator.run_cycle(false).await?;

        Ok(value)
    }

    /// Runs a sync cycle with no mutation, still under the collection mutex.
    pub async fn sync(&self, allow_force_download: bool) -> Result<(), SyncError> {
        let _collection = self.collection.lock().await;
        self.orchestrator.run_cycle(allow_force_download).await
    }
}
