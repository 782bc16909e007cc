//! crates/anki_sync_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the bridge's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the remote sync protocol, the credential vault and the clock.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{MediaSyncStatus, SessionAuth, SyncOutcome, SyncRequired};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., network, auth).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The remote collection-sync primitives. Every call is opaque RPC; errors are
/// surfaced as-is and never retried by the core.
#[async_trait]
pub trait SyncService: Send + Sync {
    /// Cheap check: does anything need to move at all?
    async fn sync_status(&self, auth: &SessionAuth) -> PortResult<SyncRequired>;

    /// Runs a sync attempt. With `commit == false` the server only reports what it
    /// would need; with `commit == true` the bidirectional sync is carried out.
    async fn sync_collection(&self, auth: &SessionAuth, commit: bool) -> PortResult<SyncOutcome>;

    /// One-directional, destructive replace of one side with the other.
    async fn full_transfer(&self, auth: &SessionAuth, upload: bool) -> PortResult<()>;

    async fn start_media_sync(&self, auth: &SessionAuth) -> PortResult<()>;

    async fn media_sync_status(&self) -> PortResult<MediaSyncStatus>;
}

/// Where the current AnkiWeb session lives between sync cycles.
pub trait SessionRepository: Send + Sync {
    fn anki_session(&self) -> Option<SessionAuth>;
    fn set_anki_session(&self, session: SessionAuth);
}

/// Paces the media-sync poll loop.
#[async_trait]
pub trait PollPacer: Send + Sync {
    /// Waits one tick before the next poll.
    async fn wait(&self);
}

/// A `PollPacer` that sleeps on the tokio timer.
#[derive(Debug, Clone, Copy)]
pub struct IntervalPacer {
    period: Duration,
}

impl IntervalPacer {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl Default for IntervalPacer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl PollPacer for IntervalPacer {
    async fn wait(&self) {
        tokio::time::sleep(self.period).await;
    }
}
