//! crates/anki_sync_core/src/domain.rs
//!
//! Defines the pure, core data structures for the sync bridge.
//! These structs are independent of any transport or storage format.

use serde::{Deserialize, Serialize};
use url::Url;

/// An authenticated AnkiWeb session: the sync host plus the opaque host key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAuth {
    pub endpoint: Url,
    pub token: String,
}

impl SessionAuth {
    pub fn new(endpoint: Url, token: impl Into<String>) -> Self {
        Self {
            endpoint,
            token: token.into(),
        }
    }

    /// Returns a copy of this session bound to `endpoint`, keeping the same token.
    pub fn retarget(&self, endpoint: Url) -> Self {
        Self {
            endpoint,
            token: self.token.clone(),
        }
    }
}

/// Result of the cheap remote status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequired {
    NoChanges,
    SomeChanges,
}

/// The server's verdict on what kind of transfer a sync attempt needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcomeKind {
    NoChanges,
    NormalSync,
    FullUpload,
    FullSync,
    FullDownload,
}

/// What a sync attempt returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub required: SyncOutcomeKind,
    /// Host the server wants subsequent calls sent to. `None` and `""` both
    /// mean "stay where you are".
    pub new_endpoint: Option<String>,
}

impl SyncOutcome {
    pub fn new(required: SyncOutcomeKind) -> Self {
        Self {
            required,
            new_endpoint: None,
        }
    }

    pub fn with_new_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.new_endpoint = Some(endpoint.into());
        self
    }

    /// The migration target, if the server asked for one.
    pub fn migration_target(&self) -> Option<&str> {
        self.new_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
    }
}

/// Snapshot of the remote media-sync job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSyncStatus {
    pub active: bool,
    /// Human-readable progress line, only ever logged.
    pub progress: String,
}

impl MediaSyncStatus {
    pub fn active(progress: impl Into<String>) -> Self {
        Self {
            active: true,
            progress: progress.into(),
        }
    }

    pub fn finished() -> Self {
        Self {
            active: false,
            progress: String::new(),
        }
    }
}

/// The two kinds of bearer token the service hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
