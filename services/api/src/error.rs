//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use crate::credentials::CredentialError;

/// The primary error type for the `anki_sync_api` service.
///
/// Request-time failures never reach this type; handlers answer them with a
/// status code. What is left is what can stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The credential file could not be read or written.
    #[error("Credential store error: {0}")]
    Credential(#[from] CredentialError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
