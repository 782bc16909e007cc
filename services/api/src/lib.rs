//! services/api/src/lib.rs
//!
//! Library half of the service: the credential vault, token issuing and the
//! authentication HTTP surface. The binaries in `src/bin` only wire these up.

pub mod config;
pub mod credentials;
pub mod error;
pub mod tokens;
pub mod web;
