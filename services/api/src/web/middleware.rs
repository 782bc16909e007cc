//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use anki_sync_core::TokenType;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::web::auth::{issuer_for, reject, Rejection};
use crate::web::state::AppState;

/// Header carrying the access token.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// Middleware that validates the access token header.
///
/// If valid, inserts the token's claims into request extensions for handlers to use.
/// If missing or invalid, returns 401 Unauthorized with the reason.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Rejection> {
    // 1. Extract the token header
    let token = req
        .headers()
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "A valid token is missing!"))?;

    // 2. Verify it as an access token
    let claims = issuer_for(&state)?
        .verify(token, TokenType::Access)
        .map_err(|e| {
            debug!("Rejected access token: {}", e);
            reject(StatusCode::UNAUTHORIZED, e.to_string())
        })?;

    // 3. Insert claims into request extensions
    req.extensions_mut().insert(claims);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}
