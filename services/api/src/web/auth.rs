//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: API-key login and refresh-token rotation.

use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::tokens::{TokenError, TokenIssuer};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// The error half of every handler in this service.
pub type Rejection = (StatusCode, Json<MessageResponse>);

pub fn reject(status: StatusCode, message: impl Into<String>) -> Rejection {
    (
        status,
        Json(MessageResponse {
            message: message.into(),
        }),
    )
}

//=========================================================================================
// API Key Hashing
//=========================================================================================

/// Checks a login API key against the Argon2 PHC string kept in the store.
pub fn verify_api_key(api_key: &str, hashed: &[u8]) -> bool {
    let Ok(encoded) = std::str::from_utf8(hashed) else {
        return false;
    };
    let Ok(parsed) = PasswordHash::new(encoded) else {
        error!("Stored API key hash is malformed");
        return false;
    };
    Argon2::default()
        .verify_password(api_key.as_bytes(), &parsed)
        .is_ok()
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/v1/login - Exchange the server API key for a token pair
#[utoipa::path(
    post,
    path = "/api/v1/login",
    request_body = LoginRequest,
    responses(
        (status = 201, description = "Tokens issued", body = TokenPairResponse),
        (status = 401, description = "No API key supplied", body = MessageResponse),
        (status = 403, description = "API key does not match", body = MessageResponse),
        (status = 500, description = "Server credentials are not configured", body = MessageResponse)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, Rejection> {
    // 1. An API key must be present
    let key = req
        .key
        .filter(|key| !key.is_empty())
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Could not verify!"))?;

    // 2. Compare against the stored hash
    let hashed = state.credentials.hashed_api_key().ok_or_else(|| {
        error!("Login attempted but no API key hash is configured");
        reject(StatusCode::INTERNAL_SERVER_ERROR, "Server API key is not configured")
    })?;
    if !verify_api_key(&key, &hashed) {
        warn!("Login rejected: API key mismatch");
        return Err(reject(StatusCode::FORBIDDEN, "Could not verify API key!"));
    }

    // 3. Issue the pair and record the new refresh token on disk
    let issuer = issuer_for(&state)?;
    let response = issue_pair(&issuer)?;
    state.persist_credentials();
    info!("Login succeeded, token pair issued");

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/token/refresh - Trade the current refresh token for a new pair
#[utoipa::path(
    post,
    path = "/api/v1/token/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 201, description = "Tokens rotated", body = TokenPairResponse),
        (status = 401, description = "Refresh token expired, invalid or rotated out", body = MessageResponse),
        (status = 500, description = "Server credentials are not configured", body = MessageResponse)
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let issuer = issuer_for(&state)?;

    // Verifies the presented token and revokes it in the same step.
    let refresh_token = issuer
        .rotate_refresh(&req.refresh_token)
        .map_err(|e| match e {
            TokenError::Encoding(_) => issue_failed(e),
            e => reject(StatusCode::UNAUTHORIZED, e.to_string()),
        })?;
    let access_token = issuer.issue_access().map_err(issue_failed)?;
    state.persist_credentials();
    info!("Refresh token rotated");

    Ok((
        StatusCode::CREATED,
        Json(TokenPairResponse {
            access_token,
            refresh_token,
        }),
    ))
}

//=========================================================================================
// Helpers
//=========================================================================================

pub(crate) fn issuer_for(state: &AppState) -> Result<TokenIssuer, Rejection> {
    state.token_issuer().map_err(|e| {
        error!("Failed to build token issuer: {}", e);
        reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

fn issue_pair(issuer: &TokenIssuer) -> Result<TokenPairResponse, Rejection> {
    Ok(TokenPairResponse {
        access_token: issuer.issue_access().map_err(issue_failed)?,
        refresh_token: issuer.issue_refresh().map_err(issue_failed)?,
    })
}

fn issue_failed(e: TokenError) -> Rejection {
    error!("Failed to issue tokens: {}", e);
    reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to issue tokens")
}
