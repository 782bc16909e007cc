//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the plain REST endpoints and the master
//! definition for the OpenAPI specification.

use crate::credentials::CredentialRecord;
use crate::web::auth::{LoginRequest, MessageResponse, RefreshRequest, TokenPairResponse};
use crate::web::state::AppState;
use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        credentials_status_handler,
        crate::web::auth::login_handler,
        crate::web::auth::refresh_handler,
    ),
    components(
        schemas(
            HealthResponse,
            CredentialsStatusResponse,
            LoginRequest,
            RefreshRequest,
            TokenPairResponse,
            MessageResponse
        )
    ),
    tags(
        (name = "Anki Sync Server API", description = "Authentication and credential endpoints in front of AnkiWeb sync.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response Structs
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Which credentials are configured. Never carries the secrets themselves.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct CredentialsStatusResponse {
    pub anki_session: bool,
    pub anki_endpoint: Option<String>,
    pub gcp_tts_api_key: bool,
    pub api_key: bool,
    pub server_secret_key: bool,
    pub refresh_token_issued_at: Option<DateTime<Utc>>,
}

impl From<CredentialRecord> for CredentialsStatusResponse {
    fn from(record: CredentialRecord) -> Self {
        Self {
            anki_endpoint: record
                .anki_session
                .as_ref()
                .map(|session| session.endpoint.to_string()),
            anki_session: record.anki_session.is_some(),
            gcp_tts_api_key: record.gcp_tts_api_key.is_some(),
            api_key: record.hashed_api_key.is_some(),
            server_secret_key: record.server_secret_key.is_some(),
            refresh_token_issued_at: record.refresh_token_created_at,
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness check.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Report which credentials the server currently holds.
#[utoipa::path(
    get,
    path = "/api/v1/credentials",
    responses(
        (status = 200, description = "Credential presence", body = CredentialsStatusResponse),
        (status = 401, description = "Missing or invalid access token", body = MessageResponse)
    ),
    params(
        ("x-access-token" = String, Header, description = "Access token from /api/v1/login.")
    )
)]
pub async fn credentials_status_handler(
    State(state): State<Arc<AppState>>,
) -> Json<CredentialsStatusResponse> {
    Json(state.credentials.snapshot().into())
}
