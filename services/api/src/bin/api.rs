//! services/api/src/bin/api.rs

use anki_sync_api::{
    config::Config,
    credentials::CredentialStore,
    error::ApiError,
    web::{router, state::AppState},
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Load the Credential Vault ---
    info!(
        "Loading credentials from {}",
        config.credentials_path.display()
    );
    let credentials = Arc::new(CredentialStore::new());
    credentials.load(&config.credentials_path).map_err(|e| {
        error!(
            "Could not load {}; provision the credential file before starting the server",
            config.credentials_path.display()
        );
        e
    })?;
    if credentials.anki_session().is_none() {
        info!("No AnkiWeb session stored; sync cycles will fail until one is provided");
    }

    // --- 3. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState::new(config.clone(), credentials));
    let app = router(app_state);

    // --- 4. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
