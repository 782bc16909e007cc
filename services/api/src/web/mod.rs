pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use state::AppState;

pub use auth::{login_handler, refresh_handler};
pub use middleware::require_auth;
pub use rest::{credentials_status_handler, health_handler};

/// Builds the complete HTTP router around the shared state.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/login", post(login_handler))
        .route("/token/refresh", post(refresh_handler));

    // Protected routes (access token required)
    let protected_routes = Router::new()
        .route("/credentials", get(credentials_status_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_v1 = Router::new().merge(public_routes).merge(protected_routes);

    Router::new()
        .route("/", get(health_handler))
        .nest("/api/v1", api_v1)
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
