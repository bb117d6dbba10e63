//! API Routes
//!
//! This module organizes all HTTP endpoints for the application:
//! - `/api/upload-authorize`, `/api/upload/{token}` - Upload tickets and transfer
//! - `/api/history` - Upload history and cleanup
//! - `/api/admin` - Operator authentication and deletion
//! - `/api/health` - Health checks

pub mod admin;
pub mod health;
pub mod history;
pub mod upload;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::{apply_cors, rate_limiter_middleware};
use crate::models::AppState;

/// Create the main application router
///
/// Every route lives under `/api/`. The request throttle sits in front of all
/// of them when enabled; CORS and tracing wrap the whole router.
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let api_router = Router::new()
        .merge(upload::router(state.clone()))
        .merge(history::router(state.clone()))
        .merge(admin::router(state.clone()))
        .merge(health::router(state.clone()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limiter_middleware,
        ));

    apply_cors(api_router, &state.config.server.cors_allowed_origins)
        .layer(TraceLayer::new_for_http())
}
