//! Admin endpoints
//!
//! - `POST   /api/admin/authenticate` - check the shared secret
//! - `DELETE /api/admin/object`       - delete one object (secret required)
//! - `POST   /api/admin/clear-all`    - delete everything (secret required)

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, warn};
use validator::Validate;

use crate::admin::{ClearAllOutcome, DeleteOutcome};
use crate::middleware::{admin_auth_middleware, ApiJson};
use crate::models::{AppState, AuthenticateRequest, AuthenticateResponse, DeleteObjectRequest};
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/admin/object", delete(delete_object))
        .route("/api/admin/clear-all", post(clear_all))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/api/admin/authenticate", post(authenticate))
        .merge(protected)
        .with_state(state)
}

async fn authenticate(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<AuthenticateRequest>,
) -> (StatusCode, Json<AuthenticateResponse>) {
    if state.admin.authenticate(&request.secret) {
        info!("Admin authenticated");
        (
            StatusCode::OK,
            Json(AuthenticateResponse {
                success: true,
                message: "Authentication successful".to_string(),
            }),
        )
    } else {
        warn!("Admin authentication failed");
        (
            StatusCode::UNAUTHORIZED,
            Json(AuthenticateResponse {
                success: false,
                message: "Invalid password".to_string(),
            }),
        )
    }
}

async fn delete_object(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DeleteObjectRequest>,
) -> AppResult<Response> {
    request.validate()?;

    let outcome = state.admin.delete_one(&request.url).await?;
    let response = match outcome {
        DeleteOutcome::Deleted { .. } => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "File deleted successfully",
                "outcome": outcome,
            })),
        ),
        DeleteOutcome::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "message": "File not found in storage",
                "outcome": outcome,
            })),
        ),
    };

    Ok(response.into_response())
}

async fn clear_all(State(state): State<AppState>) -> Json<serde_json::Value> {
    let outcome = state.admin.delete_all().await;
    let message = match &outcome {
        ClearAllOutcome::Success { .. } => "All files deleted successfully".to_string(),
        ClearAllOutcome::PartialFailure { failed_urls, .. } => {
            format!("{} file(s) could not be deleted from storage", failed_urls.len())
        }
    };

    Json(json!({
        "success": outcome.is_success(),
        "message": message,
        "outcome": outcome,
    }))
}
