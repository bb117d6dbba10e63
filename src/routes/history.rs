//! History endpoints
//!
//! - `GET  /api/history`         - list uploads, purging dead links first
//! - `POST /api/history`         - record a completed upload
//! - `POST /api/history/cleanup` - drop records by URL

use axum::{
    extract::{Query, State},
    http::header::CACHE_CONTROL,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use validator::Validate;

use crate::middleware::{ApiJson, ClientId};
use crate::models::{
    AppState, CleanupRequest, CleanupResponse, HistoryQuery, HistoryResponse, RecordUploadRequest,
    RecordUploadResponse,
};
use crate::types::{AppError, AppResult};
use crate::uploads::coerce_size;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/history", get(list_history).post(record_upload))
        .route("/api/history/cleanup", post(cleanup_history))
        .with_state(state)
}

async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let cap = state.ledger.cap();
    let limit = query.limit.unwrap_or(cap).min(cap);
    let mut records = state.ledger.list(limit).await;

    if state.config.history.verify_on_read && !records.is_empty() {
        let result = state.reconciler.reconcile(records).await;
        if !result.dead_urls.is_empty() {
            let removed = state.ledger.remove_urls(result.dead_urls.as_slice()).await;
            info!(removed, "Purged history entries for missing objects");
        }
        records = result.live;
    }

    let count = records.len();
    (
        [(CACHE_CONTROL, "no-store")],
        Json(HistoryResponse { records, count }),
    )
}

async fn record_upload(
    State(state): State<AppState>,
    client: ClientId,
    ApiJson(request): ApiJson<RecordUploadRequest>,
) -> AppResult<Json<RecordUploadResponse>> {
    request.validate()?;
    let size = coerce_size(request.size.as_ref());

    let record = state
        .uploads
        .complete(client.as_str(), &request.url, &request.filename, size)
        .await?;

    Ok(Json(RecordUploadResponse {
        success: true,
        record,
    }))
}

async fn cleanup_history(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CleanupRequest>,
) -> AppResult<Json<CleanupResponse>> {
    let urls = request
        .urls
        .ok_or_else(|| AppError::InvalidRequest("urls array required".to_string()))?;

    let removed = state.ledger.remove_urls(urls.as_slice()).await;
    info!(requested = urls.len(), removed, "History cleanup");

    Ok(Json(CleanupResponse {
        success: true,
        removed,
    }))
}
