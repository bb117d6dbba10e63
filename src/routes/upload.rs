//! Upload endpoints
//!
//! - `POST /api/upload-authorize` - admit the client and issue a ticket
//! - `PUT  /api/upload/{token}`   - transfer bytes using a ticket

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    routing::{post, put},
    Json, Router,
};
use tracing::info;
use validator::Validate;

use crate::middleware::{ApiJson, ClientId};
use crate::models::{AppState, AuthorizeUploadRequest, AuthorizeUploadResponse};
use crate::storage::StoredObject;
use crate::types::AppResult;
use crate::uploads::coerce_size;

/// Extra room over the per-file cap so the orchestrator, not the body limit,
/// reports oversized transfers.
const BODY_LIMIT_SLACK: usize = 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.uploads.max_file_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_LIMIT_SLACK);

    Router::new()
        .route("/api/upload-authorize", post(authorize_upload))
        .route(
            "/api/upload/{token}",
            put(transfer_upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

async fn authorize_upload(
    State(state): State<AppState>,
    client: ClientId,
    ApiJson(request): ApiJson<AuthorizeUploadRequest>,
) -> AppResult<Json<AuthorizeUploadResponse>> {
    request.validate()?;
    let declared_size = coerce_size(request.declared_size.as_ref());

    info!(
        client_id = %client.as_str(),
        filename = %request.filename,
        declared_size,
        has_context = request.client_context.is_some(),
        "Upload authorization requested"
    );

    let ticket = state
        .uploads
        .authorize(client.as_str(), &request.filename, declared_size)
        .await?;

    Ok(Json(AuthorizeUploadResponse { ticket }))
}

async fn transfer_upload(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<StoredObject>)> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let stored = state.uploads.transfer(&token, content_type, body).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}
