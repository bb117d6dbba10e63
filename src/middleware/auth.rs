// Shared-secret guard for admin routes

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::models::AppState;
use crate::types::AppError;

pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Secret supplied via `x-admin-secret` or `Authorization: Bearer <secret>`.
pub fn supplied_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(ADMIN_SECRET_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.trim());
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authorized = supplied_secret(req.headers())
        .map(|secret| state.admin.authenticate(secret))
        .unwrap_or(false);

    if !authorized {
        warn!(path = %req.uri().path(), "Rejected admin request");
        return Err(AppError::Unauthorized("admin secret required".to_string()));
    }

    Ok(next.run(req).await)
}
