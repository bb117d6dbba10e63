// JSON body extractor whose rejections answer like every other client error

use axum::extract::{rejection::JsonRejection, FromRequest};

use crate::types::AppError;

/// `axum::Json` with rejections turned into [`AppError::InvalidRequest`], so a
/// body with a `null` or mistyped field gets a 400 and an `{"error": ...}` body
/// instead of axum's plain-text 415/422.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}
