// Per-client request throttling with governor

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use tracing::debug;

use crate::config::ThrottleConfig;
use crate::middleware::client_id_from_headers;
use crate::models::AppState;
use crate::types::AppError;

/// Coarse request-rate guard keyed by client id. Independent of upload quotas.
pub struct RequestThrottle {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl RequestThrottle {
    pub fn new(per_second: NonZeroU32, burst: NonZeroU32) -> Self {
        let quota = Quota::per_second(per_second).allow_burst(burst);
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// `None` when `requests_per_second` is zero.
    pub fn from_config(config: &ThrottleConfig) -> Option<Self> {
        let per_second = NonZeroU32::new(config.requests_per_second)?;
        let burst = NonZeroU32::new(config.burst).unwrap_or(per_second);
        Some(Self::new(per_second, burst))
    }

    pub fn check(&self, client_id: &str) -> bool {
        self.limiter.check_key(&client_id.to_string()).is_ok()
    }

    /// Forgets clients whose buckets are full again.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}

pub async fn rate_limiter_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(throttle) = &state.throttle {
        let client_id = client_id_from_headers(req.headers());
        if !throttle.check(&client_id) {
            debug!(client_id = %client_id, "Request throttled");
            return AppError::QuotaExceeded("Too many requests. Slow down.".to_string())
                .into_response();
        }
    }

    next.run(req).await
}
