//! Per-client upload quotas
//!
//! Each client id owns a [`QuotaState`] that counts bytes and uploads admitted
//! inside the current window. Windows restart lazily: the first request that
//! arrives after `window` has elapsed resets the counters and starts a new
//! window at that request's time. Ceilings are plain counter comparisons.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Client id used when the request carries no usable network identifier.
pub const UNKNOWN_CLIENT: &str = "Unknown";

#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    pub window: Duration,
    /// Byte ceiling per window. `None` disables the byte check.
    pub max_bytes: Option<u64>,
    /// Upload-count ceiling per window. `None` disables the count check.
    pub max_uploads: Option<u32>,
}

impl QuotaPolicy {
    /// Hourly upload-count limit applied when tickets are issued.
    pub fn hourly_uploads(max_uploads: u32) -> Self {
        Self {
            window: Duration::from_secs(60 * 60),
            max_bytes: None,
            max_uploads: Some(max_uploads),
        }
    }

    /// Daily byte and count quota applied when uploads are recorded.
    pub fn daily(max_bytes: u64, max_uploads: u32) -> Self {
        Self {
            window: Duration::from_secs(24 * 60 * 60),
            max_bytes: Some(max_bytes),
            max_uploads: Some(max_uploads),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaState {
    pub window_start: i64,
    pub bytes_used: u64,
    pub upload_count: u32,
}

impl QuotaState {
    fn fresh(now_ms: i64) -> Self {
        Self {
            window_start: now_ms,
            bytes_used: 0,
            upload_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    ByteCeiling { used: u64, requested: u64, limit: u64 },
    CountCeiling { count: u32, limit: u32 },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::ByteCeiling { used, requested, limit } => write!(
                f,
                "{} bytes used + {} requested exceeds the {} byte limit",
                used, requested, limit
            ),
            DenyReason::CountCeiling { count, limit } => {
                write!(f, "{} of {} uploads already used", count, limit)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny(DenyReason),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow)
    }
}

/// Shared handle to the quota table. Clones point at the same state.
#[derive(Clone)]
pub struct QuotaLimiter {
    policy: QuotaPolicy,
    states: Arc<Mutex<HashMap<String, QuotaState>>>,
}

impl QuotaLimiter {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self {
            policy,
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    pub async fn admit(&self, client_id: &str, requested_bytes: u64) -> Admission {
        self.admit_at(client_id, requested_bytes, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// Admission check against an explicit clock reading (epoch millis).
    pub async fn admit_at(&self, client_id: &str, requested_bytes: u64, now_ms: i64) -> Admission {
        let key = normalize_client(client_id);
        let mut states = self.states.lock().await;

        // Work on a copy; the table only changes when the request is admitted.
        let mut state = states
            .get(key)
            .copied()
            .unwrap_or_else(|| QuotaState::fresh(now_ms));

        if now_ms - state.window_start > self.policy.window_ms() {
            state = QuotaState::fresh(now_ms);
        }

        if let Some(limit) = self.policy.max_bytes {
            if state.bytes_used.saturating_add(requested_bytes) > limit {
                return Admission::Deny(DenyReason::ByteCeiling {
                    used: state.bytes_used,
                    requested: requested_bytes,
                    limit,
                });
            }
        }

        if let Some(limit) = self.policy.max_uploads {
            if state.upload_count.saturating_add(1) > limit {
                return Admission::Deny(DenyReason::CountCeiling {
                    count: state.upload_count,
                    limit,
                });
            }
        }

        state.bytes_used = state.bytes_used.saturating_add(requested_bytes);
        state.upload_count = state.upload_count.saturating_add(1);
        states.insert(key.to_string(), state);

        Admission::Allow
    }

    pub async fn usage(&self, client_id: &str) -> Option<QuotaState> {
        let states = self.states.lock().await;
        states.get(normalize_client(client_id)).copied()
    }

    /// Drops states whose window has already elapsed. Returns how many were removed.
    pub async fn prune_expired(&self, now_ms: i64) -> usize {
        let window_ms = self.policy.window_ms();
        let mut states = self.states.lock().await;
        let before = states.len();
        states.retain(|_, state| now_ms - state.window_start <= window_ms);
        before - states.len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.states.lock().await.len()
    }
}

fn normalize_client(client_id: &str) -> &str {
    let trimmed = client_id.trim();
    if trimmed.is_empty() {
        UNKNOWN_CLIENT
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;
    const HOUR_MS: i64 = 60 * 60 * 1000;

    #[tokio::test]
    async fn test_byte_ceiling_with_window_reset() {
        let limiter = QuotaLimiter::new(QuotaPolicy::daily(1024 * MIB, 100));
        let t0 = 1_700_000_000_000;

        assert_eq!(limiter.admit_at("1.2.3.4", 600 * MIB, t0).await, Admission::Allow);

        let denied = limiter.admit_at("1.2.3.4", 500 * MIB, t0 + 1_000).await;
        assert!(matches!(denied, Admission::Deny(DenyReason::ByteCeiling { .. })));

        let later = t0 + 25 * HOUR_MS;
        assert_eq!(limiter.admit_at("1.2.3.4", 500 * MIB, later).await, Admission::Allow);

        let usage = limiter.usage("1.2.3.4").await.unwrap();
        assert_eq!(usage.window_start, later);
        assert_eq!(usage.bytes_used, 500 * MIB);
        assert_eq!(usage.upload_count, 1);
    }

    #[tokio::test]
    async fn test_count_ceiling() {
        let limiter = QuotaLimiter::new(QuotaPolicy::daily(1024 * MIB, 100));
        let now = 1_000;

        for _ in 0..100 {
            assert!(limiter.admit_at("client", 0, now).await.is_allowed());
        }
        for _ in 0..5 {
            assert_eq!(
                limiter.admit_at("client", 0, now).await,
                Admission::Deny(DenyReason::CountCeiling { count: 100, limit: 100 })
            );
        }
    }

    #[tokio::test]
    async fn test_deny_leaves_state_unchanged() {
        let limiter = QuotaLimiter::new(QuotaPolicy::daily(100, 10));
        limiter.admit_at("a", 60, 0).await;
        let before = limiter.usage("a").await.unwrap();

        assert!(!limiter.admit_at("a", 50, 10).await.is_allowed());
        assert_eq!(limiter.usage("a").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_denied_first_request_creates_no_state() {
        let limiter = QuotaLimiter::new(QuotaPolicy::daily(10, 10));
        assert!(!limiter.admit_at("big", 11, 0).await.is_allowed());
        assert!(limiter.usage("big").await.is_none());
    }

    #[tokio::test]
    async fn test_admitted_bytes_never_exceed_ceiling() {
        let limiter = QuotaLimiter::new(QuotaPolicy::daily(1_000, 1_000));
        let mut admitted = 0u64;
        for (i, size) in [300u64, 450, 200, 100, 50, 1].iter().enumerate() {
            if limiter.admit_at("c", *size, i as i64).await.is_allowed() {
                admitted += size;
            }
            assert!(admitted <= 1_000);
        }
        assert_eq!(admitted, 1_000);
    }

    #[tokio::test]
    async fn test_window_boundary_is_exclusive() {
        let limiter = QuotaLimiter::new(QuotaPolicy::hourly_uploads(1));
        assert!(limiter.admit_at("c", 0, 0).await.is_allowed());
        // Exactly one window later is still the same window.
        assert!(!limiter.admit_at("c", 0, HOUR_MS).await.is_allowed());
        assert!(limiter.admit_at("c", 0, HOUR_MS + 1).await.is_allowed());
    }

    #[tokio::test]
    async fn test_clients_are_isolated_and_blank_is_unknown() {
        let limiter = QuotaLimiter::new(QuotaPolicy::hourly_uploads(1));
        assert!(limiter.admit_at("a", 0, 0).await.is_allowed());
        assert!(limiter.admit_at("b", 0, 0).await.is_allowed());
        assert!(limiter.admit_at("", 0, 0).await.is_allowed());
        assert!(!limiter.admit_at(UNKNOWN_CLIENT, 0, 0).await.is_allowed());
    }

    #[tokio::test]
    async fn test_hourly_policy_ignores_bytes() {
        let limiter = QuotaLimiter::new(QuotaPolicy::hourly_uploads(20));
        assert!(limiter.admit_at("c", u64::MAX, 0).await.is_allowed());
        assert!(limiter.admit_at("c", u64::MAX, 1).await.is_allowed());
    }

    #[tokio::test]
    async fn test_prune_expired() {
        let limiter = QuotaLimiter::new(QuotaPolicy::hourly_uploads(5));
        limiter.admit_at("old", 0, 0).await;
        limiter.admit_at("new", 0, 2 * HOUR_MS).await;

        assert_eq!(limiter.prune_expired(2 * HOUR_MS + 10).await, 1);
        assert_eq!(limiter.tracked_clients().await, 1);
        assert!(limiter.usage("new").await.is_some());
    }
}
