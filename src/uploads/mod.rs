//! Upload orchestration
//!
//! An upload runs in three steps:
//!
//! 1. [`UploadOrchestrator::authorize`] admits the client against the upload
//!    rate limit, enforces the per-file cap and issues a signed ticket.
//! 2. [`UploadOrchestrator::transfer`] redeems the ticket and hands the bytes
//!    to the object store. A ticket is good for one successful transfer.
//! 3. [`UploadOrchestrator::complete`] charges the daily quota and records the
//!    upload in the history ledger.
//!
//! Quota consumed in step 1 or 3 is never refunded when a later step fails.

pub mod ticket;

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ledger::HistoryLedger;
use crate::models::UploadRecord;
use crate::quota::{Admission, QuotaLimiter};
use crate::storage::{ObjectStore, StoredObject};
use crate::types::{AppError, AppResult};
use ticket::{RedeemedTickets, TicketSigner};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub token: String,
    pub pathname: String,
    pub upload_url: String,
    pub max_size_bytes: u64,
    pub expires_at: i64,
}

pub struct UploadOrchestrator {
    store: Arc<dyn ObjectStore>,
    ledger: HistoryLedger,
    upload_rate: QuotaLimiter,
    daily_quota: QuotaLimiter,
    signer: TicketSigner,
    redeemed: RedeemedTickets,
    max_file_bytes: u64,
    path_prefix: String,
}

impl UploadOrchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        ledger: HistoryLedger,
        upload_rate: QuotaLimiter,
        daily_quota: QuotaLimiter,
        signer: TicketSigner,
        max_file_bytes: u64,
        path_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ledger,
            upload_rate,
            daily_quota,
            signer,
            redeemed: RedeemedTickets::default(),
            max_file_bytes,
            path_prefix: path_prefix.into().trim_matches('/').to_string(),
        }
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    pub fn upload_rate(&self) -> &QuotaLimiter {
        &self.upload_rate
    }

    pub fn daily_quota(&self) -> &QuotaLimiter {
        &self.daily_quota
    }

    pub async fn authorize(
        &self,
        client_id: &str,
        filename: &str,
        declared_size: u64,
    ) -> AppResult<UploadTicket> {
        if let Admission::Deny(reason) = self.upload_rate.admit(client_id, declared_size).await {
            warn!(client_id = %client_id, reason = %reason, "Upload rate limit exceeded");
            return Err(AppError::QuotaExceeded(format!(
                "Rate limit exceeded. Try again later. ({})",
                reason
            )));
        }

        if declared_size > self.max_file_bytes {
            return Err(AppError::FileTooLarge {
                size: declared_size,
                limit: self.max_file_bytes,
            });
        }

        let pathname = self.destination_path(filename)?;
        let now = chrono::Utc::now().timestamp_millis();
        let claims = self
            .signer
            .claims_for(&pathname, self.max_file_bytes, client_id, now);
        let token = self
            .signer
            .sign(&claims)
            .map_err(|e| AppError::Internal(format!("failed to sign upload ticket: {}", e)))?;

        info!(
            client_id = %client_id,
            pathname = %pathname,
            declared_size,
            "Upload ticket issued"
        );

        Ok(UploadTicket {
            upload_url: format!("/api/upload/{}", token),
            token,
            pathname,
            max_size_bytes: claims.max_size_bytes,
            expires_at: claims.expires_at,
        })
    }

    pub async fn transfer(
        &self,
        token: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> AppResult<StoredObject> {
        let now = chrono::Utc::now().timestamp_millis();
        let claims = self.signer.verify(token, now)?;

        let size = data.len() as u64;
        if size > claims.max_size_bytes {
            return Err(AppError::FileTooLarge {
                size,
                limit: claims.max_size_bytes,
            });
        }

        self.redeemed.redeem(&claims, now).await?;

        let content_type = content_type
            .filter(|ct| !ct.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(&claims.pathname)
                    .first_or(mime::APPLICATION_OCTET_STREAM)
                    .to_string()
            });

        let stored = match self.store.upload(&claims.pathname, data, &content_type).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(pathname = %claims.pathname, error = %e, "Object store rejected upload");
                // The bytes never landed, so the client may retry with the same ticket.
                self.redeemed.release(&claims.nonce).await;
                return Err(AppError::Store(e));
            }
        };

        info!(
            client_id = %claims.client_id,
            url = %stored.url,
            size = stored.size,
            "Upload transferred"
        );
        Ok(stored)
    }

    pub async fn complete(
        &self,
        client_id: &str,
        url: &str,
        filename: &str,
        size: u64,
    ) -> AppResult<UploadRecord> {
        if url.trim().is_empty() || filename.trim().is_empty() {
            return Err(AppError::InvalidRequest("Missing required fields".to_string()));
        }

        if let Admission::Deny(reason) = self.daily_quota.admit(client_id, size).await {
            warn!(client_id = %client_id, reason = %reason, "Daily upload quota exceeded");
            return Err(AppError::QuotaExceeded(format!(
                "Quota exceeded. Try again later. ({})",
                reason
            )));
        }

        let record = UploadRecord {
            url: url.to_string(),
            filename: filename.to_string(),
            size,
            timestamp: chrono::Utc::now().timestamp_millis(),
            client_id: Some(client_id.to_string()),
        };
        self.ledger.append(record.clone()).await;

        info!(client_id = %client_id, url = %url, size, "Upload recorded");
        Ok(record)
    }

    fn destination_path(&self, filename: &str) -> AppResult<String> {
        let name = filename.trim().trim_start_matches('/');
        let invalid = name.is_empty()
            || name.contains('\\')
            || name.chars().any(char::is_control)
            || name.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
        if invalid {
            return Err(AppError::InvalidRequest(format!(
                "invalid filename '{}'",
                filename
            )));
        }

        if self.path_prefix.is_empty() {
            Ok(name.to_string())
        } else {
            Ok(format!("{}/{}", self.path_prefix, name))
        }
    }
}

/// Reads a client-declared byte count. Anything that is not a non-negative
/// number (or a string holding one) counts as zero.
pub fn coerce_size(value: Option<&serde_json::Value>) -> u64 {
    match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && *f > 0.0)
            .map(|f| f as u64)
            .unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::QuotaPolicy;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use super::ticket::TicketError;
    use std::time::Duration;

    struct Fixture {
        orchestrator: UploadOrchestrator,
        ledger: HistoryLedger,
        store: MemoryStore,
    }

    fn fixture(rate: u32, daily_bytes: u64, daily_count: u32, max_file: u64) -> Fixture {
        let store = MemoryStore::new("https://cdn.test");
        let ledger = HistoryLedger::new(100);
        let orchestrator = UploadOrchestrator::new(
            Arc::new(store.clone()),
            ledger.clone(),
            QuotaLimiter::new(QuotaPolicy::hourly_uploads(rate)),
            QuotaLimiter::new(QuotaPolicy::daily(daily_bytes, daily_count)),
            TicketSigner::new("s", Duration::from_secs(60)),
            max_file,
            "d",
        );
        Fixture { orchestrator, ledger, store }
    }

    #[tokio::test]
    async fn test_authorize_transfer_complete() {
        let fx = fixture(20, 1_000, 10, 100);
        let ticket = fx.orchestrator.authorize("1.2.3.4", "cat.png", 5).await.unwrap();
        assert_eq!(ticket.pathname, "d/cat.png");
        assert_eq!(ticket.max_size_bytes, 100);
        assert!(ticket.upload_url.ends_with(&ticket.token));

        let stored = fx
            .orchestrator
            .transfer(&ticket.token, None, Bytes::from_static(b"meow!"))
            .await
            .unwrap();
        assert_eq!(stored.url, "https://cdn.test/d/cat.png");
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(fx.store.len().await, 1);
        // Transfer alone does not touch the ledger.
        assert!(fx.ledger.is_empty().await);

        let record = fx
            .orchestrator
            .complete("1.2.3.4", &stored.url, "cat.png", stored.size)
            .await
            .unwrap();
        assert_eq!(fx.ledger.list(100).await, vec![record]);
    }

    #[tokio::test]
    async fn test_rate_limit_denies_after_ceiling() {
        let fx = fixture(2, 1_000, 10, 100);
        fx.orchestrator.authorize("c", "a", 1).await.unwrap();
        fx.orchestrator.authorize("c", "b", 1).await.unwrap();
        let err = fx.orchestrator.authorize("c", "c", 1).await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded(_)));
    }

    #[tokio::test]
    async fn test_oversized_declaration_rejected_and_not_refunded() {
        let fx = fixture(20, 1_000, 10, 100);
        let err = fx.orchestrator.authorize("c", "big.iso", 101).await.unwrap_err();
        assert!(matches!(err, AppError::FileTooLarge { size: 101, limit: 100 }));

        let usage = fx.orchestrator.upload_rate().usage("c").await.unwrap();
        assert_eq!(usage.upload_count, 1);
    }

    #[tokio::test]
    async fn test_transfer_enforces_ticket_size() {
        let fx = fixture(20, 1_000, 10, 4);
        let ticket = fx.orchestrator.authorize("c", "a.txt", 1).await.unwrap();
        let err = fx
            .orchestrator
            .transfer(&ticket.token, Some("text/plain"), Bytes::from_static(b"12345"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FileTooLarge { size: 5, limit: 4 }));
        assert!(fx.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_ticket_is_single_use() {
        let fx = fixture(20, 1_000, 10, 100);
        let ticket = fx.orchestrator.authorize("c", "a.txt", 1).await.unwrap();
        fx.orchestrator
            .transfer(&ticket.token, None, Bytes::from_static(b"first"))
            .await
            .unwrap();

        let err = fx
            .orchestrator
            .transfer(&ticket.token, None, Bytes::from_static(b"second"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTicket(TicketError::AlreadyUsed)));
        let (data, _) = fx.store.get("d/a.txt").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn test_oversized_transfer_does_not_burn_ticket() {
        let fx = fixture(20, 1_000, 10, 4);
        let ticket = fx.orchestrator.authorize("c", "a.txt", 1).await.unwrap();
        assert!(fx
            .orchestrator
            .transfer(&ticket.token, None, Bytes::from_static(b"12345"))
            .await
            .is_err());

        fx.orchestrator
            .transfer(&ticket.token, None, Bytes::from_static(b"1234"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_transfer_rejects_bad_token() {
        let fx = fixture(20, 1_000, 10, 100);
        let err = fx
            .orchestrator
            .transfer("garbage", None, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTicket(_)));
    }

    #[tokio::test]
    async fn test_invalid_filenames() {
        let fx = fixture(20, 1_000, 10, 100);
        for name in ["", "   ", "../etc/passwd", "a/../b", "a\\b", "a//b", "bad\nname"] {
            let err = fx.orchestrator.authorize("c", name, 1).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidRequest(_)), "{:?}", name);
        }
        let ok = fx.orchestrator.authorize("c", "/nested/ok.txt", 1).await.unwrap();
        assert_eq!(ok.pathname, "d/nested/ok.txt");
    }

    #[tokio::test]
    async fn test_complete_requires_fields() {
        let fx = fixture(20, 1_000, 10, 100);
        let err = fx.orchestrator.complete("c", "", "a", 1).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        let err = fx.orchestrator.complete("c", "https://x/a", " ", 1).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert!(fx.ledger.is_empty().await);
        assert!(fx.orchestrator.daily_quota().usage("c").await.is_none());
    }

    #[tokio::test]
    async fn test_complete_quota_denial_leaves_ledger() {
        let fx = fixture(20, 10, 10, 100);
        fx.orchestrator.complete("c", "https://x/a", "a", 8).await.unwrap();
        let err = fx
            .orchestrator
            .complete("c", "https://x/b", "b", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded(_)));
        assert_eq!(fx.ledger.len().await, 1);
    }

    #[test]
    fn test_coerce_size() {
        assert_eq!(coerce_size(None), 0);
        assert_eq!(coerce_size(Some(&json!(42))), 42);
        assert_eq!(coerce_size(Some(&json!(-5))), 0);
        assert_eq!(coerce_size(Some(&json!(12.9))), 12);
        assert_eq!(coerce_size(Some(&json!("1024"))), 1024);
        assert_eq!(coerce_size(Some(&json!("abc"))), 0);
        assert_eq!(coerce_size(Some(&json!(null))), 0);
        assert_eq!(coerce_size(Some(&json!({"n": 1}))), 0);
    }
}
