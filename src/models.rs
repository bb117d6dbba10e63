use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use crate::admin::AdminService;
use crate::config::Config;
use crate::ledger::HistoryLedger;
use crate::middleware::RequestThrottle;
use crate::quota::{QuotaLimiter, QuotaPolicy};
use crate::reconcile::Reconciler;
use crate::storage::ObjectStore;
use crate::uploads::{ticket::TicketSigner, UploadOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub ledger: HistoryLedger,
    pub uploads: Arc<UploadOrchestrator>,
    pub admin: Arc<AdminService>,
    pub reconciler: Reconciler,
    pub throttle: Option<Arc<RequestThrottle>>,
    pub store_name: &'static str,
}

impl AppState {
    /// Wires every service around one ledger and one object store.
    pub fn new(config: Config, store: Arc<dyn ObjectStore>) -> Self {
        let ledger = HistoryLedger::new(config.history.cap);

        let upload_rate = QuotaLimiter::new(
            QuotaPolicy::hourly_uploads(config.uploads.rate_max_uploads)
                .with_window(Duration::from_secs(config.uploads.rate_window_secs)),
        );
        let daily_quota = QuotaLimiter::new(
            QuotaPolicy::daily(config.quota.max_bytes, config.quota.max_uploads)
                .with_window(Duration::from_secs(config.quota.window_secs)),
        );

        let ticket_ttl = Duration::from_secs(config.uploads.ticket_ttl_secs);
        let signer = match &config.uploads.ticket_secret {
            Some(secret) => TicketSigner::new(secret, ticket_ttl),
            None => TicketSigner::ephemeral(ticket_ttl),
        };

        let uploads = UploadOrchestrator::new(
            store.clone(),
            ledger.clone(),
            upload_rate,
            daily_quota,
            signer,
            config.uploads.max_file_bytes,
            config.uploads.path_prefix.clone(),
        );
        let admin = AdminService::new(
            config.auth.admin_secret.clone(),
            store.clone(),
            ledger.clone(),
        );
        let reconciler = Reconciler::new(store.clone(), config.history.reconcile_concurrency);
        let throttle = RequestThrottle::from_config(&config.throttle).map(Arc::new);

        Self {
            store_name: store.name(),
            config,
            ledger,
            uploads: Arc::new(uploads),
            admin: Arc::new(admin),
            reconciler,
            throttle,
        }
    }
}

/// One completed upload as shown in the history.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub url: String,
    pub filename: String,
    pub size: u64,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

// API Request/Response types

#[derive(Debug, serde::Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeUploadRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 512, message = "filename is required"))]
    pub filename: String,
    #[serde(default)]
    pub declared_size: Option<serde_json::Value>,
    /// Free-form client metadata, logged but otherwise unused.
    #[serde(default)]
    pub client_context: Option<serde_json::Value>,
}

#[derive(Debug, serde::Serialize)]
pub struct AuthorizeUploadResponse {
    pub ticket: crate::uploads::UploadTicket,
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct RecordUploadRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "url is required"))]
    pub url: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "filename is required"))]
    pub filename: String,
    #[serde(default)]
    pub size: Option<serde_json::Value>,
}

#[derive(Debug, serde::Serialize)]
pub struct RecordUploadResponse {
    pub success: bool,
    pub record: UploadRecord,
}

#[derive(Debug, serde::Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, serde::Serialize)]
pub struct HistoryResponse {
    pub records: Vec<UploadRecord>,
    pub count: usize,
}

#[derive(Debug, serde::Deserialize)]
pub struct CleanupRequest {
    #[serde(default)]
    pub urls: Option<Vec<String>>,
}

#[derive(Debug, serde::Serialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub removed: usize,
}

#[derive(Debug, serde::Deserialize)]
pub struct AuthenticateRequest {
    #[serde(default, alias = "password")]
    pub secret: String,
}

#[derive(Debug, serde::Serialize)]
pub struct AuthenticateResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct DeleteObjectRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "URL is required"))]
    pub url: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: String,
    pub history_records: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let record = UploadRecord {
            url: "https://cdn.test/d/a".into(),
            filename: "a".into(),
            size: 3,
            timestamp: 10,
            client_id: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "url": "https://cdn.test/d/a",
                "filename": "a",
                "size": 3,
                "timestamp": 10
            })
        );

        let with_client = UploadRecord { client_id: Some("1.2.3.4".into()), ..record };
        let json = serde_json::to_value(&with_client).unwrap();
        assert_eq!(json["clientId"], "1.2.3.4");
    }

    #[test]
    fn test_authenticate_accepts_password_alias() {
        let req: AuthenticateRequest = serde_json::from_str(r#"{"password": "pw"}"#).unwrap();
        assert_eq!(req.secret, "pw");
    }

    #[test]
    fn test_missing_filename_fails_validation() {
        let req: AuthorizeUploadRequest = serde_json::from_str(r#"{"declaredSize": 10}"#).unwrap();
        assert!(req.validate().is_err());

        let req: RecordUploadRequest = serde_json::from_str(r#"{"url": "u"}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
