//! Operator actions: shared-secret check and file deletion.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ledger::HistoryLedger;
use crate::storage::{ObjectStore, StoreError};
use crate::types::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DeleteOutcome {
    #[serde(rename_all = "camelCase")]
    Deleted { removed_records: usize },
    /// The store had no such object; matching ledger records were still purged.
    #[serde(rename_all = "camelCase")]
    NotFound { removed_records: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ClearAllOutcome {
    Success { deleted: usize },
    #[serde(rename_all = "camelCase")]
    PartialFailure {
        deleted: usize,
        failed_urls: Vec<String>,
    },
}

impl ClearAllOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ClearAllOutcome::Success { .. })
    }
}

pub struct AdminService {
    secret: String,
    store: Arc<dyn ObjectStore>,
    ledger: HistoryLedger,
}

impl AdminService {
    pub fn new(
        secret: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        ledger: HistoryLedger,
    ) -> Self {
        Self {
            secret: secret.into(),
            store,
            ledger,
        }
    }

    /// Compares against the shared secret. No lockout after failures.
    pub fn authenticate(&self, supplied: &str) -> bool {
        constant_time_compare(self.secret.as_bytes(), supplied.as_bytes())
    }

    pub async fn delete_one(&self, url: &str) -> AppResult<DeleteOutcome> {
        // The store is always asked first; the URL may be orphaned from the ledger.
        match self.store.delete(url).await {
            Ok(()) => {
                let removed_records = self.ledger.remove_urls(&[url]).await;
                info!(url = %url, removed_records, "Object deleted");
                Ok(DeleteOutcome::Deleted { removed_records })
            }
            Err(StoreError::NotFound(_)) => {
                let removed_records = self.ledger.remove_urls(&[url]).await;
                info!(url = %url, removed_records, "Object already absent from store");
                Ok(DeleteOutcome::NotFound { removed_records })
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to delete object");
                Err(e.into())
            }
        }
    }

    /// Deletes every recorded object, then clears the ledger.
    ///
    /// Store failures are collected rather than aborting the run, and the
    /// affected records are dropped from the ledger anyway.
    pub async fn delete_all(&self) -> ClearAllOutcome {
        let snapshot = self.ledger.snapshot().await;
        let mut deleted = 0;
        let mut failed_urls = Vec::new();

        for record in &snapshot {
            match self.store.delete(&record.url).await {
                Ok(()) | Err(StoreError::NotFound(_)) => deleted += 1,
                Err(e) => {
                    warn!(
                        url = %record.url,
                        error = %e,
                        "Failed to delete object during clear-all"
                    );
                    failed_urls.push(record.url.clone());
                }
            }
        }

        self.ledger.clear().await;
        info!(deleted, failed = failed_urls.len(), "Clear-all finished");

        if failed_urls.is_empty() {
            ClearAllOutcome::Success { deleted }
        } else {
            ClearAllOutcome::PartialFailure {
                deleted,
                failed_urls,
            }
        }
    }
}

/// Constant-time byte comparison. Different lengths still walk the longer input.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    let max_len = a.len().max(b.len());
    let mut diff = (a.len() != b.len()) as u8;
    for i in 0..max_len {
        let byte_a = a.get(i).copied().unwrap_or(0);
        let byte_b = b.get(i).copied().unwrap_or(0);
        diff |= byte_a ^ byte_b;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UploadRecord;
    use crate::storage::{MemoryStore, StoredObject};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Store that fails deletes for selected URLs and records every call.
    struct FlakyStore {
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FlakyStore {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn upload(
            &self,
            pathname: &str,
            data: Bytes,
            content_type: &str,
        ) -> Result<StoredObject, StoreError> {
            Ok(StoredObject {
                url: format!("https://cdn.test/{}", pathname),
                pathname: pathname.to_string(),
                size: data.len() as u64,
                content_type: content_type.to_string(),
            })
        }

        async fn delete(&self, url: &str) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.failing.contains(url) {
                Err(StoreError::Backend("service unavailable".into()))
            } else {
                Ok(())
            }
        }

        async fn head(&self, _url: &str) -> Result<bool, StoreError> {
            Ok(true)
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn record(url: &str) -> UploadRecord {
        UploadRecord {
            url: url.to_string(),
            filename: url.rsplit('/').next().unwrap_or(url).to_string(),
            size: 1,
            timestamp: 0,
            client_id: None,
        }
    }

    #[test]
    fn test_authenticate() {
        let admin = AdminService::new(
            "s3cret",
            Arc::new(MemoryStore::default()),
            HistoryLedger::default(),
        );
        assert!(admin.authenticate("s3cret"));
        assert!(!admin.authenticate("s3cret!"));
        assert!(!admin.authenticate("wrong"));
        assert!(!admin.authenticate(""));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"hello", b"hello"));
        assert!(!constant_time_compare(b"hello", b"world"));
        assert!(!constant_time_compare(b"hello", b"hello!"));
        assert!(!constant_time_compare(b"", b"a"));
        assert!(constant_time_compare(b"", b""));
    }

    #[tokio::test]
    async fn test_delete_all_partial_failure() {
        let ledger = HistoryLedger::default();
        for url in ["https://cdn.test/d/a", "https://cdn.test/d/b", "https://cdn.test/d/c"] {
            ledger.append(record(url)).await;
        }
        let store = Arc::new(FlakyStore::new(&["https://cdn.test/d/b"]));
        let admin = AdminService::new("x", store.clone(), ledger.clone());

        let outcome = admin.delete_all().await;
        assert_eq!(
            outcome,
            ClearAllOutcome::PartialFailure {
                deleted: 2,
                failed_urls: vec!["https://cdn.test/d/b".to_string()],
            }
        );
        assert!(ledger.is_empty().await);
        assert_eq!(store.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_all_treats_missing_objects_as_deleted() {
        let ledger = HistoryLedger::default();
        ledger.append(record("https://cdn.test/d/ghost")).await;
        let store = MemoryStore::new("https://cdn.test");
        let admin = AdminService::new("x", Arc::new(store), ledger.clone());

        assert_eq!(admin.delete_all().await, ClearAllOutcome::Success { deleted: 1 });
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_one_orphaned_url_still_hits_store() {
        let store = Arc::new(FlakyStore::new(&[]));
        let admin = AdminService::new("x", store.clone(), HistoryLedger::default());

        let outcome = admin.delete_one("https://cdn.test/d/orphan").await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted { removed_records: 0 });
        assert_eq!(*store.calls.lock().unwrap(), vec!["https://cdn.test/d/orphan".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_one_removes_ledger_records() {
        let store = MemoryStore::new("https://cdn.test");
        let stored = store.upload("d/a.txt", Bytes::from_static(b"a"), "text/plain").await.unwrap();
        let ledger = HistoryLedger::default();
        ledger.append(record(&stored.url)).await;
        ledger.append(record("https://cdn.test/d/other")).await;

        let admin = AdminService::new("x", Arc::new(store.clone()), ledger.clone());
        let outcome = admin.delete_one(&stored.url).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted { removed_records: 1 });
        assert!(!store.head(&stored.url).await.unwrap());
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_one_missing_object_purges_ledger() {
        let ledger = HistoryLedger::default();
        ledger.append(record("https://cdn.test/d/gone")).await;
        let store = MemoryStore::new("https://cdn.test");
        let admin = AdminService::new("x", Arc::new(store), ledger.clone());

        let outcome = admin.delete_one("https://cdn.test/d/gone").await.unwrap();
        assert_eq!(outcome, DeleteOutcome::NotFound { removed_records: 1 });
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_one_store_error_keeps_ledger() {
        let url = "https://cdn.test/d/stuck";
        let ledger = HistoryLedger::default();
        ledger.append(record(url)).await;
        let admin = AdminService::new("x", Arc::new(FlakyStore::new(&[url])), ledger.clone());

        assert!(admin.delete_one(url).await.is_err());
        assert_eq!(ledger.len().await, 1);
    }
}
