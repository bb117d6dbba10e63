use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::UploadRecord;

pub const DEFAULT_HISTORY_CAP: usize = 100;

/// Bounded upload history, newest record first.
///
/// The ledger lives only in memory. Appending past `cap` evicts the oldest
/// record; clones share the same underlying list.
#[derive(Clone)]
pub struct HistoryLedger {
    cap: usize,
    inner: Arc<RwLock<VecDeque<UploadRecord>>>,
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl HistoryLedger {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            inner: Arc::new(RwLock::new(VecDeque::with_capacity(cap))),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub async fn append(&self, record: UploadRecord) {
        let mut guard = self.inner.write().await;
        guard.push_front(record);
        guard.truncate(self.cap);
    }

    pub async fn list(&self, limit: usize) -> Vec<UploadRecord> {
        let guard = self.inner.read().await;
        guard.iter().take(limit).cloned().collect()
    }

    pub async fn snapshot(&self) -> Vec<UploadRecord> {
        let guard = self.inner.read().await;
        guard.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn remove_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&UploadRecord) -> bool,
    {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|record| !predicate(record));
        before - guard.len()
    }

    pub async fn remove_urls<S: AsRef<str>>(&self, urls: &[S]) -> usize {
        if urls.is_empty() {
            return 0;
        }
        let targets: HashSet<&str> = urls.iter().map(|u| u.as_ref()).collect();
        self.remove_where(|record| targets.contains(record.url.as_str()))
            .await
    }

    pub async fn clear(&self) -> usize {
        let mut guard = self.inner.write().await;
        let removed = guard.len();
        guard.clear();
        removed
    }
}
