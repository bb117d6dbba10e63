//! Existence reconciliation
//!
//! Probes each recorded URL against the object store and splits the records
//! into live ones and dead URLs. Reconciliation never touches the ledger; the
//! caller decides whether to purge with [`HistoryLedger::remove_urls`].
//!
//! [`HistoryLedger::remove_urls`]: crate::ledger::HistoryLedger::remove_urls

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::UploadRecord;
use crate::storage::ObjectStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub live: Vec<UploadRecord>,
    pub dead_urls: Vec<String>,
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ObjectStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn reconcile(&self, records: Vec<UploadRecord>) -> Reconciliation {
        let store = &self.store;
        let probes = stream::iter(records)
            .map(|record| async move {
                // A failed probe is treated exactly like a missing object.
                let alive = match store.head(&record.url).await {
                    Ok(exists) => exists,
                    Err(e) => {
                        warn!(url = %record.url, error = %e, "Existence probe errored");
                        false
                    }
                };
                (record, alive)
            })
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut result = Reconciliation::default();
        for (record, alive) in probes {
            if alive {
                result.live.push(record);
            } else {
                result.dead_urls.push(record.url);
            }
        }

        debug!(
            live = result.live.len(),
            dead = result.dead_urls.len(),
            "Reconciliation finished"
        );
        result
    }
}
