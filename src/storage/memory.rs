use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{object_key, object_url, ObjectStore, StoreError, StoredObject};

pub const MEMORY_BASE_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
}

/// Process-local object store keyed by pathname.
#[derive(Clone)]
pub struct MemoryStore {
    base_url: String,
    objects: Arc<RwLock<HashMap<String, MemoryObject>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MEMORY_BASE_URL)
    }
}

impl MemoryStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, pathname: &str) -> String {
        object_url(&self.base_url, pathname)
    }

    pub async fn get(&self, pathname: &str) -> Option<(Bytes, String)> {
        let guard = self.objects.read().await;
        guard
            .get(pathname)
            .map(|obj| (obj.data.clone(), obj.content_type.clone()))
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(
        &self,
        pathname: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        let size = data.len() as u64;
        let mut guard = self.objects.write().await;
        guard.insert(
            pathname.to_string(),
            MemoryObject {
                data,
                content_type: content_type.to_string(),
            },
        );

        Ok(StoredObject {
            url: self.url_for(pathname),
            pathname: pathname.to_string(),
            size,
            content_type: content_type.to_string(),
        })
    }

    async fn delete(&self, url: &str) -> Result<(), StoreError> {
        let key = object_key(url, &self.base_url)?;
        let mut guard = self.objects.write().await;
        match guard.remove(&key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(url.to_string())),
        }
    }

    async fn head(&self, url: &str) -> Result<bool, StoreError> {
        let key = object_key(url, &self.base_url)?;
        Ok(self.objects.read().await.contains_key(&key))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
