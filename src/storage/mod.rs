//! Object store collaborator
//!
//! The service only needs three operations from the blob store: put an object
//! under a pathname, delete it by its public URL, and check whether a URL still
//! resolves. [`ObjectStore`] is that seam; `S3Store` talks to any S3-compatible
//! bucket and `MemoryStore` keeps objects in process for development and tests.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::sync::Arc;
use tracing::info;

use crate::config::StorageConfig;

pub mod memory;
pub mod s3_client;

pub use memory::*;
pub use s3_client::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object locator: {0}")]
    InvalidLocator(String),

    #[error("object store failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub url: String,
    pub pathname: String,
    pub size: u64,
    pub content_type: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `data` under `pathname`, overwriting any existing object.
    async fn upload(
        &self,
        pathname: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, StoreError>;

    /// Deletes the object behind a public URL.
    async fn delete(&self, url: &str) -> Result<(), StoreError>;

    /// Lightweight existence probe; never fetches content.
    async fn head(&self, url: &str) -> Result<bool, StoreError>;

    fn name(&self) -> &'static str;
}

pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.provider.as_str() {
        "memory" => {
            info!("Using in-memory object store");
            let base = config
                .public_base_url
                .clone()
                .unwrap_or_else(|| MEMORY_BASE_URL.to_string());
            Ok(Arc::new(MemoryStore::new(base)))
        }
        _ => {
            let store = S3Store::from_config(config)?;
            info!(
                bucket = %config.s3_bucket,
                base_url = %store.base_url(),
                "Using S3 object store"
            );
            Ok(Arc::new(store))
        }
    }
}

/// Characters escaped inside one path segment of an object URL.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Maps a public object URL back to its key.
///
/// URLs minted by this service start with `base_url`; anything else (a proxied
/// or rewritten link) falls back to the URL's path. Either way the key is
/// percent-decoded.
pub fn object_key(url: &str, base_url: &str) -> Result<String, StoreError> {
    let prefix = format!("{}/", base_url.trim_end_matches('/'));
    let encoded = match url.strip_prefix(&prefix) {
        Some(rest) => rest
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
        None => {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| StoreError::InvalidLocator(format!("{}: {}", url, e)))?;
            parsed.path().trim_start_matches('/').to_string()
        }
    };

    let key = percent_decode_str(&encoded)
        .decode_utf8()
        .map_err(|e| StoreError::InvalidLocator(format!("{}: {}", url, e)))?
        .into_owned();

    if key.is_empty() {
        return Err(StoreError::InvalidLocator(url.to_string()));
    }
    Ok(key)
}

/// Public URL for `pathname`, escaping each segment so the URL resolves back
/// to the same key.
pub fn object_url(base_url: &str, pathname: &str) -> String {
    let path = pathname
        .trim_start_matches('/')
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}
