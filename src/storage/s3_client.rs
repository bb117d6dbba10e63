// S3-compatible object store backed by rust-s3

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use s3::{creds::Credentials, error::S3Error, region::Region, Bucket};
use tracing::{debug, warn};

use super::{object_key, object_url, ObjectStore, StoreError, StoredObject};
use crate::config::StorageConfig;

pub struct S3Store {
    bucket: Box<Bucket>,
    base_url: String,
}

impl S3Store {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let region = match &config.s3_endpoint {
            Some(endpoint) => Region::Custom {
                region: config.s3_region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .s3_region
                .parse::<Region>()
                .map_err(|e| anyhow!("invalid S3 region '{}': {}", config.s3_region, e))?,
        };

        let credentials = Credentials::new(
            config.s3_access_key_id.as_deref(),
            config.s3_secret_access_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| anyhow!("failed to load S3 credentials: {}", e))?;

        let mut bucket = Bucket::new(&config.s3_bucket, region, credentials)
            .map_err(|e| anyhow!("failed to open bucket '{}': {}", config.s3_bucket, e))?;

        // Custom endpoints (MinIO, R2, localstack) expect path-style addressing.
        if config.s3_endpoint.is_some() {
            bucket = bucket.with_path_style();
        }

        Ok(Self::with_bucket(Box::new(bucket), config.public_base_url.clone()))
    }

    pub fn with_bucket(bucket: Box<Bucket>, public_base_url: Option<String>) -> Self {
        let base_url = public_base_url
            .unwrap_or_else(|| bucket.url())
            .trim_end_matches('/')
            .to_string();
        Self { bucket, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn map_s3_error(context: &str, target: &str, err: S3Error) -> StoreError {
    match err {
        S3Error::HttpFailWithBody(404, _) => StoreError::NotFound(target.to_string()),
        other => StoreError::Backend(format!("{} {}: {}", context, target, other)),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload(
        &self,
        pathname: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        let response = self
            .bucket
            .put_object_with_content_type(pathname, &data, content_type)
            .await
            .map_err(|e| map_s3_error("put", pathname, e))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StoreError::Backend(format!(
                "put {} returned status {}",
                pathname, status
            )));
        }

        debug!(pathname = %pathname, size = data.len(), "Object stored");
        Ok(StoredObject {
            url: object_url(&self.base_url, pathname),
            pathname: pathname.to_string(),
            size: data.len() as u64,
            content_type: content_type.to_string(),
        })
    }

    async fn delete(&self, url: &str) -> Result<(), StoreError> {
        let key = object_key(url, &self.base_url)?;
        let response = self
            .bucket
            .delete_object(&key)
            .await
            .map_err(|e| map_s3_error("delete", url, e))?;

        match response.status_code() {
            200..=299 => Ok(()),
            404 => Err(StoreError::NotFound(url.to_string())),
            status => Err(StoreError::Backend(format!(
                "delete {} returned status {}",
                url, status
            ))),
        }
    }

    async fn head(&self, url: &str) -> Result<bool, StoreError> {
        let key = object_key(url, &self.base_url)?;
        match self.bucket.head_object(&key).await {
            Ok((_, status)) if (200..300).contains(&status) => Ok(true),
            Ok((_, 404)) => Ok(false),
            Ok((_, status)) => Err(StoreError::Backend(format!(
                "head {} returned status {}",
                url, status
            ))),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => {
                warn!(url = %url, error = %e, "Existence probe failed");
                Err(map_s3_error("head", url, e))
            }
        }
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
