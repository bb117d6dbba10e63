use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub uploads: UploadConfig,
    pub quota: QuotaConfig,
    pub history: HistoryConfig,
    pub throttle: ThrottleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: String,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub s3_endpoint: Option<String>,
    /// Prefix used to build public object URLs. Falls back to the bucket URL.
    pub public_base_url: Option<String>,
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    pub admin_secret: String,
}

// Keeps the admin secret out of `info!("{:?}", config)`.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("admin_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct UploadConfig {
    pub path_prefix: String,
    pub max_file_bytes: u64,
    pub rate_max_uploads: u32,
    pub rate_window_secs: u64,
    pub ticket_secret: Option<String>,
    pub ticket_ttl_secs: u64,
}

impl std::fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadConfig")
            .field("path_prefix", &self.path_prefix)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("rate_max_uploads", &self.rate_max_uploads)
            .field("rate_window_secs", &self.rate_window_secs)
            .field("ticket_secret", &self.ticket_secret.as_ref().map(|_| "<redacted>"))
            .field("ticket_ttl_secs", &self.ticket_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    pub max_bytes: u64,
    pub max_uploads: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    pub cap: usize,
    pub verify_on_read: bool,
    pub reconcile_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    /// Zero disables the per-client request throttle.
    pub requests_per_second: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from a fixed set of variables.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let admin_secret = lookup("ADMIN_SECRET")
            .filter(|s| !s.trim().is_empty())
            .context("ADMIN_SECRET must be set to a non-empty value")?;

        let config = Self {
            server: ServerConfig {
                port: parse_or(&lookup, "PORT", 3000)?,
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                cors_allowed_origins: lookup("ALLOWED_ORIGINS")
                    .unwrap_or_else(|| "*".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            storage: StorageConfig {
                provider: lookup("STORAGE_PROVIDER").unwrap_or_else(|| "s3".to_string()),
                s3_bucket: lookup("S3_BUCKET").unwrap_or_default(),
                s3_region: lookup("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                s3_access_key_id: lookup("AWS_ACCESS_KEY_ID"),
                s3_secret_access_key: lookup("AWS_SECRET_ACCESS_KEY"),
                s3_endpoint: lookup("S3_ENDPOINT"),
                public_base_url: lookup("PUBLIC_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string()),
            },
            auth: AuthConfig { admin_secret },
            uploads: UploadConfig {
                path_prefix: lookup("UPLOAD_PATH_PREFIX")
                    .unwrap_or_else(|| "d".to_string())
                    .trim_matches('/')
                    .to_string(),
                max_file_bytes: parse_or(&lookup, "MAX_FILE_BYTES", 100 * 1024 * 1024)?,
                rate_max_uploads: parse_or(&lookup, "UPLOAD_RATE_MAX", 20)?,
                rate_window_secs: parse_or(&lookup, "UPLOAD_RATE_WINDOW_SECS", 60 * 60)?,
                ticket_secret: lookup("TICKET_SECRET").filter(|s| !s.is_empty()),
                ticket_ttl_secs: parse_or(&lookup, "TICKET_TTL_SECS", 600)?,
            },
            quota: QuotaConfig {
                max_bytes: parse_or(&lookup, "DAILY_QUOTA_BYTES", 1024 * 1024 * 1024)?,
                max_uploads: parse_or(&lookup, "DAILY_QUOTA_UPLOADS", 100)?,
                window_secs: parse_or(&lookup, "QUOTA_WINDOW_SECS", 24 * 60 * 60)?,
            },
            history: HistoryConfig {
                cap: parse_or(&lookup, "HISTORY_CAP", 100)?,
                verify_on_read: parse_or(&lookup, "VERIFY_HISTORY_ON_READ", true)?,
                reconcile_concurrency: parse_or(&lookup, "RECONCILE_CONCURRENCY", 8)?,
            },
            throttle: ThrottleConfig {
                requests_per_second: parse_or(&lookup, "REQUESTS_PER_SECOND", 0)?,
                burst: parse_or(&lookup, "REQUEST_BURST", 20)?,
            },
            logging: LoggingConfig {
                log_dir: lookup("LOG_DIR").filter(|s| !s.is_empty()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.history.cap == 0 {
            bail!("HISTORY_CAP must be at least 1");
        }
        if self.history.reconcile_concurrency == 0 {
            bail!("RECONCILE_CONCURRENCY must be at least 1");
        }
        if self.uploads.max_file_bytes == 0 {
            bail!("MAX_FILE_BYTES must be greater than zero");
        }
        match self.storage.provider.as_str() {
            "memory" => {}
            "s3" if self.storage.s3_bucket.is_empty() => {
                bail!("S3_BUCKET must be set when STORAGE_PROVIDER=s3");
            }
            "s3" => {}
            other => bail!("unknown STORAGE_PROVIDER '{}'", other),
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        _ => Ok(default),
    }
}
