//! Configuration module
//!
//! Settings for the database, object store, job queue and image limits, read from
//! the environment (and a `.env` file when present).

use std::env;

use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const QUEUE_NAME: &str = "image-transform-jobs";
const QUEUE_PREFETCH_COUNT: usize = 5;
const QUEUE_POLL_INTERVAL_MS: u64 = 1000;
const QUEUE_MAX_REDELIVERIES: i32 = 5;
const QUEUE_VISIBILITY_TIMEOUT_SECS: i64 = 300;
const QUEUE_RETRY_BACKOFF_MAX_SECS: u64 = 300;
const MAX_UPLOAD_SIZE: usize = 20 * 1024 * 1024;
const MAX_IMAGE_DIMENSION: u32 = 8000;
/// WebP cannot encode a side longer than this
const MAX_IMAGE_DIMENSION_CEILING: u32 = 16383;
const LOCAL_STORAGE_PATH: &str = "./data/objects";
const LOCAL_STORAGE_BASE_URL: &str = "http://localhost:8080/objects";

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub timeout_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, R2, ...)
    pub aws_region: Option<String>,
    pub local_storage_path: String,
    pub local_storage_base_url: String,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub name: String,
    pub prefetch_count: usize,
    pub poll_interval_ms: u64,
    /// Deliveries after which a requeued message is dead-lettered instead
    pub max_redeliveries: i32,
    /// An unacknowledged in-flight message becomes deliverable again after this
    pub visibility_timeout_secs: i64,
    pub retry_backoff_max_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ImageLimits {
    pub max_upload_size: usize,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: QUEUE_NAME.to_string(),
            prefetch_count: QUEUE_PREFETCH_COUNT,
            poll_interval_ms: QUEUE_POLL_INTERVAL_MS,
            max_redeliveries: QUEUE_MAX_REDELIVERIES,
            visibility_timeout_secs: QUEUE_VISIBILITY_TIMEOUT_SECS,
            retry_backoff_max_secs: QUEUE_RETRY_BACKOFF_MAX_SECS,
        }
    }
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_upload_size: MAX_UPLOAD_SIZE,
            max_width: MAX_IMAGE_DIMENSION,
            max_height: MAX_IMAGE_DIMENSION,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PrismConfig {
    pub environment: String,
    pub log_format: String,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub limits: ImageLimits,
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config(pub Box<PrismConfig>);

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = PrismConfig::from_lookup(&lookup)?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.0.validate()
    }

    pub fn is_production(&self) -> bool {
        let env = self.0.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn environment(&self) -> &str {
        &self.0.environment
    }

    pub fn log_json(&self) -> bool {
        self.0.log_format.eq_ignore_ascii_case("json")
    }

    pub fn database_url(&self) -> Option<&str> {
        self.0.database.url.as_deref()
    }

    pub fn db_max_connections(&self) -> u32 {
        self.0.database.max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.0.database.timeout_seconds
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.0.storage.backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.0.storage.s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.0.storage.s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.0.storage.s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.0.storage.aws_region.as_deref()
    }

    pub fn local_storage_path(&self) -> &str {
        &self.0.storage.local_storage_path
    }

    pub fn local_storage_base_url(&self) -> &str {
        &self.0.storage.local_storage_base_url
    }

    pub fn queue(&self) -> &QueueConfig {
        &self.0.queue
    }

    pub fn limits(&self) -> &ImageLimits {
        &self.0.limits
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

impl PrismConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let backend = match non_empty(lookup, "STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::Local,
        };

        let database = DatabaseConfig {
            url: non_empty(lookup, "DATABASE_URL"),
            max_connections: parse_or(lookup, "DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            timeout_seconds: parse_or(lookup, "DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
        };

        let storage = StorageConfig {
            backend,
            s3_bucket: non_empty(lookup, "S3_BUCKET"),
            s3_region: non_empty(lookup, "S3_REGION"),
            s3_endpoint: non_empty(lookup, "S3_ENDPOINT"),
            aws_region: non_empty(lookup, "AWS_REGION"),
            local_storage_path: non_empty(lookup, "LOCAL_STORAGE_PATH")
                .unwrap_or_else(|| LOCAL_STORAGE_PATH.to_string()),
            local_storage_base_url: non_empty(lookup, "LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|| LOCAL_STORAGE_BASE_URL.to_string()),
        };

        let queue = QueueConfig {
            name: non_empty(lookup, "QUEUE_NAME").unwrap_or_else(|| QUEUE_NAME.to_string()),
            prefetch_count: parse_or(lookup, "QUEUE_PREFETCH_COUNT", QUEUE_PREFETCH_COUNT),
            poll_interval_ms: parse_or(lookup, "QUEUE_POLL_INTERVAL_MS", QUEUE_POLL_INTERVAL_MS),
            max_redeliveries: parse_or(lookup, "QUEUE_MAX_REDELIVERIES", QUEUE_MAX_REDELIVERIES),
            visibility_timeout_secs: parse_or(
                lookup,
                "QUEUE_VISIBILITY_TIMEOUT_SECS",
                QUEUE_VISIBILITY_TIMEOUT_SECS,
            ),
            retry_backoff_max_secs: parse_or(
                lookup,
                "QUEUE_RETRY_BACKOFF_MAX_SECS",
                QUEUE_RETRY_BACKOFF_MAX_SECS,
            ),
        };

        let limits = ImageLimits {
            max_upload_size: parse_or(lookup, "MAX_UPLOAD_SIZE", MAX_UPLOAD_SIZE),
            max_width: parse_or(lookup, "MAX_IMAGE_WIDTH", MAX_IMAGE_DIMENSION),
            max_height: parse_or(lookup, "MAX_IMAGE_HEIGHT", MAX_IMAGE_DIMENSION),
        };

        Ok(Self {
            environment,
            log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "pretty".to_string()),
            database,
            storage,
            queue,
            limits,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let Some(ref url) = self.database.url {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if self.storage.backend == StorageBackend::S3 {
            if self.storage.s3_bucket.is_none() {
                return Err(anyhow::anyhow!(
                    "S3_BUCKET must be set when using S3 storage backend"
                ));
            }
            if self.storage.s3_region.is_none() && self.storage.aws_region.is_none() {
                return Err(anyhow::anyhow!(
                    "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                ));
            }
        }

        if self.queue.prefetch_count == 0 {
            return Err(anyhow::anyhow!("QUEUE_PREFETCH_COUNT must be at least 1"));
        }

        if self.queue.max_redeliveries < 1 {
            return Err(anyhow::anyhow!("QUEUE_MAX_REDELIVERIES must be at least 1"));
        }

        if self.limits.max_width == 0 || self.limits.max_height == 0 {
            return Err(anyhow::anyhow!(
                "MAX_IMAGE_WIDTH and MAX_IMAGE_HEIGHT must be positive"
            ));
        }

        if self.limits.max_width > MAX_IMAGE_DIMENSION_CEILING
            || self.limits.max_height > MAX_IMAGE_DIMENSION_CEILING
        {
            return Err(anyhow::anyhow!(
                "MAX_IMAGE_WIDTH and MAX_IMAGE_HEIGHT must be at most {}",
                MAX_IMAGE_DIMENSION_CEILING
            ));
        }

        Ok(())
    }
}
