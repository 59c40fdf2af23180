use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub publisher: PublisherConfig,
    pub lifecycle: LifecycleConfig,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
    /// Maximum upload size in bytes (per file)
    pub max_upload_size: u64,
    /// Deadline applied to every HTTP request
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Gcs,
    Local,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// Externally reachable base URL, used to build local signed URLs
    pub public_base_url: String,
    /// HMAC secret for local signed URLs
    pub url_signing_secret: String,
    /// Path to GCS service account JSON (optional, defaults to ADC; signed URLs need it)
    pub gcs_credentials_file: Option<String>,
    /// Bucket that receives uploaded project resources
    pub resource_bucket: String,
    /// Lifetime of presigned resource URLs
    pub url_ttl: Duration,
}

#[derive(Debug, Clone)]
pub enum PublisherBackend {
    Disabled,
    RabbitHttp,
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub backend: PublisherBackend,
    /// Base URL of the RabbitMQ management API
    pub rabbitmq_api_url: String,
    pub rabbitmq_vhost: String,
    pub rabbitmq_username: String,
    pub rabbitmq_password: String,
    /// Exchange that receives search-index events
    pub exchange: String,
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Whole-allocation retries after an `AllocationConflict`
    pub allocation_retries: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: "./files".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            url_signing_secret: uuid::Uuid::new_v4().to_string(),
            gcs_credentials_file: None,
            resource_bucket: "project-resources".to_string(),
            url_ttl: Duration::from_secs(3600),
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            backend: PublisherBackend::Disabled,
            rabbitmq_api_url: "http://localhost:15672".to_string(),
            rabbitmq_vhost: "/".to_string(),
            rabbitmq_username: "guest".to_string(),
            rabbitmq_password: "guest".to_string(),
            exchange: "project-box.search".to_string(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            allocation_retries: 5,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50 * 1024 * 1024); // 50MB

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        let storage_backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "gcs" => StorageBackend::Gcs,
            _ => StorageBackend::Local,
        };

        let defaults = StorageConfig::default();
        let storage = StorageConfig {
            backend: storage_backend,
            local_storage_path: std::env::var("LOCAL_STORAGE_PATH")
                .unwrap_or(defaults.local_storage_path),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            url_signing_secret: std::env::var("URL_SIGNING_SECRET")
                .unwrap_or(defaults.url_signing_secret),
            gcs_credentials_file: std::env::var("GCS_CREDENTIALS_FILE").ok(),
            resource_bucket: std::env::var("RESOURCE_BUCKET").unwrap_or(defaults.resource_bucket),
            url_ttl: std::env::var("URL_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.url_ttl),
        };

        let publisher_backend = match std::env::var("INDEX_PUBLISHER")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "rabbitmq" => PublisherBackend::RabbitHttp,
            _ => PublisherBackend::Disabled,
        };

        let defaults = PublisherConfig::default();
        let publisher = PublisherConfig {
            backend: publisher_backend,
            rabbitmq_api_url: std::env::var("RABBITMQ_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.rabbitmq_api_url),
            rabbitmq_vhost: std::env::var("RABBITMQ_VHOST").unwrap_or(defaults.rabbitmq_vhost),
            rabbitmq_username: std::env::var("RABBITMQ_USERNAME")
                .unwrap_or(defaults.rabbitmq_username),
            rabbitmq_password: std::env::var("RABBITMQ_PASSWORD")
                .unwrap_or(defaults.rabbitmq_password),
            exchange: std::env::var("INDEX_EXCHANGE").unwrap_or(defaults.exchange),
        };

        let allocation_retries = std::env::var("ALLOCATION_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LifecycleConfig::default().allocation_retries);

        let config = Config {
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            storage,
            publisher,
            lifecycle: LifecycleConfig { allocation_retries },
            test_mode,
            max_upload_size,
            request_timeout: Duration::from_secs(request_timeout_secs),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.resource_bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "RESOURCE_BUCKET cannot be empty".to_string(),
            ));
        }

        if self.storage.url_ttl.is_zero() {
            return Err(ConfigError::ValidationError(
                "URL_TTL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "REQUEST_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.lifecycle.allocation_retries == 0 {
            return Err(ConfigError::ValidationError(
                "ALLOCATION_RETRIES must be at least 1".to_string(),
            ));
        }

        if matches!(self.publisher.backend, PublisherBackend::RabbitHttp)
            && self.publisher.exchange.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "INDEX_EXCHANGE is required when INDEX_PUBLISHER=rabbitmq".to_string(),
            ));
        }

        if matches!(self.storage.backend, StorageBackend::Gcs)
            && self.storage.gcs_credentials_file.is_none()
        {
            tracing::warn!(
                "GCS_CREDENTIALS_FILE is not set. Uploads will use ambient credentials, \
                 but presigned resource URLs cannot be generated."
            );
        }

        if std::env::var("URL_SIGNING_SECRET").is_err()
            && matches!(self.storage.backend, StorageBackend::Local)
        {
            tracing::warn!(
                "URL_SIGNING_SECRET is not set. Signed object URLs will stop working after a restart."
            );
        }

        Ok(())
    }
}
