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
    pub auth: AuthConfig,
    pub media: MediaConfig,
    pub services: ServicesConfig,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
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
    /// GCS bucket name (required when backend is gcs)
    pub gcs_bucket: Option<String>,
    /// Path to GCS service account JSON (optional, defaults to ADC)
    pub gcs_credentials_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 secret shared with the upstream SSO
    pub jwt_secret: String,
    pub session_cookie: String,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// JPEG quality for re-encoded derivatives (1-100)
    pub image_quality: u8,
    pub derivative_max_attempts: u32,
    pub derivative_poll_interval_secs: u64,
    pub ffprobe_path: String,
    pub ffprobe_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServicesConfig {
    /// Reverse geocoding endpoint, queried with `lat` and `lon`
    pub geocode_url: Option<String>,
    /// External full-text search endpoint, queried with `q`
    pub search_url: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: "./files".to_string(),
            gcs_bucket: None,
            gcs_credentials_file: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            session_cookie: "hub_session".to_string(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            image_quality: 80,
            derivative_max_attempts: 3,
            derivative_poll_interval_secs: 30,
            ffprobe_path: "ffprobe".to_string(),
            ffprobe_timeout_secs: 30,
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            geocode_url: None,
            search_url: None,
            http_timeout_secs: 10,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
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

        let max_upload_size = env_parse("MAX_UPLOAD_SIZE", 50 * 1024 * 1024); // 50MB

        let storage_backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "gcs" => StorageBackend::Gcs,
            _ => StorageBackend::Local,
        };

        let local_storage_path =
            std::env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "./files".to_string());

        let gcs_bucket = std::env::var("GCS_BUCKET").ok();
        let gcs_credentials_file = std::env::var("GCS_CREDENTIALS_FILE").ok();

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_default();
        let session_cookie =
            std::env::var("SESSION_COOKIE").unwrap_or_else(|_| "hub_session".to_string());

        let media_defaults = MediaConfig::default();
        let media = MediaConfig {
            image_quality: env_parse("IMAGE_QUALITY", media_defaults.image_quality),
            derivative_max_attempts: env_parse(
                "DERIVATIVE_MAX_ATTEMPTS",
                media_defaults.derivative_max_attempts,
            ),
            derivative_poll_interval_secs: env_parse(
                "DERIVATIVE_POLL_INTERVAL_SECS",
                media_defaults.derivative_poll_interval_secs,
            ),
            ffprobe_path: std::env::var("FFPROBE_PATH").unwrap_or(media_defaults.ffprobe_path),
            ffprobe_timeout_secs: env_parse(
                "FFPROBE_TIMEOUT_SECS",
                media_defaults.ffprobe_timeout_secs,
            ),
        };

        let services = ServicesConfig {
            geocode_url: std::env::var("GEOCODE_URL").ok().filter(|s| !s.is_empty()),
            search_url: std::env::var("SEARCH_URL").ok().filter(|s| !s.is_empty()),
            http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS", 10),
        };

        let config = Config {
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            storage: StorageConfig {
                backend: storage_backend,
                local_storage_path,
                gcs_bucket,
                gcs_credentials_file,
            },
            auth: AuthConfig {
                jwt_secret,
                session_cookie,
            },
            media,
            services,
            test_mode,
            max_upload_size,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.storage.backend, StorageBackend::Gcs) && self.storage.gcs_bucket.is_none()
        {
            return Err(ConfigError::ValidationError(
                "GCS_BUCKET is required when STORAGE_BACKEND=gcs".to_string(),
            ));
        }

        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "JWT_SECRET cannot be empty".to_string(),
            ));
        }

        if self.auth.session_cookie.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "SESSION_COOKIE cannot be empty".to_string(),
            ));
        }

        if !(1..=100).contains(&self.media.image_quality) {
            return Err(ConfigError::ValidationError(
                "IMAGE_QUALITY must be between 1 and 100".to_string(),
            ));
        }

        if self.media.derivative_max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "DERIVATIVE_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if self.auth.jwt_secret.len() < 32 {
            tracing::warn!(
                "JWT_SECRET is shorter than 32 bytes. Session tokens are easier to forge."
            );
        }

        Ok(())
    }

    /// Bucket label recorded on every file row.
    pub fn bucket_name(&self) -> &str {
        match self.storage.backend {
            StorageBackend::Gcs => self.storage.gcs_bucket.as_deref().unwrap_or("gcs"),
            StorageBackend::Local => "local",
        }
    }
}
