use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub security: SecurityConfig,
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

/// Job worker and merge task tuning
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of worker loops polling the job table
    pub concurrency: usize,
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
    /// How long a claimed job stays invisible to other workers
    pub lock_timeout: Duration,
    /// Maximum dependent records reassigned per merge invocation
    pub merge_batch_limit: i64,
    /// Delay before a failed merge invocation runs again
    pub merge_retry_delay: Duration,
    /// Delay before the destination forecast is regenerated after a merge
    pub forecast_delay: Duration,
}

/// Security configuration for the merge trigger API
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Bearer token accepted by the API. When unset the merge API rejects every request.
    pub api_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            database: DatabaseConfig::from_env()?,
            worker: WorkerConfig::from_env(),
            security: SecurityConfig::from_env()?,
        })
    }
}

/// Reads a numeric variable, falling back to `default` when unset or invalid
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Load worker configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            concurrency: env_or("WORKER_CONCURRENCY", 2usize).max(1),
            poll_interval: Duration::from_millis(env_or("WORKER_POLL_INTERVAL_MS", 1000)),
            lock_timeout: Duration::from_secs(env_or("WORKER_LOCK_TIMEOUT_SECS", 600)),
            merge_batch_limit: env_or("MERGE_BATCH_LIMIT", 1000i64).max(1),
            merge_retry_delay: Duration::from_secs(env_or("MERGE_RETRY_DELAY_SECS", 300)),
            forecast_delay: Duration::from_secs(env_or("FORECAST_DELAY_SECS", 60)),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval: Duration::from_secs(1),
            lock_timeout: Duration::from_secs(600),
            merge_batch_limit: 1000,
            merge_retry_delay: Duration::from_secs(300),
            forecast_delay: Duration::from_secs(60),
        }
    }
}

impl DatabaseConfig {
    /// Load database configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        Ok(Self {
            url,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            min_connections: env_or("DATABASE_MIN_CONNECTIONS", 1),
            acquire_timeout: Duration::from_secs(env_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 5)),
            idle_timeout: Duration::from_secs(env_or("DATABASE_IDLE_TIMEOUT_SECS", 600)),
            max_lifetime: Duration::from_secs(env_or("DATABASE_MAX_LIFETIME_SECS", 1800)),
        })
    }
}

impl SecurityConfig {
    /// Load security configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_token = env::var("MERGE_API_TOKEN").ok().filter(|t| !t.is_empty());

        if let Some(token) = &api_token {
            if token.len() < 32 {
                return Err(ConfigError::WeakApiToken);
            }
        }

        Ok(Self { api_token })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    MissingDatabaseUrl,
    WeakApiToken,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "PORT must be a valid number"),
            ConfigError::MissingDatabaseUrl => {
                write!(f, "DATABASE_URL environment variable is required")
            }
            ConfigError::WeakApiToken => {
                write!(f, "MERGE_API_TOKEN must be at least 32 characters long")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
