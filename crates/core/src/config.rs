//! Configuration types shared across crates.
//!
//! The configuration is built once at startup and handed to each component
//! explicitly; nothing below reads the process environment on its own.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP front door configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Deadline for reading a request body, in seconds.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Deadline for handling a request end to end, in seconds.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    /// Largest accepted upload body in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_read_timeout_secs() -> u64 {
    5
}

fn default_write_timeout_secs() -> u64 {
    10
}

fn default_max_upload_size() -> u64 {
    1024 * 1024 * 1024
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            max_upload_size: default_max_upload_size(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Request body read deadline.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// End-to-end request deadline.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.read_timeout_secs == 0 || self.write_timeout_secs == 0 {
            return Err("server timeouts must be greater than zero".to_string());
        }
        if self.max_upload_size == 0 {
            return Err("server.max_upload_size must be greater than zero".to_string());
        }
        if usize::try_from(self.max_upload_size).is_err() {
            return Err(format!(
                "server.max_upload_size {} exceeds platform address space",
                self.max_upload_size
            ));
        }
        Ok(())
    }
}

/// Chunked retrieval configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Size of each ranged fetch in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Upper bound on chunk fetches in flight for a single retrieval.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    /// Attempts per chunk, including the first. 1 disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts of the same chunk, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Optional deadline for a whole retrieval, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Upper bound for `max_concurrent_fetches`.
pub const MAX_CONCURRENT_FETCHES: usize = 256;

fn default_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    200
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: None,
        }
    }
}

impl RetrievalConfig {
    /// Delay between attempts of the same chunk.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Whole-retrieval deadline, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Validate retrieval configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !(crate::MIN_CHUNK_SIZE..=crate::MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(crate::Error::InvalidChunkSize {
                size: self.chunk_size,
                min: crate::MIN_CHUNK_SIZE,
                max: crate::MAX_CHUNK_SIZE,
            }
            .to_string());
        }
        if !(1..=MAX_CONCURRENT_FETCHES).contains(&self.max_concurrent_fetches) {
            return Err(format!(
                "retrieval.max_concurrent_fetches must be between 1 and {MAX_CONCURRENT_FETCHES}, got {}",
                self.max_concurrent_fetches
            ));
        }
        if self.max_attempts == 0 {
            return Err("retrieval.max_attempts must be at least 1".to_string());
        }
        if self.timeout_secs == Some(0) {
            return Err("retrieval.timeout_secs must be greater than zero when set".to_string());
        }
        Ok(())
    }
}

/// Content store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// IPFS node reached through its HTTP RPC API.
    Ipfs {
        /// API base URL (e.g., "http://127.0.0.1:5001").
        #[serde(default = "default_ipfs_endpoint")]
        endpoint: String,
        /// Per-request timeout in seconds.
        #[serde(default = "default_ipfs_request_timeout_secs")]
        request_timeout_secs: u64,
    },
    /// Local filesystem storage addressed by SHA-256.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
}

fn default_ipfs_endpoint() -> String {
    "http://127.0.0.1:5001".to_string()
}

fn default_ipfs_request_timeout_secs() -> u64 {
    60
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Ipfs {
            endpoint: default_ipfs_endpoint(),
            request_timeout_secs: default_ipfs_request_timeout_secs(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Ipfs {
                endpoint,
                request_timeout_secs,
            } => {
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    return Err(format!(
                        "ipfs endpoint must be an http(s) URL, got '{endpoint}'"
                    ));
                }
                if *request_timeout_secs == 0 {
                    return Err("ipfs request_timeout_secs must be greater than zero".to_string());
                }
                Ok(())
            }
            StorageConfig::Filesystem { path } => {
                if path.as_os_str().is_empty() {
                    return Err("filesystem storage path must not be empty".to_string());
                }
                Ok(())
            }
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata index configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (testing and single-node deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds. Advisory only: SQLite cannot cancel a
        /// running statement, so this is reported at startup and not enforced.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password. Prefer DEPOT_METADATA__PASSWORD over the config file.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err("postgres max_connections must be at least 1".to_string());
                }
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) => Ok(()),
                    (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    ),
                    (None, Some(_), None) => Err(
                        "postgres config requires 'database' when using individual fields"
                            .to_string(),
                    ),
                }
            }
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP front door configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Chunked retrieval configuration.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Content store backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata index configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl AppConfig {
    /// Create a test configuration.
    ///
    /// **For testing only.** Uses filesystem storage and SQLite metadata
    /// under `./data`; tests normally override both paths.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            retrieval: RetrievalConfig::default(),
            storage: StorageConfig::Filesystem {
                path: PathBuf::from("./data/storage"),
            },
            metadata: MetadataConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> crate::Result<()> {
        self.server
            .validate()
            .and_then(|_| self.retrieval.validate())
            .and_then(|_| self.storage.validate())
            .and_then(|_| self.metadata.validate())
            .map_err(crate::Error::Config)
    }
}
