//! Configuration types for nanopub-fetch

use crate::error::{Error, Result};
use crate::format::Format;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound on concurrent attempts against a single mirror
pub const DEFAULT_MAX_PARALLEL_REQUESTS_PER_SERVER: usize = 5;

/// Main configuration for fetching
///
/// Fields are organized into sub-configs:
/// - [`servers`](ServerConfig): statically known mirrors
/// - [`directory`](DirectoryConfig): bootstrap discovery when no static mirrors are given
/// - [`fetch`](FetchConfig): concurrency, timeouts, progress and report behavior
/// - [`retry`](RetryConfig): backoff for bootstrap requests
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Mirror servers (take precedence over bootstrap discovery)
    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    /// Mirror discovery settings
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Fetch behavior settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry policy for directory requests
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// Missing fields take their defaults. The result is validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the scheduler cannot work with
    ///
    /// Besides the fetch settings this requires at least one mirror source.
    pub fn validate(&self) -> Result<()> {
        self.fetch.validate()?;
        for server in &self.servers {
            check_http_url("servers", &server.public_url)?;
        }
        for bootstrap in &self.directory.bootstrap_urls {
            check_http_url("directory.bootstrap_urls", bootstrap)?;
        }
        if self.servers.is_empty() && self.directory.bootstrap_urls.is_empty() {
            return Err(Error::config(
                "servers",
                "no mirror servers and no bootstrap URLs configured",
            ));
        }
        Ok(())
    }
}

fn check_http_url(key: &str, candidate: &str) -> Result<()> {
    match url::Url::parse(candidate) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(Error::config(
            key,
            format!("unsupported scheme {:?} in {}", parsed.scheme(), candidate),
        )),
        Err(e) => Err(Error::config(key, format!("invalid URL {}: {}", candidate, e))),
    }
}

/// Mirror server configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Public base URL; artifact codes are appended to it directly
    pub public_url: String,
}

impl ServerConfig {
    /// Create a server entry from a base URL, adding a trailing `/` when missing
    pub fn new(public_url: impl Into<String>) -> Self {
        let mut public_url = public_url.into();
        if !public_url.ends_with('/') {
            public_url.push('/');
        }
        Self { public_url }
    }
}

/// Bootstrap discovery configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Servers asked for their peer lists
    #[serde(default)]
    pub bootstrap_urls: Vec<String>,

    /// Path (relative to a bootstrap URL) that lists known peers, one URL per line
    #[serde(default = "default_peers_path")]
    pub peers_path: String,

    /// Whether bootstrap servers themselves act as mirrors (default: true)
    #[serde(default = "default_true")]
    pub include_bootstrap: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            bootstrap_urls: Vec::new(),
            peers_path: default_peers_path(),
            include_bootstrap: true,
        }
    }
}

/// Fetch behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum attempts in flight against one mirror (default: 5)
    #[serde(default = "default_max_parallel")]
    pub max_parallel_requests_per_server: usize,

    /// TCP connect timeout per attempt (default: 10 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Overall per-attempt timeout (default: 10 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// Emit a progress event every N written documents (default: 100)
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Format requested from mirrors via the `Accept` header
    #[serde(default)]
    pub wire_format: Format,

    /// Randomize mirror order per attempt (default: true)
    ///
    /// When disabled mirrors are tried in directory order.
    #[serde(default = "default_true")]
    pub shuffle_servers: bool,

    /// Keep every suppressed attempt failure for an end-of-run report
    #[serde(default)]
    pub collect_report: bool,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_parallel_requests_per_server: default_max_parallel(),
            connect_timeout: default_timeout(),
            read_timeout: default_timeout(),
            progress_interval: default_progress_interval(),
            wire_format: Format::default(),
            shuffle_servers: true,
            collect_report: false,
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    /// Check the settings a scheduler works with, independent of where mirrors come from
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_requests_per_server == 0 {
            return Err(Error::config(
                "fetch.max_parallel_requests_per_server",
                "must be at least 1",
            ));
        }
        if self.progress_interval == 0 {
            return Err(Error::config("fetch.progress_interval", "must be at least 1"));
        }
        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(Error::config("fetch.read_timeout", "timeouts must be non-zero"));
        }
        Ok(())
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_peers_path() -> String {
    "peers".to_string()
}

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL_REQUESTS_PER_SERVER
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_progress_interval() -> u64 {
    100
}

fn default_user_agent() -> String {
    concat!("nanopub-fetch/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Durations are written as whole milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
