//! Configuration types for billing-dispatch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};
use utoipa::ToSchema;

/// Environment variable naming the JSON configuration file read by the binary
pub const CONFIG_PATH_ENV: &str = "BILLING_DISPATCH_CONFIG";

/// Main configuration for the invoice dispatcher
///
/// Every field has a default, so `{}` is a valid configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Dispatcher concurrency cap, requeue limit and slot cooldown
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Intra-unit retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Invoicing collaborator endpoint
    #[serde(default)]
    pub invoicing: InvoicingConfig,

    /// Permanent-failure log sink
    #[serde(default)]
    pub failure_log: FailureLogConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Load configuration from a JSON file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the file named by [`CONFIG_PATH_ENV`], or the
    /// defaults when the variable is unset
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path),
            _ => {
                let config = Config::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Reject values the dispatcher cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.max_concurrent == 0 {
            return Err(Error::config(
                "must be at least 1",
                "dispatch.max_concurrent",
            ));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(Error::config("must be at least 1", "dispatch.max_attempts"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("must be at least 1", "retry.max_attempts"));
        }
        if self.invoicing.request_timeout.is_zero() {
            return Err(Error::config(
                "must be greater than 0",
                "invoicing.request_timeout",
            ));
        }

        let parsed = url::Url::parse(&self.invoicing.url)
            .map_err(|e| Error::config(format!("invalid URL: {}", e), "invoicing.url"))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(Error::config(
                format!(
                    "URL scheme '{}' is not allowed; only http and https are supported",
                    scheme
                ),
                "invoicing.url",
            )),
        }
    }
}

/// Dispatcher configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DispatchConfig {
    /// Maximum execution units running at once (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Launches a task gets before it is logged as a permanent failure (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between a slot freeing up and it accepting the next task (default: 300ms)
    #[serde(default = "default_slot_cooldown", with = "duration_millis")]
    #[schema(value_type = u64)]
    pub slot_cooldown: Duration,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_attempts: default_max_attempts(),
            slot_cooldown: default_slot_cooldown(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Retry configuration for transient invoicing failures inside one execution unit
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Total tries per unit, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step; the wait after try `n` is `base_delay * n` (default: 300ms)
    #[serde(default = "default_base_delay", with = "duration_millis")]
    #[schema(value_type = u64)]
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
        }
    }
}

/// Invoicing collaborator configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoicingConfig {
    /// URL drafts are POSTed to (default: "http://localhost:3003/invoices")
    #[serde(default = "default_invoicing_url")]
    pub url: String,

    /// Per-call timeout (default: 5000ms)
    #[serde(default = "default_request_timeout", with = "duration_millis")]
    #[schema(value_type = u64)]
    pub request_timeout: Duration,
}

impl Default for InvoicingConfig {
    fn default() -> Self {
        Self {
            url: default_invoicing_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Failure log configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FailureLogConfig {
    /// Newline-delimited JSON file permanent failures are appended to (default: "failures.log")
    #[serde(default = "default_failure_log_path")]
    #[schema(value_type = String)]
    pub path: PathBuf,
}

impl Default for FailureLogConfig {
    fn default() -> Self {
        Self {
            path: default_failure_log_path(),
        }
    }
}

/// Server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:3006)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_slot_cooldown() -> Duration {
    Duration::from_millis(300)
}

fn default_event_buffer() -> usize {
    1000
}

fn default_base_delay() -> Duration {
    Duration::from_millis(300)
}

fn default_invoicing_url() -> String {
    "http://localhost:3003/invoices".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_millis(5000)
}

fn default_failure_log_path() -> PathBuf {
    PathBuf::from("failures.log")
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3006))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

// Durations are written as integer milliseconds
mod duration_millis {
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
