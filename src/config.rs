//! Configuration module.
//!
//! Loads configuration from a TOML file with environment variable
//! substitution, then applies the well-known environment overrides.
//!
//! # Example
//!
//! ```toml
//! [queue]
//! url = "${SQS_QUEUE_URL}"
//! dlq_url = "${DLQ_URL}"
//! region = "us-east-1"
//!
//! [worker]
//! poll_wait_secs = 20
//! max_messages = 10
//!
//! [store]
//! url = "${MONGODB_URL}"
//!
//! [predictor]
//! url = "http://localhost:8000/predict"
//!
//! [routing.aliases]
//! "waste.prediction" = "WastePredictionEvent"
//! ```
//!
//! # Environment overrides
//!
//! | Variable           | Field                     |
//! |--------------------|---------------------------|
//! | `SQS_QUEUE_URL`    | `queue.url`               |
//! | `DLQ_URL`          | `queue.dlq_url`           |
//! | `AWS_REGION`       | `queue.region`            |
//! | `SQS_ENDPOINT_URL` | `queue.endpoint_url`      |
//! | `POLL_WAIT`        | `worker.poll_wait_secs`   |
//! | `MAX_MESSAGES`     | `worker.max_messages`     |
//! | `MONGODB_URL`      | `store.url`               |
//! | `PREDICTOR_URL`    | `predictor.url`           |

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::poller::PollerSettings;

/// Longest long-poll wait SQS accepts
pub const MAX_POLL_WAIT_SECS: u64 = 20;

/// Largest receive batch SQS accepts
pub const MAX_BATCH_SIZE: i32 = 10;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: String, value: String },
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConsumerConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub predictor: PredictorConfig,

    #[serde(default)]
    pub routing: RoutingConfig,
}

/// Source and dead-letter queue configuration
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub dlq_url: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Alternate SQS endpoint (e.g. LocalStack)
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            dlq_url: String::new(),
            region: default_region(),
            endpoint_url: None,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Poller configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_wait_secs")]
    pub poll_wait_secs: u64,

    #[serde(default = "default_max_messages")]
    pub max_messages: i32,

    /// Process different message groups of a batch concurrently
    #[serde(default)]
    pub concurrent_groups: bool,

    #[serde(default = "default_receive_error_backoff_secs")]
    pub receive_error_backoff_secs: u64,

    /// Log statistics every N handled messages
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_wait_secs: default_poll_wait_secs(),
            max_messages: default_max_messages(),
            concurrent_groups: false,
            receive_error_backoff_secs: default_receive_error_backoff_secs(),
            stats_interval: default_stats_interval(),
        }
    }
}

fn default_poll_wait_secs() -> u64 {
    20
}

fn default_max_messages() -> i32 {
    10
}

fn default_receive_error_backoff_secs() -> u64 {
    5
}

fn default_stats_interval() -> u64 {
    100
}

/// Document store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            database: default_database(),
        }
    }
}

fn default_database() -> String {
    crate::DEFAULT_DATABASE.to_string()
}

/// Prediction service configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PredictorConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    10000
}

/// Extra event name aliases: alias -> registered event name
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RoutingConfig {
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl ConsumerConfig {
    /// Load configuration from the default path or the CONSUMER_CONFIG env
    /// var, then apply environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var("CONSUMER_CONFIG").unwrap_or_else(|_| "config/consumer.toml".to_string());

        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|name| env::var(name).ok())?;
        config.validate()?;

        info!(
            queue_url = %config.queue.url,
            dlq_url = %config.queue.dlq_url,
            poll_wait_secs = config.worker.poll_wait_secs,
            max_messages = config.worker.max_messages,
            aliases = config.routing.aliases.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Parse a configuration file. A missing file yields the defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, using defaults and environment"
            );
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let content = substitute_env_vars(&content);

        debug!("Parsing TOML configuration");
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SQS_QUEUE_URL") {
            self.queue.url = v;
        }
        if let Some(v) = get("DLQ_URL") {
            self.queue.dlq_url = v;
        }
        if let Some(v) = get("AWS_REGION") {
            self.queue.region = v;
        }
        if let Some(v) = get("SQS_ENDPOINT_URL") {
            self.queue.endpoint_url = Some(v);
        }
        if let Some(v) = get("POLL_WAIT") {
            self.worker.poll_wait_secs = parse_number("POLL_WAIT", &v)?;
        }
        if let Some(v) = get("MAX_MESSAGES") {
            self.worker.max_messages = parse_number("MAX_MESSAGES", &v)?;
        }
        if let Some(v) = get("MONGODB_URL") {
            self.store.url = v;
        }
        if let Some(v) = get("PREDICTOR_URL") {
            self.predictor.url = v;
        }
        Ok(())
    }

    /// Check that everything the poller needs is present and in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("queue.url (SQS_QUEUE_URL)", &self.queue.url)?;
        require("queue.dlq_url (DLQ_URL)", &self.queue.dlq_url)?;
        require("store.url (MONGODB_URL)", &self.store.url)?;
        require("predictor.url (PREDICTOR_URL)", &self.predictor.url)?;

        if self.queue.url == self.queue.dlq_url {
            return Err(ConfigError::ValidationError(
                "queue.url and queue.dlq_url must differ".to_string(),
            ));
        }

        if self.worker.poll_wait_secs > MAX_POLL_WAIT_SECS {
            return Err(ConfigError::ValidationError(format!(
                "worker.poll_wait_secs must be between 0 and {MAX_POLL_WAIT_SECS}"
            )));
        }

        if !(1..=MAX_BATCH_SIZE).contains(&self.worker.max_messages) {
            return Err(ConfigError::ValidationError(format!(
                "worker.max_messages must be between 1 and {MAX_BATCH_SIZE}"
            )));
        }

        if !self.predictor.url.starts_with("http://") && !self.predictor.url.starts_with("https://")
        {
            return Err(ConfigError::ValidationError(
                "predictor.url must start with http:// or https://".to_string(),
            ));
        }

        for (alias, target) in &self.routing.aliases {
            if alias.is_empty() || target.is_empty() {
                return Err(ConfigError::ValidationError(
                    "routing.aliases entries must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            queue_url: self.queue.url.clone(),
            max_messages: self.worker.max_messages,
            wait_time: Duration::from_secs(self.worker.poll_wait_secs),
            receive_error_backoff: Duration::from_secs(self.worker.receive_error_backoff_secs),
            concurrent_groups: self.worker.concurrent_groups,
            stats_interval: self.worker.stats_interval,
        }
    }

    pub fn predictor_timeout(&self) -> Duration {
        Duration::from_millis(self.predictor.timeout_ms)
    }
}

fn require(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(name.to_string()));
    }
    if value.contains("${") {
        warn!(field = %name, "Field contains unsubstituted environment variable");
        return Err(ConfigError::MissingField(name.to_string()));
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
    })
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> String {
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                    caps[0].to_string()
                }
            }
        })
        .to_string()
}
