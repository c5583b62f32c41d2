// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline configuration.
//!
//! Sources are applied in order, later ones overriding earlier ones:
//!
//! 1. **Defaults** - see [`crate::constants`]
//! 2. **YAML file** - `eslog.yaml` in the configuration directory, if present
//! 3. **Environment variables** - `ESLOG_*`
//!
//! A source that cannot be parsed is logged and skipped; the remaining sources
//! still apply. Semantic checks (a log index is set, at least one worker, ...)
//! happen later in [`Config::validate`], when a pipeline is built.
//!
//! Durations are given in whole or fractional seconds. A `flush_timeout` of
//! zero means no deadline.

pub mod env;
pub mod log_level;
pub mod yaml;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::{env::EnvConfigSource, log_level::LogLevel, yaml::YamlConfigSource};
use crate::constants::{
    DEFAULT_FLUSH_INTERVAL, DEFAULT_HOST, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_QUEUE_SIZE,
    DEFAULT_PORT, DEFAULT_WORKERS,
};
use crate::error::PipelineError;

/// Name of the YAML file looked up in the configuration directory.
pub const CONFIG_FILE_NAME: &str = "eslog.yaml";

/// Overwrites `$config.$field` when the source carries a value.
macro_rules! merge_option_to_value {
    ($config:expr, $source:expr, $field:ident) => {
        if let Some(value) = &$source.$field {
            $config.$field = value.clone();
        }
    };
}

/// Overwrites the optional `$config.$field` when the source carries a value.
macro_rules! merge_option {
    ($config:expr, $source:expr, $field:ident) => {
        if $source.$field.is_some() {
            $config.$field.clone_from(&$source.$field);
        }
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Elasticsearch host, used when `url` is not set.
    pub host: String,
    /// Elasticsearch port, used when `url` is not set.
    pub port: u16,
    /// Full base URL of the cluster. Takes precedence over `host` and `port`.
    pub url: Option<String>,
    /// Target index. Required.
    pub log_index: String,
    /// Capacity of the ingress queue. Zero is treated as one.
    pub max_queue_size: usize,
    pub workers: usize,
    pub max_batch_size: usize,
    pub flush_interval: Duration,
    /// Deadline of a single bulk request. `None` waits as long as the server does.
    pub flush_timeout: Option<Duration>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub proxy_https: Option<String>,
    /// Ping the cluster before accepting records.
    pub verify_connectivity: bool,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            url: None,
            log_index: String::new(),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            workers: DEFAULT_WORKERS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_timeout: None,
            username: None,
            password: None,
            proxy_https: None,
            verify_connectivity: false,
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Base URL of the cluster, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("http://{}:{}", self.host.trim(), self.port),
        }
    }

    /// Rejects configurations a pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.log_index.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "log_index must be set".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(PipelineError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "flush_interval must be greater than zero".to_string(),
            ));
        }
        if self.url.is_none() && self.host.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "either url or host must be set".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(reason) => write!(f, "{reason}"),
        }
    }
}

#[allow(clippy::module_name_repetitions)]
pub trait ConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError>;
}

#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Config,
}

#[allow(clippy::module_name_repetitions)]
impl ConfigBuilder {
    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(&mut self) -> Config {
        let mut failed_sources = 0;
        for source in &self.sources {
            if let Err(e) = source.load(&mut self.config) {
                error!("ESLOG | Failed to load config: {e}");
                failed_sources += 1;
            }
        }

        if !self.sources.is_empty() && failed_sources == self.sources.len() {
            debug!("ESLOG | All sources failed to load config, using default config.");
        }

        if self.config.proxy_https.is_none() {
            if let Ok(https_proxy) = std::env::var("HTTPS_PROXY") {
                if !https_proxy.trim().is_empty() {
                    self.config.proxy_https = Some(https_proxy);
                }
            }
        }

        self.config.clone()
    }
}

/// Overrides shared by the YAML `elasticsearch` section and the environment.
#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub host: Option<String>,
    #[serde(deserialize_with = "deserialize_option_lossy")]
    pub port: Option<u16>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub url: Option<String>,
    #[serde(alias = "logIndex", deserialize_with = "deserialize_optional_string")]
    pub log_index: Option<String>,
    #[serde(alias = "maxQueueSize", deserialize_with = "deserialize_option_lossy")]
    pub max_queue_size: Option<usize>,
    #[serde(deserialize_with = "deserialize_option_lossy")]
    pub workers: Option<usize>,
    #[serde(alias = "maxBatchSize", deserialize_with = "deserialize_option_lossy")]
    pub max_batch_size: Option<usize>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub flush_interval: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub flush_timeout: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub username: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub password: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub proxy_https: Option<String>,
    #[serde(deserialize_with = "deserialize_option_lossy")]
    pub verify_connectivity: Option<bool>,
    pub log_level: Option<LogLevel>,
}

impl ConfigOverrides {
    pub(crate) fn merge_into(&self, config: &mut Config) {
        merge_option_to_value!(config, self, host);
        merge_option_to_value!(config, self, port);
        merge_option!(config, self, url);
        merge_option_to_value!(config, self, log_index);
        merge_option_to_value!(config, self, max_queue_size);
        merge_option_to_value!(config, self, workers);
        merge_option_to_value!(config, self, max_batch_size);
        merge_option_to_value!(config, self, flush_interval);
        merge_option!(config, self, username);
        merge_option!(config, self, password);
        merge_option!(config, self, proxy_https);
        merge_option_to_value!(config, self, verify_connectivity);
        merge_option_to_value!(config, self, log_level);

        if let Some(timeout) = self.flush_timeout {
            config.flush_timeout = (!timeout.is_zero()).then_some(timeout);
        }
    }
}

#[must_use]
pub fn get_config(config_directory: &Path) -> Config {
    let path = config_directory.join(CONFIG_FILE_NAME);
    ConfigBuilder::default()
        .add_source(Box::new(YamlConfigSource { path }))
        .add_source(Box::new(EnvConfigSource))
        .build()
}

/// Accepts strings and, since environment values are parsed loosely, numbers
/// and booleans. Blank strings count as unset.
pub fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Null => Ok(None),
        other => {
            error!("Failed to parse value, expected a string, got: {other}, ignoring");
            Ok(None)
        }
    }
}

/// Accepts the value in its own type or as a string holding it. Anything else
/// is logged and ignored.
pub fn deserialize_option_lossy<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Null => return Ok(None),
        Value::String(s) => s.trim().parse::<T>().ok(),
        other => serde_json::from_value::<T>(other.clone()).ok(),
    };
    if parsed.is_none() {
        error!("Failed to deserialize optional value: {value}, ignoring");
    }
    Ok(parsed)
}

pub fn deserialize_optional_duration_from_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let secs = match &value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    // Rejects negative, NaN, infinite and out of range values.
    let duration = secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok());
    if duration.is_none() {
        error!("Failed to parse duration: {value} is not a valid number of seconds, ignoring");
    }
    Ok(duration)
}
