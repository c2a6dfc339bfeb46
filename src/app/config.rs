use crate::buffer::BatchConfig;
use crate::sender::{Network, PayloadFormat};
use crate::signer::AuthParam;
use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
    #[error("Command line error: {0}")]
    Cli(#[from] clap::Error),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

impl ConfigError {
    /// Every problem found, for `Invalid`; empty otherwise.
    pub fn problems(&self) -> &[String] {
        match self {
            ConfigError::Invalid(problems) => problems,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Output format of the shipper's own logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Raw configuration as given on the command line, environment or file.
///
/// Required values are optional here so that every missing field can be
/// reported at once by [`Config::validate`].
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// CLS region, e.g. ap-guangzhou
    #[arg(long, env = "CLS_REGION")]
    pub region: Option<String>,

    /// API secret id
    #[arg(long, env = "CLS_SECRET_ID")]
    pub secret_id: Option<String>,

    /// API secret key
    #[arg(long, env = "CLS_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Session token (may be empty for permanent keys)
    #[arg(long, env = "CLS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Logset the topic belongs to
    #[arg(long, env = "CLS_LOGSET")]
    pub logset: Option<String>,

    /// Target topic id
    #[arg(long, env = "CLS_TOPIC")]
    pub topic: Option<String>,

    /// Use the internal network endpoint instead of the public one
    #[arg(long, env = "CLS_USE_INTERNAL_NETWORK", default_value_t = true, action = ArgAction::Set)]
    pub use_internal_network: bool,

    /// Fixed endpoint host, replacing the region-derived one
    #[arg(long, env = "CLS_ENDPOINT_HOST")]
    pub endpoint_host: Option<String>,

    /// Flush once a batch reaches this many encoded bytes
    #[arg(long, env = "CLS_MAX_BATCH_BYTES", default_value_t = 1024 * 1024)]
    pub max_batch_bytes: usize,

    /// Flush once a batch reaches this many records
    #[arg(long, env = "CLS_MAX_BATCH_COUNT", default_value_t = 1024)]
    pub max_batch_count: usize,

    /// Flush interval in seconds
    #[arg(long, env = "CLS_FLUSH_INTERVAL_SECS", default_value_t = 4)]
    pub flush_interval_secs: u64,

    /// Depth of the inbound record channel
    #[arg(long, env = "CLS_CHANNEL_CAPACITY", default_value_t = 1024)]
    pub channel_capacity: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "CLS_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// How long shutdown waits for in-flight uploads, in seconds
    #[arg(long, env = "CLS_SHUTDOWN_GRACE_SECS", default_value_t = 4)]
    pub shutdown_grace_secs: u64,

    /// Request body encoding
    #[arg(long, env = "CLS_PAYLOAD_FORMAT", default_value = "protobuf")]
    pub payload_format: PayloadFormat,

    /// LogGroup source (defaults to the hostname)
    #[arg(long, env = "CLS_SOURCE")]
    pub source: Option<String>,

    /// LogGroup filename
    #[arg(long, env = "CLS_FILENAME")]
    pub filename: Option<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Configuration file path (optional)
    #[arg(long, env = "CLS_CONFIG_FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: None,
            secret_id: None,
            secret_key: None,
            token: None,
            logset: None,
            topic: None,
            use_internal_network: true,
            endpoint_host: None,
            max_batch_bytes: 1024 * 1024,
            max_batch_count: 1024,
            flush_interval_secs: 4,
            channel_capacity: 1024,
            request_timeout_secs: 30,
            shutdown_grace_secs: 4,
            payload_format: PayloadFormat::Protobuf,
            source: None,
            filename: None,
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
            config_file: None,
        }
    }
}

/// Validated configuration the shipper runs with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub region: String,
    pub auth: AuthParam,
    pub logset: String,
    pub topic: String,
    pub network: Network,
    pub endpoint_host: Option<String>,
    pub batch: BatchConfig,
    pub channel_capacity: usize,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub payload_format: PayloadFormat,
    pub source: Option<String>,
    pub filename: Option<String>,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Config::try_parse_from(args)?)
    }

    /// Command line first; a config file, when named, replaces it entirely.
    pub fn load<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Self::from_args(args)?;
        match &config.config_file {
            Some(path) => Self::from_file(path),
            None => Ok(config),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.config_file = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Checks every field and returns the typed settings, or all problems found.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let mut problems = Vec::new();

        let region = required(&mut problems, "region", &self.region);
        let secret_id = required(&mut problems, "secret_id", &self.secret_id);
        let secret_key = required(&mut problems, "secret_key", &self.secret_key);
        let logset = required(&mut problems, "logset", &self.logset);
        let topic = required(&mut problems, "topic", &self.topic);
        if self.token.is_none() {
            problems.push("token is unset".to_string());
        }

        if self.max_batch_count == 0 {
            problems.push("max_batch_count must be greater than 0".to_string());
        }
        if self.max_batch_bytes == 0 {
            problems.push("max_batch_bytes must be greater than 0".to_string());
        }
        if self.flush_interval_secs == 0 {
            problems.push("flush_interval_secs must be greater than 0".to_string());
        }
        if self.channel_capacity == 0 {
            problems.push("channel_capacity must be greater than 0".to_string());
        }
        if self.request_timeout_secs == 0 {
            problems.push("request_timeout_secs must be greater than 0".to_string());
        }
        if let Some(host) = &self.endpoint_host {
            if host.trim().is_empty() || host.contains('/') {
                problems.push(format!("endpoint_host '{host}' must be a bare host[:port]"));
            }
        }

        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }

        let source = self.source.clone().or_else(|| {
            hostname::get()
                .ok()
                .and_then(|name| name.into_string().ok())
        });

        Ok(Settings {
            region,
            auth: AuthParam::new(secret_id, secret_key, self.token.clone().unwrap_or_default()),
            logset,
            topic,
            network: Network::from_internal(self.use_internal_network),
            endpoint_host: self.endpoint_host.clone(),
            batch: BatchConfig {
                max_count: self.max_batch_count,
                max_bytes: self.max_batch_bytes,
                flush_interval: Duration::from_secs(self.flush_interval_secs),
            },
            channel_capacity: self.channel_capacity,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            payload_format: self.payload_format,
            source,
            filename: self.filename.clone(),
            log_level: self.log_level,
            log_format: self.log_format,
        })
    }
}

fn required(problems: &mut Vec<String>, name: &str, value: &Option<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        Some(_) => {
            problems.push(format!("{name} is empty"));
            String::new()
        }
        None => {
            problems.push(format!("{name} is unset"));
            String::new()
        }
    }
}
