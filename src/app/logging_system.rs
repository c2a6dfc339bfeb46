use super::config::{LogFormat, LogLevel};
use std::sync::OnceLock;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum InitializationError {
    #[error("Invalid log directive '{input}'")]
    InvalidDirective {
        input: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("Logging system initialization failed: {details}")]
    LoggingInitFailed { details: String },

    #[error("Signal handler installation failed: {0}")]
    SignalHandler(#[source] std::io::Error),
}

/// Noisy HTTP stack targets capped at `warn` unless overridden.
const DEFAULT_DIRECTIVES: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn", "h2=warn"];

pub struct LoggingSystem {
    level: LogLevel,
    format: LogFormat,
    directives: Vec<String>,
}

impl LoggingSystem {
    pub fn new(level: LogLevel, format: LogFormat) -> Self {
        Self {
            level,
            format,
            directives: DEFAULT_DIRECTIVES.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Appends a `target=level` directive after the defaults.
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn build_filter_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.directives.len() + 1);
        parts.push(self.level.as_str().to_string());
        parts.extend(self.directives.iter().cloned());
        parts.join(",")
    }

    /// `RUST_LOG` wins over the configured level when it is set and parses.
    pub fn env_filter(&self) -> Result<EnvFilter, InitializationError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }

        let filter_string = self.build_filter_string();
        EnvFilter::try_new(&filter_string).map_err(|source| InitializationError::InvalidDirective {
            input: filter_string,
            source,
        })
    }

    pub fn initialize_tracing(&self) -> Result<(), InitializationError> {
        let filter = self.env_filter()?;
        let registry = tracing_subscriber::registry().with(filter);

        let result = match self.format {
            LogFormat::Compact => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .try_init(),
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };

        result.map_err(|e| InitializationError::LoggingInitFailed {
            details: e.to_string(),
        })
    }
}

/// Installs the global subscriber once; later calls return the first outcome.
pub fn setup_logging(level: LogLevel, format: LogFormat) -> Result<(), InitializationError> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();

    INIT.get_or_init(|| {
        LoggingSystem::new(level, format)
            .initialize_tracing()
            .map_err(|e| e.to_string())
    })
    .clone()
    .map_err(|details| InitializationError::LoggingInitFailed { details })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_string_starts_with_level() {
        let system = LoggingSystem::new(LogLevel::Debug, LogFormat::Compact);
        let filter = system.build_filter_string();

        assert!(filter.starts_with("debug,"));
        assert!(filter.contains("reqwest=warn"));
        assert!(filter.contains("hyper=warn"));
    }

    #[test]
    fn test_extra_directive_is_appended() {
        let filter = LoggingSystem::new(LogLevel::Info, LogFormat::Json)
            .with_directive("cls_log_shipper::sender=trace")
            .build_filter_string();

        assert!(filter.ends_with("cls_log_shipper::sender=trace"));
    }

    #[test]
    fn test_bad_directive_is_reported() {
        let system = LoggingSystem::new(LogLevel::Info, LogFormat::Compact)
            .with_directive("target=not_a_level");

        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(
                system.env_filter(),
                Err(InitializationError::InvalidDirective { .. })
            ));
        }
    }

    #[test]
    fn test_setup_logging_is_idempotent() {
        let first = setup_logging(LogLevel::Info, LogFormat::Compact);
        let second = setup_logging(LogLevel::Trace, LogFormat::Json);

        assert_eq!(first.is_ok(), second.is_ok());
    }
}
