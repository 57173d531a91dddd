#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

//! Logging setup for the bridge and its tools.

use std::fs::OpenOptions;
use std::sync::Mutex;

use nodebridge_config::LoggingConfig;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The configured level is not a valid filter directive.
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    /// The log file could not be opened.
    #[error("failed to open log file: {0}")]
    File(#[from] std::io::Error),
}

/// Emits a trace event tagged with `module`.
pub fn trace(module: &str, msg: &str) {
    tracing::trace!(module, "{}", msg);
}

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Output goes to the
/// configured file (appended, no colours) or to stderr. Returns `Ok(false)`
/// if a global subscriber was already installed.
pub fn init(config: &LoggingConfig) -> Result<bool, LoggingError> {
    let filter = filter_for(config)?;
    let installed = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .is_ok()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok(),
    };
    Ok(installed)
}

fn filter_for(config: &LoggingConfig) -> Result<EnvFilter, ParseError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(&config.level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return;
        }
        let config = LoggingConfig { level: "bridge=notalevel".to_string(), file: None };
        assert!(matches!(init(&config), Err(LoggingError::Filter(_))));
    }

    #[test]
    fn test_init_twice_reports_false() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LoggingConfig {
            level: "debug".to_string(),
            file: Some(dir.path().join("bridge.log")),
        };
        // Another test may have installed the subscriber first.
        let _ = init(&config).expect("first init");
        assert!(!init(&config).expect("second init"));
        assert!(dir.path().join("bridge.log").exists());
        trace("logging", "subscriber installed");
    }
}
