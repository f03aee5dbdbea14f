//! Logging setup for hosts.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Human,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// The filter this config yields, ignoring the environment.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber, writing to stderr.
///
/// # Errors
/// Fails when a global subscriber is already installed.
pub fn init_logging(cfg: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| cfg.env_filter());
    let registry = tracing_subscriber::registry().with(filter);
    match cfg.format {
        LogFormat::Human => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(cfg.with_target),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(cfg.with_target),
            )
            .try_init(),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn bad_directive_falls_back_to_info() {
        let cfg = LoggingConfig {
            level: "odata=[".to_owned(),
            ..LoggingConfig::default()
        };
        assert_eq!(cfg.env_filter().to_string(), "info");
    }

    #[test]
    fn format_deserializes_snake_case() {
        let cfg: LoggingConfig = serde_json::from_str(r#"{"level":"debug","format":"json"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(cfg.with_target);
    }
}
