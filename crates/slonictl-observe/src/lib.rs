//! # Slonictl Observe - Structured Logging
//!
//! Centralized logging initialization with contextual fields and
//! formatting options.

use std::str::FromStr;

use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors (for interactive use)
    Pretty,
    /// Compact format without colors
    Compact,
    /// JSON format (for automation capturing the output)
    Json,
}

#[allow(clippy::derivable_impls)]
impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Pretty
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Configuration for logging behavior
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format
    pub format: LogFormat,
    /// Whether to include target module
    pub include_target: bool,
    /// Environment filter (e.g., "info,slonictl=debug")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            include_target: true,
            filter: None,
        }
    }
}

/// Initialize structured logging with configuration.
///
/// Safe to call more than once; later calls are no-ops once a subscriber
/// is installed.
pub fn init_logging(config: LogConfig) -> anyhow::Result<()> {
    let env_filter = if let Some(filter) = config.filter {
        EnvFilter::try_new(filter)?
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,slonictl=debug"))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target);

    let result = match config.format {
        LogFormat::Pretty => subscriber.pretty().try_init(),
        LogFormat::Compact => subscriber.compact().try_init(),
        LogFormat::Json => subscriber.json().try_init(),
    };
    if result.is_err() {
        tracing::debug!("logging already initialized, skipping");
        return Ok(());
    }

    tracing::debug!(format = ?config.format, "logging initialized");
    Ok(())
}

/// Initialize logging with defaults.
pub fn init() -> anyhow::Result<()> {
    init_logging(LogConfig::default())
}

/// Helper to create a span for one reconciliation entry point.
pub fn reconcile_span(entity: &str, cluster: &str) -> Span {
    tracing::info_span!(
        "reconcile",
        entity = entity,
        cluster = cluster,
        changed = tracing::field::Empty,
    )
}

/// Record the outcome in a reconcile span.
pub fn record_outcome(span: &Span, changed: bool) {
    span.record("changed", changed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_test_logging() {
        INIT.call_once(|| {
            let _ = init_logging(LogConfig {
                format: LogFormat::Compact,
                include_target: false,
                filter: Some("debug".to_string()),
            });
        });
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("loud").is_err());
    }

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.include_target);
    }

    #[test]
    fn test_init_is_idempotent() {
        init_test_logging();
        assert!(init().is_ok());
    }

    #[test]
    fn test_reconcile_span() {
        init_test_logging();
        let span = reconcile_span("set", "replication");
        let _entered = span.enter();
        record_outcome(&span, true);
    }
}
