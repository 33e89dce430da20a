//! Logging setup (tracing + tracing-subscriber)

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Build the filter: `RUST_LOG` if set, else the configured level
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let env_directive = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    filter_from(env_directive.as_deref(), &config.level)
}

/// Pick the first directive that parses, falling back to `info`
fn filter_from(env_directive: Option<&str>, level: &str) -> EnvFilter {
    env_directive
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config);

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    result.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_level_falls_back_to_info() {
        assert_eq!(filter_from(None, "loyalty_ledger=loud").to_string(), "info");
    }

    #[test]
    fn test_configured_level_is_used() {
        assert_eq!(filter_from(None, "warn").to_string(), "warn");
    }

    #[test]
    fn test_env_directive_wins() {
        assert_eq!(filter_from(Some("debug"), "warn").to_string(), "debug");
        // Unparseable env value: configured level still applies
        assert_eq!(filter_from(Some("loyalty_ledger=loud"), "warn").to_string(), "warn");
    }
}
