//! Tracing subscriber setup for the `hub-test` binary.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Pick the filter: `RUST_LOG` first, then the command-line level, then the
/// configured level.
pub fn env_filter(config: &LoggingConfig, level_override: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level_override.unwrap_or(&config.level);
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Install the global subscriber. Logs go to stderr so `--json` output on
/// stdout stays parseable. A second call is a no-op.
pub fn init(config: &LoggingConfig, level_override: Option<&str>) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config, level_override))
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    if let Err(e) = result {
        tracing::debug!("Tracing subscriber already installed: {}", e);
    }
}
