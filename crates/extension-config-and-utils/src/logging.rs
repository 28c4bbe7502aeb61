//! Logging initialization.
//!
//! Structured JSONL goes to `~/.vault-extension/logs/background.jsonl`;
//! a compact copy can go to stderr for foreground runs. `RUST_LOG`
//! overrides the configured level.

use crate::{CoreError, CoreResult, Paths};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(level: &str, paths: &Paths, also_stderr: bool) -> CoreResult<()> {
    paths.ensure_dirs()?;
    let log_path = paths.log_file();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let default_level = parse_level(level).to_string().to_lowercase();
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_level));

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(false)
        .with_writer(Mutex::new(file))
        .with_filter(filter());

    let stderr_layer = also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter())
    });

    tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| CoreError::LoggingInitialized(e.to_string()))?;

    tracing::info!(log_path = %log_path.display(), level = %default_level, "Logging initialized");
    Ok(())
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
