//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reingestor_core::config::LoggingConfig;

/// File name prefix of the daily log files.
const LOG_FILE_PREFIX: &str = "reingest.log";

/// Install the global subscriber.
///
/// Level precedence: `RUST_LOG`, then `--log-level`, then `logging.level`.
/// Console output goes to stderr so command output on stdout stays clean.
/// The returned guard flushes the log file when dropped.
pub fn init(config: &LoggingConfig, level_override: Option<&str>) -> Result<Option<WorkerGuard>> {
    let level = level_override.unwrap_or(config.level.as_str());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {}", level))?;

    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match &config.path {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {:?}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let stack = tracing_subscriber::registry().with(filter).with(console);
            let installed = if config.json {
                stack
                    .with(fmt::layer().json().with_writer(writer).with_ansi(false))
                    .try_init()
            } else {
                stack
                    .with(fmt::layer().with_writer(writer).with_ansi(false))
                    .try_init()
            };
            installed.context("Failed to initialize logging")?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()
                .context("Failed to initialize logging")?;
            Ok(None)
        }
    }
}
