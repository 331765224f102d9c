//! Tracing subscriber setup for the binary.
//!
//! Human-readable events go to stderr. When requested, a JSON copy of every
//! event is also written to a daily rolling file under the logs directory.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Used when neither `RUST_LOG` nor a valid configured level is available
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// File name prefix of the rolling JSON log
pub const LOG_FILE_PREFIX: &str = "wipe-ledger.log";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the program. It is `None` when no file layer was installed.
pub fn init_logging(level: &str, logs_dir: &Path, json_file: bool) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = if json_file {
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create logs directory {}", logs_dir.display()))?;

        let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(build_env_filter(level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

    Ok(guard)
}

/// `RUST_LOG` wins over the configured level; an unparseable level falls
/// back to [`DEFAULT_LOG_LEVEL`].
pub fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

/// Whether `level` is accepted as a filter directive
pub fn is_valid_level(level: &str) -> bool {
    !level.trim().is_empty() && EnvFilter::try_new(level).is_ok()
}
