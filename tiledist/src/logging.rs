//! Tracing subscriber setup.
//!
//! Logs go to stderr and, when a log directory is configured, to
//! `tiledist.log` in that directory through a non-blocking writer. `RUST_LOG`
//! overrides the configured level.

use std::path::PathBuf;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

pub use tracing_appender::non_blocking::WorkerGuard;

/// File name used inside the log directory.
pub const LOG_FILE_NAME: &str = "tiledist.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Cannot create log directory {}: {source}", .path.display())]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Builds a filter from a level or directive string such as `info` or
/// `tiledist=debug,warn`.
pub fn directive_filter(directives: &str) -> Result<EnvFilter, LoggingError> {
    Ok(EnvFilter::try_new(directives)?)
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer when dropped and must be held
/// for the life of the program. It is `None` when no log directory is set.
pub fn init_logging(settings: &LoggingSettings) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => directive_filter(&settings.level)?,
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::new(Rfc3339))
        .with_target(false);

    let (file_layer, guard) = match &settings.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LoggingError::LogDir {
                path: dir.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(LocalTime::new(Rfc3339))
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_filter() {
        assert!(directive_filter("info").is_ok());
        assert!(directive_filter("tiledist=debug,warn").is_ok());
        assert!(matches!(
            directive_filter("tiledist=loud"),
            Err(LoggingError::Filter(_))
        ));
    }
}
