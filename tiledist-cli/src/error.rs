//! CLI error type and exit codes.

use std::fmt;

use tiledist::config::ConfigError;
use tiledist::logging::LoggingError;
use tiledist::raster::RasterError;
use tiledist::{ErrorKind, PipelineError};

/// Errors surfaced to the user.
#[derive(Debug)]
pub enum CliError {
    /// Invalid settings or arguments.
    Config(String),
    /// The configuration file could not be read or written.
    ConfigFile(ConfigError),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// The input raster could not be opened.
    Raster(RasterError),
    /// The pipeline failed.
    Pipeline(PipelineError),
    /// The run was interrupted with Ctrl+C.
    Interrupted,
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) | CliError::ConfigFile(_) | CliError::Logging(_) => 2,
            CliError::Raster(_) => 3,
            CliError::Pipeline(err) => match err.kind() {
                ErrorKind::Configuration => 2,
                ErrorKind::Io => 3,
                ErrorKind::ShapeMismatch => 4,
                ErrorKind::IncompleteCoverage => 5,
            },
            CliError::Interrupted => 130,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Raster(e) => write!(f, "{}", e),
            CliError::Pipeline(e) => write!(f, "{} error: {}", e.kind(), e),
            CliError::Interrupted => write!(f, "Interrupted"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Raster(e) => Some(e),
            CliError::Pipeline(e) => Some(e),
            CliError::Config(_) | CliError::Interrupted => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<RasterError> for CliError {
    fn from(e: RasterError) -> Self {
        CliError::Raster(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        CliError::Pipeline(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiledist::merge::MergeError;

    #[test]
    fn test_exit_codes_follow_error_kind() {
        let coverage = CliError::from(PipelineError::from(MergeError::NoTiles));
        assert_eq!(coverage.exit_code(), 5);

        let raster = CliError::from(RasterError::Unsupported("3 bands".into()));
        assert_eq!(raster.exit_code(), 3);

        assert_eq!(CliError::Interrupted.exit_code(), 130);
        assert_eq!(CliError::Config("bad".into()).exit_code(), 2);
    }

    #[test]
    fn test_pipeline_message_includes_kind() {
        let err = CliError::from(PipelineError::from(MergeError::NoTiles));
        assert_eq!(
            err.to_string(),
            "incomplete coverage error: Merge failed: No tiles to merge"
        );
    }
}
