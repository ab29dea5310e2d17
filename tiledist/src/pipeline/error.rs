//! Pipeline error types.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::stage::TileStage;
use crate::merge::MergeError;
use crate::proximity::ProximityError;
use crate::raster::RasterError;
use crate::restore::RestoreError;
use crate::tiler::{TileIndex, TilingError};

/// Broad classes of pipeline failure.
///
/// Configuration and shape errors are caller or programming errors; I/O
/// errors are fatal to the run but isolated to the tile that raised them;
/// incomplete coverage means the merge could not see every cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Io,
    ShapeMismatch,
    IncompleteCoverage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Io => "I/O",
            ErrorKind::ShapeMismatch => "shape mismatch",
            ErrorKind::IncompleteCoverage => "incomplete coverage",
        };
        f.write_str(name)
    }
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid tiling: {0}")]
    Tiling(#[from] TilingError),

    #[error("Invalid proximity options: {0}")]
    Proximity(#[from] ProximityError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Raster I/O failed: {0}")]
    Raster(#[from] RasterError),

    #[error("Artifact {}: {source}", .path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize run manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error("Tile {index} cannot move from {from} to {to}")]
    StageOrder {
        index: TileIndex,
        from: TileStage,
        to: TileStage,
    },

    #[error("Merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("Run cancelled before tile {index} finished")]
    Cancelled { index: TileIndex },

    #[error("Tile {index} failed: {source}")]
    TileFailed {
        index: TileIndex,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Tiling(_) | PipelineError::Proximity(_) | PipelineError::ThreadPool(_) => {
                ErrorKind::Configuration
            }
            PipelineError::Raster(_)
            | PipelineError::Artifact { .. }
            | PipelineError::Manifest(_) => ErrorKind::Io,
            PipelineError::Restore(_) | PipelineError::StageOrder { .. } => {
                ErrorKind::ShapeMismatch
            }
            PipelineError::Merge(MergeError::OutOfBounds { .. })
            | PipelineError::Merge(MergeError::Misaligned { .. }) => ErrorKind::ShapeMismatch,
            PipelineError::Merge(_) | PipelineError::Cancelled { .. } => {
                ErrorKind::IncompleteCoverage
            }
            PipelineError::TileFailed { source, .. } => source.kind(),
        }
    }

    /// Returns true if this is a cancellation rather than a real failure.
    pub fn is_cancelled(&self) -> bool {
        match self {
            PipelineError::Cancelled { .. } => true,
            PipelineError::TileFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Wraps an error raised while processing `index`.
    pub(crate) fn in_tile(self, index: TileIndex) -> Self {
        match self {
            already @ PipelineError::TileFailed { .. } => already,
            cancelled @ PipelineError::Cancelled { .. } => cancelled,
            other => PipelineError::TileFailed {
                index,
                source: Box::new(other),
            },
        }
    }
}
