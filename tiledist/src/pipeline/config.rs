//! Pipeline configuration.

use std::path::PathBuf;

use crate::proximity::ProximityOptions;
use crate::raster::WriteOptions;
use crate::restore::RestorePolicy;
use crate::tiler::TilingConfig;

/// Everything a [`Pipeline`](super::Pipeline) run needs besides its input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub tiling: TilingConfig,
    pub proximity: ProximityOptions,
    pub restore: RestorePolicy,
    /// Worker threads for per-tile work; `0` uses every CPU.
    pub threads: usize,
    /// Directory for per-stage tile artifacts and the run manifest.
    pub artifact_dir: Option<PathBuf>,
    /// Keep distance artifacts after their tile is repaired.
    pub keep_intermediates: bool,
    /// Options for the merged output and any artifacts.
    pub write: WriteOptions,
}

impl PipelineConfig {
    pub fn new(tiling: TilingConfig) -> Self {
        Self {
            tiling,
            ..Self::default()
        }
    }

    pub fn with_tiling(mut self, tiling: TilingConfig) -> Self {
        self.tiling = tiling;
        self
    }

    pub fn with_proximity(mut self, proximity: ProximityOptions) -> Self {
        self.proximity = proximity;
        self
    }

    pub fn with_restore_policy(mut self, restore: RestorePolicy) -> Self {
        self.restore = restore;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_artifact_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.artifact_dir = dir;
        self
    }

    pub fn with_keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    pub fn with_write_options(mut self, write: WriteOptions) -> Self {
        self.write = write;
        self
    }
}
