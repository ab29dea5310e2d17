//! On-disk tile artifacts and the run manifest.
//!
//! Artifacts are optional debugging output. Their names are derived from
//! tile index and stage when written and recorded in the ledger; nothing
//! parses them back.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::PipelineError;
use super::stage::{TileRecord, TileStage};
use crate::grid::Grid;
use crate::proximity::ProximityOptions;
use crate::raster::{write_geotiff, WriteOptions};
use crate::tiler::{TileIndex, TilingConfig};

/// File name of the run manifest inside the artifact directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Writes stage grids into an artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    write_options: WriteOptions,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, write_options: WriteOptions) -> Self {
        Self {
            dir: dir.into(),
            write_options,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path used for the artifact of `index` at `stage`.
    pub fn path_for(&self, index: TileIndex, stage: TileStage) -> PathBuf {
        self.dir
            .join(format!("tile_{}_{}_{}.tif", index.i, index.j, stage.as_str()))
    }

    /// Writes `grid` as the artifact for `(index, stage)` and returns its path.
    pub fn write(
        &self,
        index: TileIndex,
        stage: TileStage,
        grid: &Grid,
    ) -> Result<PathBuf, PipelineError> {
        let path = self.path_for(index, stage);
        write_geotiff(&path, grid, &self.write_options)?;
        debug!(tile = %index, stage = %stage, path = %path.display(), "Artifact written");
        Ok(path)
    }

    /// Deletes an artifact that is no longer needed.
    pub fn remove(&self, path: &Path) -> Result<(), PipelineError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Artifact already gone");
                Ok(())
            }
            Err(source) => Err(PipelineError::Artifact {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes `manifest` as `manifest.json` in the artifact directory.
    pub fn write_manifest(&self, manifest: &Manifest) -> Result<PathBuf, PipelineError> {
        let path = self.dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(manifest)?;
        fs::create_dir_all(&self.dir)
            .and_then(|()| fs::write(&path, json))
            .map_err(|source| PipelineError::Artifact {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

/// Outcome of a run as recorded in `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Description of the input raster.
    pub source: String,
    pub width: usize,
    pub height: usize,
    pub tiling: TilingConfig,
    pub proximity: ProximityOptions,
    /// Output path, absent when the run failed or produced no file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Whether every tile reached the merged output.
    pub complete: bool,
    pub tiles: Vec<TileRecord>,
}

impl Manifest {
    /// Reads a manifest back from disk.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(|source| PipelineError::Artifact {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}
