//! Tiled proximity pipeline.
//!
//! The driver plans the tiles and fans the per-tile work out over a rayon
//! pool. Each worker folds its repaired tile into the shared [`Reconciler`]
//! and drops it, so only the mosaic and the tiles in flight are resident.
//! The mosaic is finished once every tile has reported success:
//!
//! ```text
//!             ┌─ read ─ distance ─ repair ─ fold ─┐
//!   plan ─────┼─ read ─ distance ─ repair ─ fold ─┼── join ── finish ── write
//!             └─ read ─ distance ─ repair ─ fold ─┘
//! ```
//!
//! Tiles share nothing but the mosaic while in flight. The first tile to
//! fail cancels the run's [`CancellationToken`]; tiles that have not
//! finished stop at their next stage boundary, and the mosaic is discarded.
//! A grid with holes is never produced.
//!
//! # Example
//!
//! ```ignore
//! use tiledist::pipeline::{Pipeline, PipelineConfig};
//! use tiledist::tiler::TilingConfig;
//!
//! let config = PipelineConfig::new(TilingConfig::new(3, 2, 10));
//! let report = Pipeline::new(config).run_paths("in.tif".as_ref(), "out.tif".as_ref())?;
//! println!("{} tiles in {:?}", report.tiles, report.elapsed);
//! ```

mod artifacts;
mod config;
mod error;
mod observer;
mod stage;

pub use artifacts::{ArtifactStore, Manifest, MANIFEST_FILE};
pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError};
pub use observer::{NoopObserver, PipelineObserver};
pub use stage::{TileLedger, TileRecord, TileStage};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::DistanceEngine;
use crate::grid::{Grid, GridMeta};
use crate::merge::{MergedRaster, Reconciler};
use crate::raster::{write_geotiff_f32, GeoTiffSource, RasterError, RasterSource};
use crate::restore::{RepairedTile, ValueRestorer};
use crate::tiler::{plan_tiles, read_tile, TilePlacement, TilingConfig};

/// Summary of a completed file-to-file run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub width: usize,
    pub height: usize,
    pub tiles: usize,
    pub elapsed: Duration,
    /// Manifest path when an artifact directory was configured.
    pub manifest: Option<PathBuf>,
}

/// Result of running the pipeline over a source.
#[derive(Debug)]
pub struct PipelineOutput {
    pub grid: Grid,
    pub ledger: TileLedger,
}

/// Per-run state shared by the workers.
struct RunContext<'a> {
    source: &'a dyn RasterSource,
    ledger: &'a TileLedger,
    store: Option<&'a ArtifactStore>,
    token: &'a CancellationToken,
    mosaic: &'a Mutex<Reconciler>,
}

/// Tiled proximity driver.
pub struct Pipeline {
    config: PipelineConfig,
    engine: DistanceEngine,
    restorer: ValueRestorer,
    observer: Arc<dyn PipelineObserver>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Creates a pipeline using the exact Euclidean kernel.
    pub fn new(config: PipelineConfig) -> Self {
        let engine = DistanceEngine::new(config.proximity.clone());
        let restorer = ValueRestorer::new(config.restore.clone());
        Self {
            config,
            engine,
            restorer,
            observer: Arc::new(NoopObserver),
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the distance engine.
    pub fn with_engine(mut self, engine: DistanceEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Uses `token` to cancel runs from outside.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token that aborts every run of this pipeline when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Computes the tile plan for a grid described by `meta`.
    pub fn plan(&self, meta: &GridMeta) -> Result<Vec<TilePlacement>, PipelineError> {
        Ok(plan_tiles(meta.width, meta.height, &self.config.tiling)?)
    }

    /// Runs the pipeline from one GeoTIFF to another.
    ///
    /// The mosaic is written straight from its `Float32` form.
    pub fn run_paths(&self, input: &Path, output: &Path) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let source = GeoTiffSource::open(input)?;
        let store = self.artifact_store();
        let (merged, ledger) = self.execute(&source, store.as_ref())?;

        let written = write_geotiff_f32(output, merged.meta(), merged.values(), &self.config.write);
        if let Err(err) = written {
            warn!(output = %output.display(), error = %err, "Failed to write output");
            self.abandon(&source, &ledger, store.as_ref());
            return Err(err.into());
        }
        let manifest = match &store {
            Some(store) => {
                let manifest = self.manifest(&source, &ledger, Some(output), true);
                Some(store.write_manifest(&manifest)?)
            }
            None => None,
        };

        let report = RunReport {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            width: merged.width(),
            height: merged.height(),
            tiles: ledger.len(),
            elapsed: started.elapsed(),
            manifest,
        };
        info!(
            output = %output.display(),
            tiles = report.tiles,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Proximity run complete"
        );
        Ok(report)
    }

    /// Runs the pipeline over `source` and returns the merged grid.
    pub fn run_source(&self, source: &dyn RasterSource) -> Result<Grid, PipelineError> {
        let result = self.run(source)?;
        if let Some(store) = self.artifact_store() {
            let manifest = self.manifest(source, &result.ledger, None, true);
            store.write_manifest(&manifest)?;
        }
        Ok(result.grid)
    }

    /// Runs the pipeline over `source`, returning the grid and the ledger.
    ///
    /// Writes no manifest on success; on failure one is written if an
    /// artifact directory is configured.
    pub fn run(&self, source: &dyn RasterSource) -> Result<PipelineOutput, PipelineError> {
        let (merged, ledger) = self.execute(source, self.artifact_store().as_ref())?;
        let grid = merged.into_grid().map_err(RasterError::from)?;
        Ok(PipelineOutput { grid, ledger })
    }

    fn execute(
        &self,
        source: &dyn RasterSource,
        store: Option<&ArtifactStore>,
    ) -> Result<(MergedRaster, TileLedger), PipelineError> {
        let meta = source.meta().clone();
        self.config.proximity.validate()?;
        self.config.proximity.spacing(&meta)?;
        let placements = self.plan(&meta)?;

        let ledger = TileLedger::planned(&placements);
        let token = self.cancel.child_token();
        let mosaic = Mutex::new(Reconciler::new(&meta));
        self.observer.tiles_planned(placements.len());
        info!(
            source = %source.describe(),
            width = meta.width,
            height = meta.height,
            tiles = placements.len(),
            buffer = self.config.tiling.buffer,
            kernel = self.engine.kernel_name(),
            "Starting tiled proximity run"
        );

        let ctx = RunContext {
            source,
            ledger: &ledger,
            store,
            token: &token,
            mosaic: &mosaic,
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("tiledist-worker-{}", i))
            .build()?;
        let results: Vec<Result<(), PipelineError>> = pool.install(|| {
            placements
                .par_iter()
                .map(|placement| self.process_tile(&ctx, placement))
                .collect()
        });

        // Join barrier: the mosaic is only finished if every tile was merged.
        let mut failure: Option<PipelineError> = None;
        for err in results.into_iter().filter_map(Result::err) {
            let replace = failure
                .as_ref()
                .map_or(true, |current| current.is_cancelled() && !err.is_cancelled());
            if replace {
                failure = Some(err);
            }
        }
        if let Some(err) = failure {
            self.abandon(source, &ledger, store);
            return Err(err);
        }

        match mosaic.into_inner().finish_raster() {
            Ok(merged) => Ok((merged, ledger)),
            Err(err) => {
                self.abandon(source, &ledger, store);
                Err(err.into())
            }
        }
    }

    /// Runs every stage of one tile, recording the outcome in the ledger.
    fn process_tile(
        &self,
        ctx: &RunContext<'_>,
        placement: &TilePlacement,
    ) -> Result<(), PipelineError> {
        let index = placement.index;
        let result = self
            .tile_stages(ctx, placement)
            .and_then(|repaired| self.fold(ctx, placement, repaired))
            .map_err(|err| err.in_tile(index));
        if let Err(err) = &result {
            ctx.ledger.fail(index, err.to_string());
            if err.is_cancelled() {
                debug!(tile = %index, "Tile abandoned after cancellation");
            } else {
                warn!(tile = %index, error = %err, "Tile failed, cancelling run");
                ctx.token.cancel();
            }
            self.observer.tile_failed(index, err);
        }
        result
    }

    fn tile_stages(
        &self,
        ctx: &RunContext<'_>,
        placement: &TilePlacement,
    ) -> Result<RepairedTile, PipelineError> {
        let index = placement.index;

        checkpoint(ctx.token, placement)?;
        let tile = read_tile(ctx.source, placement)?;
        self.complete_stage(ctx, placement, TileStage::Split, tile.grid())?;

        checkpoint(ctx.token, placement)?;
        let distance = self.engine.compute(&tile)?;
        self.complete_stage(ctx, placement, TileStage::Distanced, distance.grid())?;

        checkpoint(ctx.token, placement)?;
        let repaired = self.restorer.repair(&tile, distance)?;
        if let Some(store) = ctx.store {
            if !self.config.keep_intermediates {
                if let Some(path) = ctx.ledger.release_artifact(index, TileStage::Distanced) {
                    store.remove(&path)?;
                }
            }
        }
        self.complete_stage(ctx, placement, TileStage::Repaired, repaired.grid())?;
        Ok(repaired)
    }

    /// Folds a repaired tile into the mosaic and releases it.
    fn fold(
        &self,
        ctx: &RunContext<'_>,
        placement: &TilePlacement,
        repaired: RepairedTile,
    ) -> Result<(), PipelineError> {
        checkpoint(ctx.token, placement)?;
        ctx.mosaic.lock().accept(&repaired)?;
        drop(repaired);

        let index = placement.index;
        ctx.ledger.advance(index, TileStage::Merged)?;
        debug!(tile = %index, stage = %TileStage::Merged, "Stage complete");
        self.observer.stage_completed(index, TileStage::Merged);
        Ok(())
    }

    fn complete_stage(
        &self,
        ctx: &RunContext<'_>,
        placement: &TilePlacement,
        stage: TileStage,
        grid: &Grid,
    ) -> Result<(), PipelineError> {
        let index = placement.index;
        if let Some(store) = ctx.store {
            let path = store.write(index, stage, grid)?;
            ctx.ledger.attach_artifact(index, stage, path);
        }
        ctx.ledger.advance(index, stage)?;
        debug!(tile = %index, window = %placement.window, stage = %stage, "Stage complete");
        self.observer.stage_completed(index, stage);
        Ok(())
    }

    fn artifact_store(&self) -> Option<ArtifactStore> {
        self.config
            .artifact_dir
            .as_ref()
            .map(|dir| ArtifactStore::new(dir, self.config.write))
    }

    fn manifest(
        &self,
        source: &dyn RasterSource,
        ledger: &TileLedger,
        output: Option<&Path>,
        complete: bool,
    ) -> Manifest {
        let meta = source.meta();
        Manifest {
            source: source.describe(),
            width: meta.width,
            height: meta.height,
            tiling: self.config.tiling,
            proximity: self.config.proximity.clone(),
            output: output.map(Path::to_path_buf),
            complete,
            tiles: ledger.records(),
        }
    }

    /// Records a failed run in the manifest, if artifacts are kept.
    fn abandon(&self, source: &dyn RasterSource, ledger: &TileLedger, store: Option<&ArtifactStore>) {
        let Some(store) = store else {
            return;
        };
        let manifest = self.manifest(source, ledger, None, false);
        if let Err(err) = store.write_manifest(&manifest) {
            warn!(error = %err, "Failed to write manifest for failed run");
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

fn checkpoint(token: &CancellationToken, placement: &TilePlacement) -> Result<(), PipelineError> {
    if token.is_cancelled() {
        return Err(PipelineError::Cancelled {
            index: placement.index,
        });
    }
    Ok(())
}

/// Runs the default pipeline from `input` to `output` with `nx × ny` tiles
/// and a `buffer`-cell halo.
pub fn run(
    input: impl AsRef<Path>,
    nx: u32,
    ny: u32,
    buffer: u32,
    output: impl AsRef<Path>,
) -> Result<RunReport, PipelineError> {
    let config = PipelineConfig::new(TilingConfig::new(nx, ny, buffer));
    Pipeline::new(config).run_paths(input.as_ref(), output.as_ref())
}
