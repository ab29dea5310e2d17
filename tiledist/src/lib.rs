//! tiledist - Tiled proximity transforms for large rasters
//!
//! Computes, for every cell of a raster, the distance to the nearest target
//! cell when the raster is too large to transform in one pass. The grid is
//! cut into overlapping tiles, each tile is transformed with its halo, the
//! original no-data cells are restored, and the tiles are merged by taking
//! the pointwise minimum over their overlaps.
//!
//! ```ignore
//! let report = tiledist::run("settlements.tif", 3, 2, 10, "distances.tif")?;
//! ```

pub mod config;
pub mod engine;
pub mod grid;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod proximity;
pub mod raster;
pub mod restore;
pub mod tiler;

pub use pipeline::{run, ErrorKind, Pipeline, PipelineConfig, PipelineError, RunReport};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
