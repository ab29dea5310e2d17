//! Per-tile distance computation.
//!
//! The engine owns the output contract of the proximity step: the distance
//! tile has the same placement and shape as its source tile, carries the
//! same geotransform and projection, is `Float32`, and marks unreachable
//! cells with the proximity no-data sentinel. The numeric work is delegated
//! to a [`ProximityKernel`].

use std::sync::Arc;

use tracing::trace;

use crate::grid::{CellType, Grid, Window};
use crate::proximity::{EuclideanKernel, ProximityError, ProximityKernel, ProximityOptions};
use crate::tiler::{Tile, TileIndex};

/// Distances for one tile, before restoration.
#[derive(Debug, Clone)]
pub struct DistanceTile {
    index: TileIndex,
    window: Window,
    grid: Grid,
}

impl DistanceTile {
    pub fn index(&self) -> TileIndex {
        self.index
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Number of cells for which no target was reachable.
    pub fn unresolved_count(&self) -> usize {
        let meta = self.grid.meta();
        self.grid.values().iter().filter(|&&v| meta.is_nodata(v)).count()
    }

    #[cfg(test)]
    pub(crate) fn from_parts(index: TileIndex, window: Window, grid: Grid) -> Self {
        Self {
            index,
            window,
            grid,
        }
    }
}

/// Runs a proximity kernel over tiles.
#[derive(Clone)]
pub struct DistanceEngine {
    kernel: Arc<dyn ProximityKernel>,
    options: ProximityOptions,
}

impl DistanceEngine {
    /// Creates an engine using the exact Euclidean kernel.
    pub fn new(options: ProximityOptions) -> Self {
        Self::with_kernel(Arc::new(EuclideanKernel::new()), options)
    }

    /// Creates an engine around a custom kernel.
    pub fn with_kernel(kernel: Arc<dyn ProximityKernel>, options: ProximityOptions) -> Self {
        Self { kernel, options }
    }

    pub fn options(&self) -> &ProximityOptions {
        &self.options
    }

    pub fn kernel_name(&self) -> &str {
        self.kernel.name()
    }

    /// Computes the distance tile for `tile`.
    ///
    /// Distances only consider targets inside the tile, halo included.
    pub fn compute(&self, tile: &Tile) -> Result<DistanceTile, ProximityError> {
        let input = tile.grid();
        let values = self.kernel.proximity(input, &self.options)?;
        let expected = input.meta().cell_count();
        if values.len() != expected {
            return Err(ProximityError::OutputSize {
                width: input.width(),
                height: input.height(),
                actual: values.len(),
            });
        }

        let meta = input
            .meta()
            .clone()
            .with_cell_type(CellType::F32)
            .with_nodata(Some(self.options.nodata));
        let grid = Grid::new(meta, values).map_err(|_| ProximityError::OutputSize {
            width: input.width(),
            height: input.height(),
            actual: expected,
        })?;

        let distance = DistanceTile {
            index: tile.index(),
            window: *tile.window(),
            grid,
        };
        trace!(
            tile = %distance.index,
            kernel = self.kernel.name(),
            unresolved = distance.unresolved_count(),
            "Distance tile computed"
        );
        Ok(distance)
    }
}

impl std::fmt::Debug for DistanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistanceEngine")
            .field("kernel", &self.kernel.name())
            .field("options", &self.options)
            .finish()
    }
}
