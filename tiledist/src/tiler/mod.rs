//! Partitioning of a grid into overlapping, halo-buffered tiles.
//!
//! A grid of `width × height` cells is cut into `nx × ny` logical tiles of
//! `floor(width / nx) × floor(height / ny)` cells. Each tile is then grown by
//! `buffer` cells on every side (clamped at the grid edge) so the distance
//! transform of a tile can see targets lying just across its seams.
//!
//! ```text
//!   x_off  = max(i * tile_width  - buffer, 0)
//!   y_off  = max(j * tile_height - buffer, 0)
//!   width  = min(tile_width  + 2 * buffer, grid_width  - x_off)
//!   height = min(tile_height + 2 * buffer, grid_height - y_off)
//! ```
//!
//! Tiles in the last column (`i = nx - 1`) and last row (`j = ny - 1`)
//! always run to the grid edge, absorbing the `width mod nx` and
//! `height mod ny` remainder, so the placements cover every cell for any
//! tile count and buffer.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::{Grid, GridError, Window};
use crate::raster::{RasterError, RasterSource};

/// Default number of tile columns.
pub const DEFAULT_TILES_X: u32 = 3;

/// Default number of tile rows.
pub const DEFAULT_TILES_Y: u32 = 2;

/// Default halo width in cells.
pub const DEFAULT_BUFFER: u32 = 10;

/// Grid axis, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
        }
    }
}

/// Invalid tiling parameters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TilingError {
    /// A tile count of zero was requested.
    #[error("Tile count along {axis} must be at least 1")]
    ZeroTileCount { axis: Axis },

    /// More tiles than cells along an axis; base tiles would be empty.
    #[error("{count} tiles along {axis} exceed the grid extent of {extent} cells")]
    TooManyTiles { axis: Axis, count: u32, extent: usize },
}

/// Failure while splitting a source into tiles.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error(transparent)]
    Tiling(#[from] TilingError),

    #[error("Failed to read tile {index}: {source}")]
    Read {
        index: TileIndex,
        #[source]
        source: RasterError,
    },
}

/// Logical position of a tile before buffering, `i` along x and `j` along y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileIndex {
    pub i: u32,
    pub j: u32,
}

impl TileIndex {
    pub fn new(i: u32, j: u32) -> Self {
        Self { i, j }
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.i, self.j)
    }
}

/// Tile counts and halo width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilingConfig {
    /// Tiles along x.
    pub nx: u32,
    /// Tiles along y.
    pub ny: u32,
    /// Halo width in cells added on each side of a tile.
    pub buffer: u32,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            nx: DEFAULT_TILES_X,
            ny: DEFAULT_TILES_Y,
            buffer: DEFAULT_BUFFER,
        }
    }
}

impl TilingConfig {
    pub fn new(nx: u32, ny: u32, buffer: u32) -> Self {
        Self { nx, ny, buffer }
    }

    /// Set the tile counts.
    pub fn with_tiles(mut self, nx: u32, ny: u32) -> Self {
        self.nx = nx;
        self.ny = ny;
        self
    }

    /// Set the halo width.
    pub fn with_buffer(mut self, buffer: u32) -> Self {
        self.buffer = buffer;
        self
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> usize {
        self.nx as usize * self.ny as usize
    }

    /// Checks the tile counts against a grid of `width × height` cells.
    pub fn validate(&self, width: usize, height: usize) -> Result<(), TilingError> {
        for (axis, count, extent) in [(Axis::X, self.nx, width), (Axis::Y, self.ny, height)] {
            if count == 0 {
                return Err(TilingError::ZeroTileCount { axis });
            }
            if count as usize > extent {
                return Err(TilingError::TooManyTiles {
                    axis,
                    count,
                    extent,
                });
            }
        }
        Ok(())
    }
}

/// Where a tile sits in its parent grid, halo included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePlacement {
    pub index: TileIndex,
    pub window: Window,
}

/// A tile's cells, read from the parent grid.
#[derive(Debug, Clone)]
pub struct Tile {
    index: TileIndex,
    window: Window,
    grid: Grid,
}

impl Tile {
    /// Creates a tile, checking that the grid matches the window's extent.
    pub fn new(index: TileIndex, window: Window, grid: Grid) -> Result<Self, GridError> {
        if grid.width() != window.width || grid.height() != window.height {
            return Err(GridError::DimensionMismatch {
                width: window.width,
                height: window.height,
                len: grid.values().len(),
            });
        }
        Ok(Self {
            index,
            window,
            grid,
        })
    }

    pub fn index(&self) -> TileIndex {
        self.index
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn placement(&self) -> TilePlacement {
        TilePlacement {
            index: self.index,
            window: self.window,
        }
    }
}

/// Computes the buffered placement of every tile, ordered by `(i, j)`.
///
/// # Errors
///
/// Returns `TilingError` if a tile count is zero or exceeds the grid extent
/// along its axis.
pub fn plan_tiles(
    width: usize,
    height: usize,
    config: &TilingConfig,
) -> Result<Vec<TilePlacement>, TilingError> {
    config.validate(width, height)?;

    let nx = config.nx as usize;
    let ny = config.ny as usize;
    let buffer = config.buffer as usize;
    let tile_width = width / nx;
    let tile_height = height / ny;

    let mut placements = Vec::with_capacity(nx * ny);
    for i in 0..nx {
        let (x_off, span_x) = buffered_span(i, nx, tile_width, buffer, width);
        for j in 0..ny {
            let (y_off, span_y) = buffered_span(j, ny, tile_height, buffer, height);
            placements.push(TilePlacement {
                index: TileIndex::new(i as u32, j as u32),
                window: Window::new(x_off, y_off, span_x, span_y),
            });
        }
    }
    Ok(placements)
}

/// Offset and length of tile `position` along one axis.
fn buffered_span(
    position: usize,
    count: usize,
    tile_extent: usize,
    buffer: usize,
    extent: usize,
) -> (usize, usize) {
    let offset = (position * tile_extent).saturating_sub(buffer);
    let remaining = extent - offset;
    let span = if position + 1 == count {
        remaining
    } else {
        (tile_extent + 2 * buffer).min(remaining)
    };
    (offset, span)
}

/// Reads one placement from a source.
pub fn read_tile(source: &dyn RasterSource, placement: &TilePlacement) -> Result<Tile, RasterError> {
    let grid = source.read_window(&placement.window)?;
    Ok(Tile::new(placement.index, placement.window, grid)?)
}

/// Splits a source into all of its tiles.
///
/// Every tile is read eagerly; prefer [`plan_tiles`] plus [`read_tile`] when
/// only the tiles in flight should be resident.
pub fn split(source: &dyn RasterSource, config: &TilingConfig) -> Result<Vec<Tile>, SplitError> {
    let meta = source.meta();
    plan_tiles(meta.width, meta.height, config)?
        .iter()
        .map(|placement| {
            read_tile(source, placement).map_err(|source| SplitError::Read {
                index: placement.index,
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{CellType, GridMeta};
    use crate::raster::MemorySource;

    fn windows(width: usize, height: usize, nx: u32, ny: u32, buffer: u32) -> Vec<Window> {
        plan_tiles(width, height, &TilingConfig::new(nx, ny, buffer))
            .unwrap()
            .into_iter()
            .map(|p| p.window)
            .collect()
    }

    fn coverage_counts(width: usize, height: usize, placements: &[TilePlacement]) -> Vec<usize> {
        let mut counts = vec![0usize; width * height];
        for placement in placements {
            let w = placement.window;
            for y in w.y_off..w.bottom() {
                for x in w.x_off..w.right() {
                    counts[y * width + x] += 1;
                }
            }
        }
        counts
    }

    #[test]
    fn test_single_tile_covers_grid() {
        assert_eq!(windows(7, 5, 1, 1, 0), vec![Window::new(0, 0, 7, 5)]);
        assert_eq!(windows(7, 5, 1, 1, 3), vec![Window::new(0, 0, 7, 5)]);
    }

    #[test]
    fn test_even_split_without_buffer() {
        assert_eq!(
            windows(6, 4, 2, 2, 0),
            vec![
                Window::new(0, 0, 3, 2),
                Window::new(0, 2, 3, 2),
                Window::new(3, 0, 3, 2),
                Window::new(3, 2, 3, 2),
            ]
        );
    }

    #[test]
    fn test_buffer_is_clamped_at_edges() {
        // 6×4, two columns, buffer 1: left tile grows right only,
        // right tile grows left and is clamped at the right edge.
        assert_eq!(
            windows(6, 4, 2, 1, 1),
            vec![Window::new(0, 0, 5, 4), Window::new(2, 0, 4, 4)]
        );
    }

    #[test]
    fn test_interior_tile_gets_halo_on_both_sides() {
        let w = windows(30, 10, 3, 1, 2);
        assert_eq!(w[1], Window::new(8, 0, 14, 10));
    }

    #[test]
    fn test_remainder_absorbed_by_last_tiles() {
        // 7 % 2 == 1 > buffer 0: the last column must still reach x = 7.
        let w = windows(7, 5, 2, 2, 0);
        assert_eq!(w[0], Window::new(0, 0, 3, 2));
        assert_eq!(w[3], Window::new(3, 2, 4, 3));
    }

    #[test]
    fn test_ordering_is_i_major() {
        let placements = plan_tiles(10, 10, &TilingConfig::new(2, 3, 0)).unwrap();
        let order: Vec<(u32, u32)> = placements.iter().map(|p| (p.index.i, p.index.j)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
    }

    #[test]
    fn test_zero_tile_count_rejected() {
        let err = plan_tiles(10, 10, &TilingConfig::new(0, 1, 0)).unwrap_err();
        assert_eq!(err, TilingError::ZeroTileCount { axis: Axis::X });
        assert_eq!(err.to_string(), "Tile count along x must be at least 1");
    }

    #[test]
    fn test_too_many_tiles_rejected() {
        let err = plan_tiles(10, 3, &TilingConfig::new(2, 4, 0)).unwrap_err();
        assert_eq!(
            err,
            TilingError::TooManyTiles {
                axis: Axis::Y,
                count: 4,
                extent: 3
            }
        );
    }

    #[test]
    fn test_split_reads_tile_contents() {
        let meta = GridMeta::new(4, 2, CellType::U8);
        let grid = Grid::new(meta, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).unwrap();
        let source = MemorySource::new(grid);

        let tiles = split(&source, &TilingConfig::new(2, 1, 0)).unwrap();
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].grid().values(), &[0.0, 1.0, 4.0, 5.0]);
        assert_eq!(tiles[1].grid().values(), &[2.0, 3.0, 6.0, 7.0]);
        assert_eq!(tiles[1].index(), TileIndex::new(1, 0));
    }

    #[test]
    fn test_tile_new_rejects_mismatched_grid() {
        let grid = Grid::filled(GridMeta::new(2, 2, CellType::U8), 0.0);
        let result = Tile::new(TileIndex::new(0, 0), Window::new(0, 0, 3, 2), grid);
        assert!(result.is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_placements_cover_every_cell(
                width in 1usize..60,
                height in 1usize..60,
                nx in 1u32..8,
                ny in 1u32..8,
                buffer in 0u32..6
            ) {
                prop_assume!(nx as usize <= width && ny as usize <= height);
                let config = TilingConfig::new(nx, ny, buffer);
                let placements = plan_tiles(width, height, &config)?;

                prop_assert_eq!(placements.len(), config.tile_count());
                for placement in &placements {
                    prop_assert!(placement.window.fits_within(width, height));
                    prop_assert!(!placement.window.is_empty());
                }
                let counts = coverage_counts(width, height, &placements);
                prop_assert!(counts.iter().all(|&c| c >= 1), "uncovered cell");
            }

            #[test]
            fn test_larger_buffer_only_grows_windows(
                width in 1usize..60,
                height in 1usize..60,
                nx in 1u32..6,
                ny in 1u32..6,
                buffer in 0u32..5
            ) {
                prop_assume!(nx as usize <= width && ny as usize <= height);
                let small = plan_tiles(width, height, &TilingConfig::new(nx, ny, buffer))?;
                let large = plan_tiles(width, height, &TilingConfig::new(nx, ny, buffer + 1))?;
                for (a, b) in small.iter().zip(large.iter()) {
                    prop_assert_eq!(a.index, b.index);
                    prop_assert!(b.window.x_off <= a.window.x_off);
                    prop_assert!(b.window.y_off <= a.window.y_off);
                    prop_assert!(b.window.right() >= a.window.right());
                    prop_assert!(b.window.bottom() >= a.window.bottom());
                }
            }
        }
    }
}
