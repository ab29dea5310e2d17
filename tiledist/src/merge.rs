//! Reconciliation of overlapping repaired tiles into one grid.
//!
//! Tiles overlap in their halos. Every output cell takes the minimum over
//! the valid distances offered for it; restored cells (source no-data and
//! untrusted values) never compete in that minimum. A cell that only ever
//! receives restored values keeps the first one offered, which is the same
//! source value in every tile covering it.
//!
//! The [`Reconciler`] is fed one tile at a time so callers can release each
//! repaired tile as soon as it has been folded in. The mosaic is held as
//! `f32`, the output sample type, plus one state byte per cell.

use thiserror::Error;
use tracing::debug;

use crate::grid::{CellType, Grid, GridError, GridMeta, Window};
use crate::restore::RepairedTile;
use crate::tiler::TileIndex;

/// Errors raised while reconciling tiles.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MergeError {
    /// Some cells of the output were never covered by a tile.
    #[error("Merged grid has {missing} uncovered cells, first at ({first_x}, {first_y})")]
    IncompleteCoverage {
        missing: usize,
        first_x: usize,
        first_y: usize,
    },

    /// A tile's window reaches past the output extent.
    #[error("Tile {index} window {window} exceeds the {width}×{height} output")]
    OutOfBounds {
        index: TileIndex,
        window: Window,
        width: usize,
        height: usize,
    },

    /// A tile's georeferencing disagrees with its window placement.
    #[error("Tile {index} geotransform does not match its placement at {window}")]
    Misaligned { index: TileIndex, window: Window },

    /// Nothing was merged.
    #[error("No tiles to merge")]
    NoTiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellState {
    Uncovered,
    Restored,
    Distance,
}

/// A completed mosaic in its `Float32` output form.
#[derive(Debug, Clone)]
pub struct MergedRaster {
    meta: GridMeta,
    values: Vec<f32>,
}

impl MergedRaster {
    pub fn meta(&self) -> &GridMeta {
        &self.meta
    }

    /// Cell values, row-major.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn width(&self) -> usize {
        self.meta.width
    }

    pub fn height(&self) -> usize {
        self.meta.height
    }

    /// Widens the mosaic into a [`Grid`].
    pub fn into_grid(self) -> Result<Grid, GridError> {
        let values = self.values.into_iter().map(f64::from).collect();
        Grid::new(self.meta, values)
    }
}

/// Pointwise-minimum mosaic over the full output extent.
#[derive(Debug)]
pub struct Reconciler {
    meta: GridMeta,
    parent: GridMeta,
    values: Vec<f32>,
    state: Vec<CellState>,
    tiles: usize,
}

impl Reconciler {
    /// Starts an empty mosaic for a grid described by `parent`.
    ///
    /// The output keeps the parent's extent, georeferencing and no-data
    /// sentinel (NaN when the parent has none) and is `Float32`.
    pub fn new(parent: &GridMeta) -> Self {
        let nodata = parent.nodata.unwrap_or(f64::NAN);
        let meta = parent
            .clone()
            .with_cell_type(CellType::F32)
            .with_nodata(Some(nodata));
        let cells = meta.cell_count();
        Self {
            meta,
            parent: parent.clone(),
            values: vec![nodata as f32; cells],
            state: vec![CellState::Uncovered; cells],
            tiles: 0,
        }
    }

    /// Number of tiles accepted so far.
    pub fn tiles_accepted(&self) -> usize {
        self.tiles
    }

    /// Folds one repaired tile into the mosaic.
    pub fn accept(&mut self, tile: &RepairedTile) -> Result<(), MergeError> {
        let window = *tile.window();
        let (width, height) = (self.meta.width, self.meta.height);
        if !window.fits_within(width, height) {
            return Err(MergeError::OutOfBounds {
                index: tile.index(),
                window,
                width,
                height,
            });
        }

        let expected = self.parent.geo_transform.window_transform(&window);
        if !expected.approx_eq(&tile.grid().meta().geo_transform) {
            return Err(MergeError::Misaligned {
                index: tile.index(),
                window,
            });
        }

        let tile_values = tile.grid().values();
        let valid = tile.valid_mask();
        for row in 0..window.height {
            let src = row * window.width;
            let dst = (window.y_off + row) * width + window.x_off;
            let candidates = &tile_values[src..src + window.width];
            let flags = &valid[src..src + window.width];
            let out = &mut self.values[dst..dst + window.width];
            let state = &mut self.state[dst..dst + window.width];

            for (((slot, cell), &value), &is_valid) in out
                .iter_mut()
                .zip(state.iter_mut())
                .zip(candidates)
                .zip(flags)
            {
                let value = value as f32;
                match (*cell, is_valid) {
                    (CellState::Distance, true) => *slot = slot.min(value),
                    (_, true) => {
                        *slot = value;
                        *cell = CellState::Distance;
                    }
                    (CellState::Uncovered, false) => {
                        *slot = value;
                        *cell = CellState::Restored;
                    }
                    (_, false) => {}
                }
            }
        }

        self.tiles += 1;
        debug!(tile = %tile.index(), window = %window, "Tile merged");
        Ok(())
    }

    /// Completes the mosaic as a [`Grid`].
    ///
    /// # Errors
    ///
    /// Fails if no tile was accepted or any cell was left uncovered; a
    /// partial grid is never returned.
    pub fn finish(self) -> Result<Grid, MergeError> {
        self.finish_raster()?
            .into_grid()
            .map_err(|_| MergeError::NoTiles)
    }

    /// Completes the mosaic without widening it.
    pub fn finish_raster(self) -> Result<MergedRaster, MergeError> {
        if self.tiles == 0 && self.meta.cell_count() > 0 {
            return Err(MergeError::NoTiles);
        }

        let width = self.meta.width.max(1);
        let mut gaps = self
            .state
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == CellState::Uncovered)
            .map(|(idx, _)| idx);
        if let Some(first) = gaps.next() {
            return Err(MergeError::IncompleteCoverage {
                missing: 1 + gaps.count(),
                first_x: first % width,
                first_y: first / width,
            });
        }

        Ok(MergedRaster {
            meta: self.meta,
            values: self.values,
        })
    }
}

/// Merges `tiles` over the extent described by `parent`.
pub fn merge<'a>(
    tiles: impl IntoIterator<Item = &'a RepairedTile>,
    parent: &GridMeta,
) -> Result<Grid, MergeError> {
    let mut reconciler = Reconciler::new(parent);
    for tile in tiles {
        reconciler.accept(tile)?;
    }
    reconciler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GeoTransform;

    fn parent(width: usize, height: usize) -> GridMeta {
        GridMeta::new(width, height, CellType::U8)
            .with_geo_transform(GeoTransform::north_up(500.0, 900.0, 10.0, 10.0))
            .with_nodata(Some(255.0))
    }

    fn repaired(
        parent: &GridMeta,
        index: TileIndex,
        window: Window,
        values: Vec<f64>,
        valid: Vec<bool>,
    ) -> RepairedTile {
        let meta = parent.for_window(&window).with_cell_type(CellType::F32);
        let grid = Grid::new(meta, values).unwrap();
        RepairedTile::from_parts(index, window, grid, valid).unwrap()
    }

    #[test]
    fn test_overlap_takes_minimum() {
        let meta = parent(4, 1);
        let left = repaired(
            &meta,
            TileIndex::new(0, 0),
            Window::new(0, 0, 3, 1),
            vec![0.0, 10.0, 50.0],
            vec![true; 3],
        );
        let right = repaired(
            &meta,
            TileIndex::new(1, 0),
            Window::new(1, 0, 3, 1),
            vec![20.0, 10.0, 0.0],
            vec![true; 3],
        );

        let merged = merge([&left, &right], &meta).unwrap();
        assert_eq!(merged.values(), &[0.0, 10.0, 10.0, 0.0]);
        assert_eq!(merged.meta().cell_type, CellType::F32);
        assert_eq!(merged.meta().nodata, Some(255.0));
        assert_eq!(merged.meta().geo_transform, meta.geo_transform);
    }

    #[test]
    fn test_restored_cells_do_not_compete() {
        let meta = parent(3, 1);
        // Cell 1 has no target within the first tile; the second tile
        // supplies a real distance there.
        let first = repaired(
            &meta,
            TileIndex::new(0, 0),
            Window::new(0, 0, 2, 1),
            vec![255.0, 255.0],
            vec![false, false],
        );
        let second = repaired(
            &meta,
            TileIndex::new(1, 0),
            Window::new(1, 0, 2, 1),
            vec![10.0, 0.0],
            vec![true, true],
        );

        let merged = merge([&first, &second], &meta).unwrap();
        assert_eq!(merged.values(), &[255.0, 10.0, 0.0]);

        // Order must not matter.
        let merged = merge([&second, &first], &meta).unwrap();
        assert_eq!(merged.values(), &[255.0, 10.0, 0.0]);
    }

    #[test]
    fn test_all_restored_keeps_source_value() {
        let meta = parent(2, 1);
        let a = repaired(
            &meta,
            TileIndex::new(0, 0),
            Window::new(0, 0, 2, 1),
            vec![7.0, 255.0],
            vec![false, false],
        );
        let b = repaired(
            &meta,
            TileIndex::new(1, 0),
            Window::new(1, 0, 1, 1),
            vec![255.0],
            vec![false],
        );
        let merged = merge([&a, &b], &meta).unwrap();
        assert_eq!(merged.values(), &[7.0, 255.0]);
    }

    #[test]
    fn test_incomplete_coverage_fails() {
        let meta = parent(3, 2);
        let tile = repaired(
            &meta,
            TileIndex::new(0, 0),
            Window::new(0, 0, 2, 2),
            vec![0.0; 4],
            vec![true; 4],
        );
        let err = merge([&tile], &meta).unwrap_err();
        assert_eq!(
            err,
            MergeError::IncompleteCoverage {
                missing: 2,
                first_x: 2,
                first_y: 0,
            }
        );
    }

    #[test]
    fn test_no_tiles() {
        let meta = parent(2, 2);
        assert_eq!(merge(std::iter::empty::<&RepairedTile>(), &meta).unwrap_err(), MergeError::NoTiles);
    }

    #[test]
    fn test_out_of_bounds_window() {
        let meta = parent(2, 2);
        let wide = parent(3, 2);
        let tile = repaired(
            &wide,
            TileIndex::new(0, 0),
            Window::new(0, 0, 3, 2),
            vec![0.0; 6],
            vec![true; 6],
        );
        let mut reconciler = Reconciler::new(&meta);
        assert!(matches!(
            reconciler.accept(&tile),
            Err(MergeError::OutOfBounds { .. })
        ));
        assert_eq!(reconciler.tiles_accepted(), 0);
    }

    #[test]
    fn test_misaligned_tile_rejected() {
        let meta = parent(4, 1);
        let window = Window::new(1, 0, 2, 1);
        // Georeferenced as if it started at column 0.
        let grid = Grid::new(
            meta.for_window(&Window::new(0, 0, 2, 1)),
            vec![0.0, 1.0],
        )
        .unwrap();
        let tile =
            RepairedTile::from_parts(TileIndex::new(0, 0), window, grid, vec![true, true]).unwrap();
        let err = Reconciler::new(&meta).accept(&tile).unwrap_err();
        assert_eq!(
            err,
            MergeError::Misaligned {
                index: TileIndex::new(0, 0),
                window
            }
        );
    }

    #[test]
    fn test_mosaic_is_held_as_float32() {
        let meta = parent(2, 1);
        let tile = repaired(
            &meta,
            TileIndex::new(0, 0),
            Window::new(0, 0, 2, 1),
            vec![0.1, 255.0],
            vec![true, false],
        );
        let mut reconciler = Reconciler::new(&meta);
        reconciler.accept(&tile).unwrap();
        let merged = reconciler.finish_raster().unwrap();
        assert_eq!(merged.values(), &[0.1f32, 255.0]);
        assert_eq!((merged.width(), merged.height()), (2, 1));
        assert_eq!(merged.into_grid().unwrap().values(), &[f64::from(0.1f32), 255.0]);
    }

    #[test]
    fn test_missing_nodata_becomes_nan() {
        let meta = GridMeta::new(1, 1, CellType::U8);
        let tile = repaired(
            &meta,
            TileIndex::new(0, 0),
            Window::new(0, 0, 1, 1),
            vec![3.0],
            vec![true],
        );
        let merged = merge([&tile], &meta).unwrap();
        assert!(merged.meta().nodata.unwrap().is_nan());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn windows_in(width: usize, height: usize) -> impl Strategy<Value = Window> {
            (0..width, 0..height).prop_flat_map(move |(x, y)| {
                (1..=width - x, 1..=height - y).prop_map(move |(w, h)| Window::new(x, y, w, h))
            })
        }

        proptest! {
            /// Each cell is the minimum of its valid candidates; cells with
            /// only restored candidates keep the source value.
            #[test]
            fn test_merge_is_pointwise_minimum(
                (width, height, windows) in (1usize..8, 1usize..8).prop_flat_map(|(w, h)| {
                    (Just(w), Just(h), proptest::collection::vec(windows_in(w, h), 0..5))
                }),
                seed in any::<u64>()
            ) {
                use rand::{Rng, SeedableRng};
                let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
                let meta = parent(width, height);
                let source: Vec<f64> = (0..width * height).map(|i| 100.0 + i as f64).collect();

                let mut all = vec![Window::full(width, height)];
                all.extend(windows);
                let tiles: Vec<RepairedTile> = all
                    .iter()
                    .enumerate()
                    .map(|(n, window)| {
                        let mut values = Vec::new();
                        let mut valid = Vec::new();
                        for y in window.y_off..window.bottom() {
                            for x in window.x_off..window.right() {
                                if rng.random_bool(0.7) {
                                    values.push(rng.random_range(0.0..50.0));
                                    valid.push(true);
                                } else {
                                    values.push(source[y * width + x]);
                                    valid.push(false);
                                }
                            }
                        }
                        repaired(&meta, TileIndex::new(n as u32, 0), *window, values, valid)
                    })
                    .collect();

                let merged = merge(&tiles, &meta).unwrap();
                for y in 0..height {
                    for x in 0..width {
                        let expected = tiles
                            .iter()
                            .filter(|t| t.window().contains(x, y))
                            .filter_map(|t| {
                                let (tx, ty) = (x - t.window().x_off, y - t.window().y_off);
                                t.is_valid(tx, ty)
                                    .then(|| f64::from(t.grid().get(tx, ty).unwrap() as f32))
                            })
                            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
                            .unwrap_or(source[y * width + x]);
                        prop_assert_eq!(merged.get(x, y).unwrap(), expected);
                    }
                }
            }
        }
    }
}
