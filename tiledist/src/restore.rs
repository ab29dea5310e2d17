//! Restoration of original cell semantics after the distance transform.
//!
//! The proximity step does not reliably tell "no target reachable" apart
//! from "this cell was no-data in the source": depending on the encoding,
//! no-data cells can decode as stray values. Restoration therefore trusts
//! the computed distance only where the source cell held one of the
//! [`RestorePolicy::trusted_values`] (`0` and `1` by default, the background
//! and target indicators) and writes the source value back everywhere else.
//!
//! Changing the trusted set changes which cells carry distances.
//!
//! Trusted cells whose distance is the proximity sentinel (no target in the
//! tile) are written as the source's own no-data value, so the proximity
//! sentinel never leaves this stage.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::engine::DistanceTile;
use crate::grid::{CellType, Grid, Window};
use crate::tiler::{Tile, TileIndex};

/// Source values for which the computed distance is trusted by default.
pub const DEFAULT_TRUSTED_VALUES: [f64; 2] = [0.0, 1.0];

/// The source tile and its distance tile do not describe the same cells.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RestoreError {
    #[error(
        "Tile {index}: source is {source_width}×{source_height} \
         but distances are {distance_width}×{distance_height}"
    )]
    ShapeMismatch {
        index: TileIndex,
        source_width: usize,
        source_height: usize,
        distance_width: usize,
        distance_height: usize,
    },

    #[error("Source tile {source_index} at {source_window} paired with distance tile {distance_index} at {distance_window}")]
    PlacementMismatch {
        source_index: TileIndex,
        source_window: Window,
        distance_index: TileIndex,
        distance_window: Window,
    },
}

/// Which source values keep their computed distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorePolicy {
    pub trusted_values: Vec<f64>,
}

impl Default for RestorePolicy {
    fn default() -> Self {
        Self {
            trusted_values: DEFAULT_TRUSTED_VALUES.to_vec(),
        }
    }
}

impl RestorePolicy {
    /// Returns true if the distance computed for a cell holding `value`
    /// should be kept.
    #[inline]
    pub fn trusts(&self, value: f64) -> bool {
        self.trusted_values.iter().any(|&t| t == value)
    }
}

/// A tile whose cells are either valid distances or restored source values.
#[derive(Debug, Clone)]
pub struct RepairedTile {
    index: TileIndex,
    window: Window,
    grid: Grid,
    valid: Vec<bool>,
}

impl RepairedTile {
    /// Assembles a repaired tile from parts.
    ///
    /// `valid` must have one entry per grid cell; `true` marks a distance.
    pub fn from_parts(
        index: TileIndex,
        window: Window,
        grid: Grid,
        valid: Vec<bool>,
    ) -> Result<Self, RestoreError> {
        if grid.width() != window.width
            || grid.height() != window.height
            || valid.len() != grid.values().len()
        {
            return Err(RestoreError::ShapeMismatch {
                index,
                source_width: window.width,
                source_height: window.height,
                distance_width: grid.width(),
                distance_height: grid.height(),
            });
        }
        Ok(Self {
            index,
            window,
            grid,
            valid,
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

    /// Per-cell validity, row-major.
    pub fn valid_mask(&self) -> &[bool] {
        &self.valid
    }

    /// Returns true if tile cell `(x, y)` holds a distance.
    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        x < self.grid.width() && y < self.grid.height() && self.valid[self.grid.index(x, y)]
    }

    /// Number of cells holding a distance.
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }
}

/// Applies a [`RestorePolicy`] to distance tiles.
#[derive(Debug, Clone, Default)]
pub struct ValueRestorer {
    policy: RestorePolicy,
}

impl ValueRestorer {
    pub fn new(policy: RestorePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RestorePolicy {
        &self.policy
    }

    /// Combines a source tile with its distance tile.
    ///
    /// The distance tile is consumed; it has no use once repaired.
    ///
    /// # Errors
    ///
    /// Returns `RestoreError` if the two tiles do not share index, window
    /// and shape.
    pub fn repair(
        &self,
        source: &Tile,
        distance: DistanceTile,
    ) -> Result<RepairedTile, RestoreError> {
        if source.index() != distance.index() || source.window() != distance.window() {
            return Err(RestoreError::PlacementMismatch {
                source_index: source.index(),
                source_window: *source.window(),
                distance_index: distance.index(),
                distance_window: *distance.window(),
            });
        }
        let original = source.grid();
        let computed = distance.grid();
        if !original.same_shape(computed) {
            return Err(shape_mismatch(source.index(), original, computed));
        }

        let source_meta = original.meta();
        let distance_meta = computed.meta();
        let nodata = source_meta.nodata.unwrap_or(f64::NAN);

        let mut valid = Vec::with_capacity(original.values().len());
        let values: Vec<f64> = original
            .values()
            .iter()
            .zip(computed.values())
            .map(|(&before, &after)| {
                if !self.policy.trusts(before) {
                    valid.push(false);
                    before
                } else if !after.is_finite() || distance_meta.is_nodata(after) {
                    valid.push(false);
                    nodata
                } else {
                    valid.push(true);
                    after
                }
            })
            .collect();

        let meta = source_meta
            .clone()
            .with_cell_type(CellType::F32)
            .with_nodata(Some(nodata));
        let grid = Grid::new(meta, values)
            .map_err(|_| shape_mismatch(source.index(), original, computed))?;

        let repaired = RepairedTile {
            index: source.index(),
            window: *source.window(),
            grid,
            valid,
        };
        trace!(
            tile = %repaired.index,
            valid = repaired.valid_count(),
            cells = repaired.valid.len(),
            "Tile repaired"
        );
        Ok(repaired)
    }
}

fn shape_mismatch(index: TileIndex, source: &Grid, distance: &Grid) -> RestoreError {
    RestoreError::ShapeMismatch {
        index,
        source_width: source.width(),
        source_height: source.height(),
        distance_width: distance.width(),
        distance_height: distance.height(),
    }
}
