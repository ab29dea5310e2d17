//! In-memory raster grids.
//!
//! A [`Grid`] is one band of cell values plus the metadata needed to write it
//! back out: dimensions, georeferencing, projection, cell type and no-data
//! sentinel. Cell values are held as `f64` regardless of the on-disk type so
//! every stage of the pipeline works on one representation.

mod geo;
mod window;

pub use geo::{GeoTransform, Projection};
pub use window::Window;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when grid invariants are violated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    /// Cell buffer length does not match the declared dimensions.
    #[error("Grid of {width}×{height} needs {} cells, got {len}", .width * .height)]
    DimensionMismatch {
        width: usize,
        height: usize,
        len: usize,
    },

    /// Requested window extends past the grid.
    #[error("Window {window} exceeds grid bounds {width}×{height}")]
    WindowOutOfBounds {
        window: Window,
        width: usize,
        height: usize,
    },
}

/// Storage type of the cells in the source raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl CellType {
    /// Bits per sample for this type.
    pub fn bits(&self) -> u16 {
        match self {
            CellType::U8 | CellType::I8 => 8,
            CellType::U16 | CellType::I16 => 16,
            CellType::U32 | CellType::I32 | CellType::F32 => 32,
            CellType::U64 | CellType::I64 | CellType::F64 => 64,
        }
    }

    /// Returns true for floating point types.
    pub fn is_float(&self) -> bool {
        matches!(self, CellType::F32 | CellType::F64)
    }
}

/// Everything about a grid except its cell values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMeta {
    pub width: usize,
    pub height: usize,
    pub geo_transform: GeoTransform,
    pub projection: Projection,
    pub cell_type: CellType,
    pub nodata: Option<f64>,
}

impl GridMeta {
    /// Metadata for an un-georeferenced grid in pixel space.
    pub fn new(width: usize, height: usize, cell_type: CellType) -> Self {
        Self {
            width,
            height,
            geo_transform: GeoTransform::default(),
            projection: Projection::default(),
            cell_type,
            nodata: None,
        }
    }

    /// Set the georeferencing transform.
    pub fn with_geo_transform(mut self, geo_transform: GeoTransform) -> Self {
        self.geo_transform = geo_transform;
        self
    }

    /// Set the projection metadata.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Set the cell type.
    pub fn with_cell_type(mut self, cell_type: CellType) -> Self {
        self.cell_type = cell_type;
        self
    }

    /// Set (or clear) the no-data sentinel.
    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    /// Metadata of a sub-window: same projection and type, shifted transform.
    pub fn for_window(&self, window: &Window) -> GridMeta {
        GridMeta {
            width: window.width,
            height: window.height,
            geo_transform: self.geo_transform.window_transform(window),
            ..self.clone()
        }
    }

    /// Returns true if `value` equals the no-data sentinel.
    ///
    /// A NaN sentinel matches NaN values.
    pub fn is_nodata(&self, value: f64) -> bool {
        match self.nodata {
            Some(nodata) if nodata.is_nan() => value.is_nan(),
            Some(nodata) => value == nodata,
            None => false,
        }
    }

    /// Number of cells described by this metadata.
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }
}

/// A single-band raster held in memory, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    meta: GridMeta,
    values: Vec<f64>,
}

impl Grid {
    /// Creates a grid, checking that `values` matches the dimensions.
    pub fn new(meta: GridMeta, values: Vec<f64>) -> Result<Self, GridError> {
        if values.len() != meta.cell_count() {
            return Err(GridError::DimensionMismatch {
                width: meta.width,
                height: meta.height,
                len: values.len(),
            });
        }
        Ok(Self { meta, values })
    }

    /// Creates a grid with every cell set to `value`.
    pub fn filled(meta: GridMeta, value: f64) -> Self {
        let values = vec![value; meta.cell_count()];
        Self { meta, values }
    }

    pub fn meta(&self) -> &GridMeta {
        &self.meta
    }

    pub fn width(&self) -> usize {
        self.meta.width
    }

    pub fn height(&self) -> usize {
        self.meta.height
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Consumes the grid, returning its metadata and cell values.
    pub fn into_parts(self) -> (GridMeta, Vec<f64>) {
        (self.meta, self.values)
    }

    /// Flat index of cell `(x, y)`.
    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.meta.width + x
    }

    /// Value at `(x, y)`, or `None` outside the grid.
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        (x < self.meta.width && y < self.meta.height).then(|| self.values[self.index(x, y)])
    }

    /// Sets the value at `(x, y)`. Out-of-range coordinates are ignored.
    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        if x < self.meta.width && y < self.meta.height {
            let idx = self.index(x, y);
            self.values[idx] = value;
        }
    }

    /// Returns true if both grids have the same width and height.
    pub fn same_shape(&self, other: &Grid) -> bool {
        self.meta.width == other.meta.width && self.meta.height == other.meta.height
    }

    /// Copies a window of this grid into a new grid with adjusted metadata.
    pub fn subgrid(&self, window: &Window) -> Result<Grid, GridError> {
        if !window.fits_within(self.meta.width, self.meta.height) {
            return Err(GridError::WindowOutOfBounds {
                window: *window,
                width: self.meta.width,
                height: self.meta.height,
            });
        }

        let mut values = Vec::with_capacity(window.area());
        for y in window.y_off..window.bottom() {
            let start = self.index(window.x_off, y);
            values.extend_from_slice(&self.values[start..start + window.width]);
        }

        Ok(Grid {
            meta: self.meta.for_window(window),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_grid() -> Grid {
        let meta = GridMeta::new(4, 3, CellType::U8)
            .with_geo_transform(GeoTransform::north_up(10.0, 20.0, 2.0, 2.0));
        Grid::new(meta, (0..12).map(f64::from).collect()).unwrap()
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let meta = GridMeta::new(4, 3, CellType::U8);
        let err = Grid::new(meta, vec![0.0; 11]).unwrap_err();
        assert_eq!(
            err,
            GridError::DimensionMismatch {
                width: 4,
                height: 3,
                len: 11
            }
        );
        assert_eq!(err.to_string(), "Grid of 4×3 needs 12 cells, got 11");
    }

    #[test]
    fn test_get_and_set() {
        let mut grid = sample_grid();
        assert_eq!(grid.get(1, 2), Some(9.0));
        assert_eq!(grid.get(4, 0), None);
        grid.set(1, 2, -1.0);
        assert_eq!(grid.get(1, 2), Some(-1.0));
    }

    #[test]
    fn test_subgrid_copies_values_and_shifts_transform() {
        let grid = sample_grid();
        let sub = grid.subgrid(&Window::new(1, 1, 2, 2)).unwrap();
        assert_eq!(sub.values(), &[5.0, 6.0, 9.0, 10.0]);
        assert_eq!(sub.meta().geo_transform.origin_x, 12.0);
        assert_eq!(sub.meta().geo_transform.origin_y, 18.0);
        assert_eq!(sub.meta().cell_type, CellType::U8);
    }

    #[test]
    fn test_subgrid_out_of_bounds() {
        let grid = sample_grid();
        let err = grid.subgrid(&Window::new(3, 0, 2, 1)).unwrap_err();
        assert!(matches!(err, GridError::WindowOutOfBounds { .. }));
    }

    #[test]
    fn test_is_nodata() {
        let meta = GridMeta::new(1, 1, CellType::F32);
        assert!(!meta.is_nodata(0.0));
        assert!(meta.clone().with_nodata(Some(255.0)).is_nodata(255.0));
        let nan_meta = meta.with_nodata(Some(f64::NAN));
        assert!(nan_meta.is_nodata(f64::NAN));
        assert!(!nan_meta.is_nodata(1.0));
    }

    #[test]
    fn test_cell_type_bits() {
        assert_eq!(CellType::U8.bits(), 8);
        assert_eq!(CellType::F32.bits(), 32);
        assert!(CellType::F64.is_float());
        assert!(!CellType::I16.is_float());
    }
}
