//! Raster I/O.
//!
//! The pipeline only ever needs three things from a raster store: the grid
//! metadata, windowed reads of the source band, and whole-grid writes. Those
//! are captured by [`RasterSource`] and [`write_geotiff`].
//!
//! # Implementors
//!
//! - [`GeoTiffSource`] - single-band GeoTIFF on disk, read chunk by chunk
//! - [`MemorySource`] - a grid already in memory (tests, small inputs)

mod geotiff;

pub use geotiff::{write_geotiff, write_geotiff_f32, Compression, GeoTiffSource, WriteOptions};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::grid::{Grid, GridError, GridMeta, Window};

/// Errors from reading or writing rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    /// The raster file could not be opened.
    #[error("Failed to open raster {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The raster file could not be created.
    #[error("Failed to create raster {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TIFF decoding or encoding failure.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// The raster uses a layout or sample type this reader does not handle.
    #[error("Unsupported raster: {0}")]
    Unsupported(String),

    /// Decoded data does not match the raster's declared layout.
    #[error("Corrupt raster data: {0}")]
    Corrupt(String),

    /// A grid invariant was violated while assembling data.
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Read access to a single-band raster.
///
/// Implementations must be thread-safe: tile workers read their windows
/// concurrently.
pub trait RasterSource: Send + Sync {
    /// Metadata of the full raster.
    fn meta(&self) -> &GridMeta;

    /// Reads a window of the band into a grid whose metadata is
    /// `self.meta().for_window(window)`.
    fn read_window(&self, window: &Window) -> Result<Grid, RasterError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// A raster source backed by a grid in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    grid: Grid,
}

impl MemorySource {
    pub fn new(grid: Grid) -> Self {
        Self { grid }
    }

    /// Returns the wrapped grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }
}

impl RasterSource for MemorySource {
    fn meta(&self) -> &GridMeta {
        self.grid.meta()
    }

    fn read_window(&self, window: &Window) -> Result<Grid, RasterError> {
        Ok(self.grid.subgrid(window)?)
    }

    fn describe(&self) -> String {
        format!("memory {}×{}", self.grid.width(), self.grid.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellType;

    #[test]
    fn test_memory_source_reads_window() {
        let meta = GridMeta::new(3, 2, CellType::U8);
        let grid = Grid::new(meta, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let source = MemorySource::new(grid);

        let window = source.read_window(&Window::new(1, 0, 2, 2)).unwrap();
        assert_eq!(window.values(), &[2.0, 3.0, 5.0, 6.0]);
        assert_eq!(source.meta().width, 3);
        assert_eq!(source.describe(), "memory 3×2");
    }

    #[test]
    fn test_memory_source_rejects_out_of_bounds() {
        let meta = GridMeta::new(3, 2, CellType::U8);
        let source = MemorySource::new(Grid::filled(meta, 0.0));
        let err = source.read_window(&Window::new(0, 1, 3, 2)).unwrap_err();
        assert!(matches!(
            err,
            RasterError::Grid(GridError::WindowOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_raster_source_is_object_safe() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn RasterSource>();
    }
}
