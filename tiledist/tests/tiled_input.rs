//! Reading tiled GeoTIFF input.
//!
//! `fixtures/tiled_20x18.tif` is a 20×18 `uint8` raster stored as 16×16
//! tiles, so the right and bottom tiles carry padding. Padding bytes are
//! `238`, a value that never occurs in the raster itself. Cell `(x, y)` is
//! `1` where `(x + 2y) % 11 == 0`, `255` (no-data) at `(3, 9)` and
//! `(19, 17)`, and `0` elsewhere.
//!
//! Run with: `cargo test --test tiled_input`

use std::path::PathBuf;

use tempfile::TempDir;

use tiledist::grid::{CellType, Window};
use tiledist::pipeline::{Pipeline, PipelineConfig};
use tiledist::raster::{GeoTiffSource, MemorySource, RasterSource};
use tiledist::tiler::TilingConfig;

const WIDTH: usize = 20;
const HEIGHT: usize = 18;
const PADDING: f64 = 238.0;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/tiled_20x18.tif")
}

fn expected(x: usize, y: usize) -> f64 {
    if (x, y) == (3, 9) || (x, y) == (19, 17) {
        255.0
    } else if (x + 2 * y) % 11 == 0 {
        1.0
    } else {
        0.0
    }
}

#[test]
fn test_tiled_metadata() {
    let source = GeoTiffSource::open(fixture()).unwrap();
    let meta = source.meta();
    assert_eq!((meta.width, meta.height), (WIDTH, HEIGHT));
    assert_eq!(meta.cell_type, CellType::U8);
    assert_eq!(meta.nodata, Some(255.0));
    assert_eq!(
        meta.geo_transform.to_gdal(),
        [440_000.0, 30.0, 0.0, 5_300_000.0, 0.0, -30.0]
    );
}

#[test]
fn test_full_read_skips_tile_padding() {
    let source = GeoTiffSource::open(fixture()).unwrap();
    let grid = source.read_window(&Window::full(WIDTH, HEIGHT)).unwrap();
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            assert_eq!(grid.get(x, y).unwrap(), expected(x, y), "cell ({x}, {y})");
        }
    }
    assert!(grid.values().iter().all(|&v| v != PADDING));
}

#[test]
fn test_windows_across_tile_seams() {
    let source = GeoTiffSource::open(fixture()).unwrap();
    let windows = [
        // All four tiles, reaching the padded corner.
        Window::new(10, 10, 10, 8),
        // Only the padded right-hand column of tiles.
        Window::new(16, 0, 4, 18),
        // One row straddling the vertical seam.
        Window::new(14, 15, 4, 1),
    ];
    for window in windows {
        let grid = source.read_window(&window).unwrap();
        for y in 0..window.height {
            for x in 0..window.width {
                assert_eq!(
                    grid.get(x, y).unwrap(),
                    expected(window.x_off + x, window.y_off + y),
                    "window {window}, cell ({x}, {y})"
                );
            }
        }
    }
}

#[test]
fn test_tiled_input_matches_in_memory_run() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("distances.tif");
    let config = PipelineConfig::new(TilingConfig::new(2, 2, 3)).with_threads(2);

    let source = GeoTiffSource::open(fixture()).unwrap();
    let in_memory = MemorySource::new(source.read_window(&Window::full(WIDTH, HEIGHT)).unwrap());
    let expected = Pipeline::new(config.clone())
        .run_source(&in_memory)
        .unwrap();

    Pipeline::new(config).run_paths(&fixture(), &output).unwrap();
    let written = GeoTiffSource::open(&output)
        .unwrap()
        .read_window(&Window::full(WIDTH, HEIGHT))
        .unwrap();
    assert_eq!(written.values(), expected.values());
    assert_eq!(written.get(19, 17), Some(255.0));
}
