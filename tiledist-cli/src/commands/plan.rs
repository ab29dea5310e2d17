//! Plan command - show tile placements without computing anything.

use std::path::{Path, PathBuf};

use clap::Args;
use tiledist::raster::{GeoTiffSource, RasterSource};
use tiledist::tiler::{plan_tiles, TilePlacement};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the plan command.
#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Input raster (single-band GeoTIFF)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Tiles along x
    #[arg(long)]
    pub nx: Option<u32>,

    /// Tiles along y
    #[arg(long)]
    pub ny: Option<u32>,

    /// Halo width in cells around each tile
    #[arg(long)]
    pub buffer: Option<u32>,
}

/// Run the plan command.
pub fn run(args: PlanArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let runner = CliRunner::new(config_path)?;
    runner.log_startup("plan");

    let mut tiling = runner.config().tiling;
    tiling.nx = args.nx.unwrap_or(tiling.nx);
    tiling.ny = args.ny.unwrap_or(tiling.ny);
    tiling.buffer = args.buffer.unwrap_or(tiling.buffer);

    let source = GeoTiffSource::open(&args.input)?;
    let meta = source.meta();
    let placements = plan_tiles(meta.width, meta.height, &tiling)
        .map_err(|e| CliError::Config(e.to_string()))?;

    println!("Tile Plan");
    println!("=========");
    println!();
    println!("Raster:  {} ({} × {} cells)", args.input.display(), meta.width, meta.height);
    println!(
        "Tiles:   {} × {} (buffer {} cells)",
        tiling.nx, tiling.ny, tiling.buffer
    );
    println!();
    println!("  {:<8} {:>8} {:>8} {:>8} {:>8}", "tile", "x_off", "y_off", "width", "height");
    for placement in &placements {
        let w = &placement.window;
        println!(
            "  {:<8} {:>8} {:>8} {:>8} {:>8}",
            placement.index.to_string(),
            w.x_off,
            w.y_off,
            w.width,
            w.height
        );
    }
    println!();
    println!(
        "Cells read: {:.2}× the raster",
        read_amplification(&placements, meta.width * meta.height)
    );

    Ok(())
}

/// Ratio of cells read across all tiles to cells in the raster.
fn read_amplification(placements: &[TilePlacement], cells: usize) -> f64 {
    if cells == 0 {
        return 0.0;
    }
    let read: usize = placements.iter().map(|p| p.window.area()).sum();
    read as f64 / cells as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiledist::tiler::TilingConfig;

    #[test]
    fn test_amplification_without_buffer_is_one() {
        let placements = plan_tiles(10, 6, &TilingConfig::new(2, 3, 0)).unwrap();
        assert_eq!(read_amplification(&placements, 60), 1.0);
    }

    #[test]
    fn test_amplification_grows_with_buffer() {
        let placements = plan_tiles(10, 6, &TilingConfig::new(2, 1, 2)).unwrap();
        assert!(read_amplification(&placements, 60) > 1.0);
    }
}
