//! Run command - compute a distance raster.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, ValueEnum};
use console::style;
use tiledist::config::ConfigFile;
use tiledist::pipeline::{Pipeline, PipelineConfig};
use tiledist::proximity::DistanceUnits;
use tiledist::raster::{Compression, WriteOptions};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::CliError;
use crate::progress::ProgressObserver;
use crate::runner::CliRunner;

/// Output compression selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum CompressionArg {
    /// Uncompressed strips
    None,
    /// Deflate (zlib)
    Deflate,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => Compression::None,
            CompressionArg::Deflate => Compression::Deflate,
        }
    }
}

/// Arguments for the run command.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Input raster (single-band GeoTIFF)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output distance raster
    #[arg(short, long)]
    pub output: PathBuf,

    /// Tiles along x
    #[arg(long)]
    pub nx: Option<u32>,

    /// Tiles along y
    #[arg(long)]
    pub ny: Option<u32>,

    /// Halo width in cells around each tile
    #[arg(long)]
    pub buffer: Option<u32>,

    /// Worker threads (0 = all CPUs)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Directory for per-stage tile rasters and the run manifest
    #[arg(long)]
    pub artifacts: Option<PathBuf>,

    /// Keep distance tiles after repair (with --artifacts)
    #[arg(long)]
    pub keep_intermediates: bool,

    /// Report distances in pixels instead of georeferenced units
    #[arg(long)]
    pub pixel_units: bool,

    /// Cells farther than this from any target become no-data
    #[arg(long)]
    pub max_distance: Option<f64>,

    /// Comma-separated cell values treated as targets
    #[arg(long, value_delimiter = ',')]
    pub target_values: Option<Vec<f64>>,

    /// Output compression
    #[arg(long, value_enum)]
    pub compression: Option<CompressionArg>,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

/// Merge CLI arguments over the configuration file. CLI takes precedence.
pub fn resolve_config(args: &RunArgs, config: &ConfigFile) -> PipelineConfig {
    let mut pipeline = config.to_pipeline_config();

    let tiling = &mut pipeline.tiling;
    tiling.nx = args.nx.unwrap_or(tiling.nx);
    tiling.ny = args.ny.unwrap_or(tiling.ny);
    tiling.buffer = args.buffer.unwrap_or(tiling.buffer);

    if let Some(threads) = args.threads {
        pipeline.threads = threads;
    }
    if args.artifacts.is_some() {
        pipeline.artifact_dir = args.artifacts.clone();
    }
    pipeline.keep_intermediates |= args.keep_intermediates;

    let proximity = &mut pipeline.proximity;
    if args.pixel_units {
        proximity.units = DistanceUnits::Pixel;
    }
    if args.max_distance.is_some() {
        proximity.max_distance = args.max_distance;
    }
    if let Some(values) = &args.target_values {
        proximity.target_values = values.clone();
    }

    if let Some(compression) = args.compression {
        pipeline.write = WriteOptions::default().with_compression(compression.into());
    }
    pipeline
}

/// Run the run command.
pub fn run(args: RunArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let runner = CliRunner::new(config_path)?;
    runner.log_startup("run");
    let config = resolve_config(&args, runner.config());

    println!("{}", style(format!("tiledist v{}", tiledist::VERSION)).bold());
    println!();
    println!("Input:   {}", args.input.display());
    println!("Output:  {}", args.output.display());
    println!(
        "Tiles:   {} × {} (buffer {} cells)",
        config.tiling.nx, config.tiling.ny, config.tiling.buffer
    );
    println!("Units:   {}", config.proximity.units.as_str());
    if let Some(dir) = &config.artifact_dir {
        println!("Artifacts: {}", dir.display());
    }
    println!();

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, stopping after current stages...");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let observer = Arc::new(if args.quiet {
        ProgressObserver::hidden()
    } else {
        ProgressObserver::new()
    });
    let pipeline = Pipeline::new(config)
        .with_observer(observer.clone())
        .with_cancellation_token(token.clone());

    match pipeline.run_paths(&args.input, &args.output) {
        Ok(report) => {
            observer.finish("done");
            println!();
            println!(
                "{} {}×{} cells, {} tiles in {:.1}s",
                style("Wrote").green().bold(),
                report.width,
                report.height,
                report.tiles,
                report.elapsed.as_secs_f64()
            );
            println!("  {}", report.output.display());
            if let Some(manifest) = report.manifest {
                println!("  manifest: {}", manifest.display());
            }
            Ok(())
        }
        Err(err) => {
            observer.abandon();
            if token.is_cancelled() && err.is_cancelled() {
                warn!("Run interrupted");
                return Err(CliError::Interrupted);
            }
            Err(err.into())
        }
    }
}
