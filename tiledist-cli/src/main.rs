//! tiledist CLI - Command-line interface
//!
//! Computes distance-to-target rasters by tiling the input, running the
//! proximity transform per tile, and reconciling the tiles into one grid.

mod commands;
mod error;
mod progress;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;

use commands::config::ConfigCommands;
use commands::plan::PlanArgs;
use commands::run::RunArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "tiledist")]
#[command(version = tiledist::VERSION)]
#[command(about = "Tiled distance-to-target rasters without seams", long_about = None)]
struct Cli {
    /// Configuration file (defaults to tiledist/config.ini in the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a distance raster
    Run(RunArgs),

    /// Show how a raster would be tiled
    Plan(PlanArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => commands::run::run(args, config_path),
        Commands::Plan(args) => commands::plan::run(args, config_path),
        Commands::Config { command } => commands::config::run(command, config_path),
    }
}
