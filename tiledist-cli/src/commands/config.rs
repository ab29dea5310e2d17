//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show`, and `config init`.

use std::io;
use std::path::Path;

use clap::Subcommand;
use tiledist::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration as INI
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path);
    match command {
        ConfigCommands::Path => run_path(&path),
        ConfigCommands::Show => run_show(&path),
        ConfigCommands::Init { force } => run_init(&path, force),
    }
}

fn run_path(path: &Path) -> Result<(), CliError> {
    println!("{}", path.display());
    Ok(())
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = if path.exists() {
        ConfigFile::load_from(path)?
    } else {
        ConfigFile::default()
    };
    config
        .to_ini()
        .write_to(&mut io::stdout())
        .map_err(|e| CliError::Config(format!("Failed to print configuration: {}", e)))
}

/// Write defaults to `path`, refusing to clobber unless `force`.
fn run_init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        )));
    }
    ConfigFile::default().save_to(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
