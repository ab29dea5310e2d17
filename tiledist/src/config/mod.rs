//! INI configuration file.
//!
//! Settings live in `config.ini` under the platform config directory
//! (`~/.config/tiledist/config.ini` on Linux). Every key is optional; a
//! missing file or key falls back to the library defaults.
//!
//! ```ini
//! [tiling]
//! nx = 3
//! ny = 2
//! buffer = 10
//!
//! [proximity]
//! target_values = 1
//! units = geo
//! nodata = -9999
//! max_distance =
//!
//! [pipeline]
//! threads = 0
//! artifact_dir =
//! keep_intermediates = false
//!
//! [output]
//! compression = deflate
//!
//! [logging]
//! level = info
//! log_dir =
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::pipeline::PipelineConfig;
use crate::proximity::{DistanceUnits, ProximityOptions};
use crate::raster::{Compression, WriteOptions};
use crate::tiler::TilingConfig;

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Default log level when none is configured.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("Failed to write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Directory holding the configuration file.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tiledist")
}

/// Full path of the default configuration file.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSettings {
    pub threads: usize,
    pub artifact_dir: Option<PathBuf>,
    pub keep_intermediates: bool,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            log_dir: None,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub tiling: TilingConfig,
    pub proximity: ProximityOptions,
    pub pipeline: PipelineSettings,
    pub compression: Compression,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Loads the default configuration file, or defaults if it is absent.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Loads a configuration file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Saves to the default configuration file.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Saves to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }

    /// Parses settings from an INI document.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(props) = ini.section(Some("tiling")) {
            if let Some(nx) = parse(props, "tiling", "nx")? {
                config.tiling.nx = nx;
            }
            if let Some(ny) = parse(props, "tiling", "ny")? {
                config.tiling.ny = ny;
            }
            if let Some(buffer) = parse(props, "tiling", "buffer")? {
                config.tiling.buffer = buffer;
            }
        }

        if let Some(props) = ini.section(Some("proximity")) {
            if let Some(raw) = non_empty(props, "target_values") {
                config.proximity.target_values = parse_list(raw, "proximity", "target_values")?;
            }
            if let Some(raw) = non_empty(props, "units") {
                config.proximity.units =
                    DistanceUnits::from_config_str(raw).ok_or_else(|| ConfigError::InvalidValue {
                        section: "proximity",
                        key: "units",
                        value: raw.to_string(),
                        reason: "expected 'geo' or 'pixel'".to_string(),
                    })?;
            }
            if let Some(nodata) = parse::<f64>(props, "proximity", "nodata")? {
                if nodata.is_finite() && nodata >= 0.0 {
                    return Err(ConfigError::InvalidValue {
                        section: "proximity",
                        key: "nodata",
                        value: nodata.to_string(),
                        reason: "must be negative or nan so it never equals a distance"
                            .to_string(),
                    });
                }
                config.proximity.nodata = nodata;
            }
            config.proximity.max_distance = parse(props, "proximity", "max_distance")?;
        }

        if let Some(props) = ini.section(Some("pipeline")) {
            if let Some(threads) = parse(props, "pipeline", "threads")? {
                config.pipeline.threads = threads;
            }
            config.pipeline.artifact_dir = non_empty(props, "artifact_dir").map(PathBuf::from);
            if let Some(keep) = parse_bool(props, "pipeline", "keep_intermediates")? {
                config.pipeline.keep_intermediates = keep;
            }
        }

        if let Some(props) = ini.section(Some("output")) {
            if let Some(raw) = non_empty(props, "compression") {
                config.compression =
                    Compression::from_config_str(raw).ok_or_else(|| ConfigError::InvalidValue {
                        section: "output",
                        key: "compression",
                        value: raw.to_string(),
                        reason: "expected 'none' or 'deflate'".to_string(),
                    })?;
            }
        }

        if let Some(props) = ini.section(Some("logging")) {
            if let Some(level) = non_empty(props, "level") {
                config.logging.level = level.to_string();
            }
            config.logging.log_dir = non_empty(props, "log_dir").map(PathBuf::from);
        }

        Ok(config)
    }

    /// Renders the settings as an INI document.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("tiling"))
            .set("nx", self.tiling.nx.to_string())
            .set("ny", self.tiling.ny.to_string())
            .set("buffer", self.tiling.buffer.to_string());

        let targets: Vec<String> = self
            .proximity
            .target_values
            .iter()
            .map(|v| v.to_string())
            .collect();
        ini.with_section(Some("proximity"))
            .set("target_values", targets.join(","))
            .set("units", self.proximity.units.as_str())
            .set("nodata", self.proximity.nodata.to_string())
            .set(
                "max_distance",
                self.proximity
                    .max_distance
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
            );

        ini.with_section(Some("pipeline"))
            .set("threads", self.pipeline.threads.to_string())
            .set("artifact_dir", path_string(self.pipeline.artifact_dir.as_deref()))
            .set(
                "keep_intermediates",
                self.pipeline.keep_intermediates.to_string(),
            );

        ini.with_section(Some("output"))
            .set("compression", self.compression.as_str());

        ini.with_section(Some("logging"))
            .set("level", self.logging.level.as_str())
            .set("log_dir", path_string(self.logging.log_dir.as_deref()));
        ini
    }

    /// Builds the pipeline configuration these settings describe.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new(self.tiling)
            .with_proximity(self.proximity.clone())
            .with_threads(self.pipeline.threads)
            .with_artifact_dir(self.pipeline.artifact_dir.clone())
            .with_keep_intermediates(self.pipeline.keep_intermediates)
            .with_write_options(WriteOptions::default().with_compression(self.compression))
    }
}

fn non_empty<'a>(props: &'a Properties, key: &str) -> Option<&'a str> {
    props.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn parse<T>(
    props: &Properties,
    section: &'static str,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    non_empty(props, key)
        .map(|raw| {
            raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                section,
                key,
                value: raw.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_bool(
    props: &Properties,
    section: &'static str,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    non_empty(props, key)
        .map(|raw| match raw.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                section,
                key,
                value: raw.to_string(),
                reason: "expected true or false".to_string(),
            }),
        })
        .transpose()
}

fn parse_list(raw: &str, section: &'static str, key: &'static str) -> Result<Vec<f64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<f64>().map_err(|e| ConfigError::InvalidValue {
                section,
                key,
                value: raw.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

fn path_string(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_default()
}
