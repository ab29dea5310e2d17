//! Proximity (distance-to-target) transforms.
//!
//! The option set mirrors GDAL's `ComputeProximity`:
//!
//! | GDAL option       | Field                           |
//! |-------------------|---------------------------------|
//! | `VALUES=1`        | [`ProximityOptions::target_values`] |
//! | `DISTUNITS=GEO`   | [`ProximityOptions::units`]     |
//! | `NODATA=-9999`    | [`ProximityOptions::nodata`]    |
//! | `MAXDIST=...`     | [`ProximityOptions::max_distance`] |
//!
//! [`ProximityKernel`] is the seam for the numeric transform itself;
//! [`EuclideanKernel`] is the exact implementation used by default.

mod euclidean;

pub use euclidean::EuclideanKernel;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::{Grid, GridMeta};

/// Default value marking target cells.
pub const DEFAULT_TARGET_VALUE: f64 = 1.0;

/// Default sentinel written where no target is reachable.
pub const DEFAULT_PROXIMITY_NODATA: f64 = -9999.0;

/// Errors from proximity configuration or computation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProximityError {
    /// No target values were configured.
    #[error("At least one target value is required")]
    NoTargetValues,

    /// A target value can never match a cell.
    #[error("Target value {0} is not finite")]
    InvalidTargetValue(f64),

    /// Geo units need a finite, non-zero pixel size.
    #[error("Pixel size {width}×{height} cannot be used for geographic distances")]
    InvalidPixelSize { width: f64, height: f64 },

    /// The unreachable-cell sentinel could be mistaken for a distance.
    #[error("Proximity no-data {0} is a possible distance; use a negative value or NaN")]
    AmbiguousNodata(f64),

    /// Maximum distance must be positive.
    #[error("Maximum distance must be positive and finite, got {0}")]
    InvalidMaxDistance(f64),

    /// Kernel produced the wrong number of cells.
    #[error("Kernel returned {actual} cells for a {width}×{height} input")]
    OutputSize {
        width: usize,
        height: usize,
        actual: usize,
    },
}

/// Units in which distances are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceUnits {
    /// Ground units of the grid's geotransform.
    #[default]
    Geo,
    /// Pixel steps.
    Pixel,
}

impl DistanceUnits {
    /// Parse from a config string (`geo`, `pixel`).
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "geo" => Some(DistanceUnits::Geo),
            "pixel" => Some(DistanceUnits::Pixel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceUnits::Geo => "geo",
            DistanceUnits::Pixel => "pixel",
        }
    }
}

/// Configuration for a proximity transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityOptions {
    /// Cells equal to any of these values are targets (distance 0).
    pub target_values: Vec<f64>,
    /// Units of the output distances.
    pub units: DistanceUnits,
    /// Written where no target is reachable. Distinct from the source's
    /// own no-data sentinel.
    pub nodata: f64,
    /// Distances beyond this are written as `nodata`.
    pub max_distance: Option<f64>,
}

impl Default for ProximityOptions {
    fn default() -> Self {
        Self {
            target_values: vec![DEFAULT_TARGET_VALUE],
            units: DistanceUnits::Geo,
            nodata: DEFAULT_PROXIMITY_NODATA,
            max_distance: None,
        }
    }
}

impl ProximityOptions {
    /// Set the target values.
    pub fn with_target_values(mut self, values: impl Into<Vec<f64>>) -> Self {
        self.target_values = values.into();
        self
    }

    /// Set the distance units.
    pub fn with_units(mut self, units: DistanceUnits) -> Self {
        self.units = units;
        self
    }

    /// Set the unreachable-cell sentinel.
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = nodata;
        self
    }

    /// Set (or clear) the maximum distance.
    pub fn with_max_distance(mut self, max_distance: Option<f64>) -> Self {
        self.max_distance = max_distance;
        self
    }

    /// Checks the options for values that can never produce a result.
    pub fn validate(&self) -> Result<(), ProximityError> {
        if self.target_values.is_empty() {
            return Err(ProximityError::NoTargetValues);
        }
        if let Some(bad) = self.target_values.iter().find(|v| !v.is_finite()) {
            return Err(ProximityError::InvalidTargetValue(*bad));
        }
        if self.nodata.is_finite() && self.nodata >= 0.0 {
            return Err(ProximityError::AmbiguousNodata(self.nodata));
        }
        if let Some(max) = self.max_distance {
            if !(max.is_finite() && max > 0.0) {
                return Err(ProximityError::InvalidMaxDistance(max));
            }
        }
        Ok(())
    }

    /// Returns true if `value` is one of the target values.
    #[inline]
    pub fn is_target(&self, value: f64) -> bool {
        self.target_values.iter().any(|&t| t == value)
    }

    /// Distance covered by one step along x and along y.
    pub fn spacing(&self, meta: &GridMeta) -> Result<(f64, f64), ProximityError> {
        match self.units {
            DistanceUnits::Pixel => Ok((1.0, 1.0)),
            DistanceUnits::Geo => {
                let (width, height) = meta.geo_transform.pixel_size();
                let usable = |v: f64| v.is_finite() && v > 0.0;
                if usable(width) && usable(height) {
                    Ok((width, height))
                } else {
                    Err(ProximityError::InvalidPixelSize { width, height })
                }
            }
        }
    }
}

/// A proximity transform.
///
/// Implementations return one value per input cell, row-major: the distance
/// to the nearest target cell, or `options.nodata` where none is reachable.
/// They must not depend on anything outside `input`.
pub trait ProximityKernel: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Computes distances for every cell of `input`.
    fn proximity(&self, input: &Grid, options: &ProximityOptions)
        -> Result<Vec<f64>, ProximityError>;
}
