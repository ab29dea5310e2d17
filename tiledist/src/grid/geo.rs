//! Georeferencing types carried by every grid.
//!
//! `GeoTransform` follows GDAL's six-coefficient ordering so values read from
//! GeoTIFF tags and values printed by GDAL tools line up one to one.

use serde::{Deserialize, Serialize};

use super::Window;

/// GeoKey id of `GeographicTypeGeoKey`.
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
/// GeoKey id of `ProjectedCSTypeGeoKey`.
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Affine transform from pixel/line space to georeferenced space.
///
/// ```text
/// x_geo = origin_x + col * pixel_width  + row * row_rotation
/// y_geo = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// North-up rasters have zero rotations and a negative `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl Default for GeoTransform {
    /// Pixel space: unit pixels, origin at the top-left corner, y down.
    fn default() -> Self {
        Self::north_up(0.0, 0.0, 1.0, 1.0)
    }
}

impl GeoTransform {
    /// Creates a north-up transform (no rotation).
    ///
    /// `pixel_height` is given as a positive size and stored negated, the
    /// usual orientation for rasters whose first row is the northern edge.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    /// Builds a transform from GDAL's coefficient array.
    pub fn from_gdal(coefficients: [f64; 6]) -> Self {
        Self {
            origin_x: coefficients[0],
            pixel_width: coefficients[1],
            row_rotation: coefficients[2],
            origin_y: coefficients[3],
            col_rotation: coefficients[4],
            pixel_height: coefficients[5],
        }
    }

    /// Returns GDAL's coefficient array.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Returns true if the transform has no rotation terms.
    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0
    }

    /// Ground size of one pixel step along x and y (absolute values).
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// Georeferenced position of the top-left corner of pixel `(col, row)`.
    #[inline]
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Transform of a sub-window whose top-left pixel is `window`'s offset.
    pub fn window_transform(&self, window: &Window) -> GeoTransform {
        let (origin_x, origin_y) = self.pixel_to_geo(window.x_off as f64, window.y_off as f64);
        GeoTransform {
            origin_x,
            origin_y,
            ..*self
        }
    }

    /// Compares two transforms coefficient by coefficient with a relative
    /// tolerance scaled by the larger pixel size.
    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        let (sx, sy) = self.pixel_size();
        let scale = sx.max(sy).max(f64::MIN_POSITIVE);
        let tolerance = 1e-9 * scale.max(1.0);
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0))
    }
}

/// Opaque projection metadata, carried from input to output untouched.
///
/// Holds the raw GeoTIFF GeoKey directory and its parameter tags. Nothing in
/// the pipeline interprets them beyond [`Projection::epsg`] for logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub geo_keys: Vec<u16>,
    pub geo_doubles: Vec<f64>,
    pub geo_ascii: Option<String>,
}

impl Projection {
    /// Returns true if no projection information is attached.
    pub fn is_empty(&self) -> bool {
        self.geo_keys.is_empty() && self.geo_doubles.is_empty() && self.geo_ascii.is_none()
    }

    /// EPSG code of the projected (or, failing that, geographic) CRS, when
    /// the key directory stores it inline.
    pub fn epsg(&self) -> Option<u16> {
        // Header is 4 shorts, then entries of (key, location, count, value).
        let entries = self.geo_keys.get(4..)?;
        let lookup = |wanted: u16| {
            entries
                .chunks_exact(4)
                .find(|entry| entry[0] == wanted && entry[1] == 0)
                .map(|entry| entry[3])
        };
        lookup(PROJECTED_CS_TYPE_KEY).or_else(|| lookup(GEOGRAPHIC_TYPE_KEY))
    }
}
