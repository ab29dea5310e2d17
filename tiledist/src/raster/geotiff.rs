//! Single-band GeoTIFF reading and writing.
//!
//! Reads go through the decoder's chunk API so a window only decodes the
//! strips or tiles it overlaps. Writes always produce Float32 output with the
//! georeferencing, GeoKey and `GDAL_NODATA` tags copied from the grid.
//!
//! # Georeferencing tags
//!
//! | Tag                     | Use                                        |
//! |-------------------------|--------------------------------------------|
//! | `ModelTransformationTag`| full affine transform (rotated rasters)    |
//! | `ModelPixelScaleTag`    | pixel size, with `ModelTiepointTag` origin |
//! | `GeoKeyDirectoryTag`    | projection keys, carried through verbatim  |
//! | `GdalNodata`            | no-data sentinel as ASCII                  |

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::compression::{Compression as TiffCompression, Deflate, Uncompressed};
use tiff::encoder::{colortype, DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tracing::debug;

use super::{RasterError, RasterSource};
use crate::grid::{CellType, GeoTransform, Grid, GridMeta, Projection, Window};

/// Compression applied to written rasters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    /// Raw strips.
    None,
    /// Deflate (zlib), the GDAL `COMPRESS=DEFLATE` equivalent.
    #[default]
    Deflate,
}

impl Compression {
    /// Parse from a config string (`none`, `deflate`).
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "raw" => Some(Compression::None),
            "deflate" | "zlib" => Some(Compression::Deflate),
            _ => None,
        }
    }

    /// Config string for this compression.
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Deflate => "deflate",
        }
    }
}

/// Options for [`write_geotiff`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub compression: Compression,
}

impl WriteOptions {
    /// Set the compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

/// Strip or tile layout of the source file.
#[derive(Debug, Clone, Copy)]
struct ChunkLayout {
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
}

/// A GeoTIFF opened for windowed reads of its first (only) band.
pub struct GeoTiffSource {
    path: PathBuf,
    meta: GridMeta,
    layout: ChunkLayout,
    decoder: Mutex<Decoder<BufReader<File>>>,
}

impl GeoTiffSource {
    /// Opens a GeoTIFF and reads its metadata.
    ///
    /// # Errors
    ///
    /// Returns `RasterError` if the file cannot be opened or decoded, or if
    /// it has more than one sample per pixel or an unsupported sample type.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RasterError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| RasterError::Open {
            path: path.clone(),
            source,
        })?;
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions()?;
        let samples = first_u16(&mut decoder, Tag::SamplesPerPixel)?.unwrap_or(1);
        if samples != 1 {
            return Err(RasterError::Unsupported(format!(
                "{} samples per pixel (only single-band rasters are supported)",
                samples
            )));
        }
        let bits = first_u16(&mut decoder, Tag::BitsPerSample)?.unwrap_or(1);
        let format = first_u16(&mut decoder, Tag::SampleFormat)?.unwrap_or(1);
        let cell_type = cell_type_for(format, bits)?;

        let geo_transform = read_geo_transform(&mut decoder)?.unwrap_or_default();
        let projection = read_projection(&mut decoder)?;
        let nodata = read_nodata(&mut decoder)?;

        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let chunk_width = (chunk_width as usize).max(1);
        let layout = ChunkLayout {
            chunk_width,
            chunk_height: (chunk_height as usize).max(1),
            chunks_across: (width as usize).div_ceil(chunk_width),
        };

        let meta = GridMeta {
            width: width as usize,
            height: height as usize,
            geo_transform,
            projection,
            cell_type,
            nodata,
        };

        debug!(
            path = %path.display(),
            width = meta.width,
            height = meta.height,
            cell_type = ?meta.cell_type,
            nodata = ?meta.nodata,
            epsg = ?meta.projection.epsg(),
            chunk_width = layout.chunk_width,
            chunk_height = layout.chunk_height,
            "Opened GeoTIFF"
        );

        Ok(Self {
            path,
            meta,
            layout,
            decoder: Mutex::new(decoder),
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterSource for GeoTiffSource {
    fn meta(&self) -> &GridMeta {
        &self.meta
    }

    fn read_window(&self, window: &Window) -> Result<Grid, RasterError> {
        let meta = self.meta.for_window(window);
        if !window.fits_within(self.meta.width, self.meta.height) {
            return Err(crate::grid::GridError::WindowOutOfBounds {
                window: *window,
                width: self.meta.width,
                height: self.meta.height,
            }
            .into());
        }
        if window.is_empty() {
            return Ok(Grid::new(meta, Vec::new())?);
        }

        let layout = self.layout;
        let mut values = vec![0.0; window.area()];
        let first_col = window.x_off / layout.chunk_width;
        let last_col = (window.right() - 1) / layout.chunk_width;
        let first_row = window.y_off / layout.chunk_height;
        let last_row = (window.bottom() - 1) / layout.chunk_height;

        let mut decoder = self.decoder.lock();
        for chunk_row in first_row..=last_row {
            for chunk_col in first_col..=last_col {
                let chunk_index = (chunk_row * layout.chunks_across + chunk_col) as u32;
                let (data_width, data_height) = decoder.chunk_data_dimensions(chunk_index);
                let (data_width, data_height) = (data_width as usize, data_height as usize);
                let chunk = decoded_to_f64(decoder.read_chunk(chunk_index)?)?;

                let chunk_window = Window::new(
                    chunk_col * layout.chunk_width,
                    chunk_row * layout.chunk_height,
                    data_width,
                    data_height,
                );
                let Some(overlap) = window.intersection(&chunk_window) else {
                    continue;
                };

                for y in overlap.y_off..overlap.bottom() {
                    let src = (y - chunk_window.y_off) * data_width
                        + (overlap.x_off - chunk_window.x_off);
                    let dst = (y - window.y_off) * window.width + (overlap.x_off - window.x_off);
                    let row = chunk.get(src..src + overlap.width).ok_or_else(|| {
                        RasterError::Corrupt(format!(
                            "chunk {} holds {} samples, expected {}×{}",
                            chunk_index,
                            chunk.len(),
                            data_width,
                            data_height
                        ))
                    })?;
                    values[dst..dst + overlap.width].copy_from_slice(row);
                }
            }
        }

        Ok(Grid::new(meta, values)?)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Writes a grid as a single-band Float32 GeoTIFF.
///
/// Parent directories are created as needed. Values are narrowed to `f32`.
pub fn write_geotiff(path: &Path, grid: &Grid, options: &WriteOptions) -> Result<(), RasterError> {
    let data: Vec<f32> = grid.values().iter().map(|&v| v as f32).collect();
    write_geotiff_f32(path, grid.meta(), &data, options)
}

/// Writes `values` described by `meta` as a single-band Float32 GeoTIFF.
///
/// Output is striped (the encoder's default rows per strip) with no
/// predictor. `meta.cell_type` is ignored.
pub fn write_geotiff_f32(
    path: &Path,
    meta: &GridMeta,
    values: &[f32],
    options: &WriteOptions,
) -> Result<(), RasterError> {
    if values.len() != meta.cell_count() {
        return Err(crate::grid::GridError::DimensionMismatch {
            width: meta.width,
            height: meta.height,
            len: values.len(),
        }
        .into());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path).map_err(|source| RasterError::Create {
        path: path.to_path_buf(),
        source,
    })?;

    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    match options.compression {
        Compression::None => write_image(&mut encoder, meta, values, Uncompressed)?,
        Compression::Deflate => write_image(&mut encoder, meta, values, Deflate::default())?,
    }

    debug!(
        path = %path.display(),
        width = meta.width,
        height = meta.height,
        compression = options.compression.as_str(),
        "Wrote GeoTIFF"
    );
    Ok(())
}

fn write_image<W: Write + Seek, D: TiffCompression>(
    encoder: &mut TiffEncoder<W>,
    meta: &GridMeta,
    data: &[f32],
    compression: D,
) -> Result<(), RasterError> {
    let mut image = encoder.new_image_with_compression::<colortype::Gray32Float, D>(
        meta.width as u32,
        meta.height as u32,
        compression,
    )?;
    write_geo_tags(image.encoder(), meta)?;
    image.write_data(data)?;
    Ok(())
}

fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    directory: &mut DirectoryEncoder<'_, W, K>,
    meta: &GridMeta,
) -> Result<(), RasterError> {
    let gt = &meta.geo_transform;
    if gt.is_north_up() {
        let scale = [gt.pixel_width, -gt.pixel_height, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        directory.write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
        directory.write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
    } else {
        let matrix = [
            gt.pixel_width,
            gt.row_rotation,
            0.0,
            gt.origin_x,
            gt.col_rotation,
            gt.pixel_height,
            0.0,
            gt.origin_y,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            1.0,
        ];
        directory.write_tag(Tag::ModelTransformationTag, &matrix[..])?;
    }

    let projection = &meta.projection;
    if !projection.geo_keys.is_empty() {
        directory.write_tag(Tag::GeoKeyDirectoryTag, &projection.geo_keys[..])?;
    }
    if !projection.geo_doubles.is_empty() {
        directory.write_tag(Tag::GeoDoubleParamsTag, &projection.geo_doubles[..])?;
    }
    if let Some(ascii) = &projection.geo_ascii {
        directory.write_tag(Tag::GeoAsciiParamsTag, ascii.as_str())?;
    }
    if let Some(nodata) = meta.nodata {
        directory.write_tag(Tag::GdalNodata, format_nodata(nodata).as_str())?;
    }
    Ok(())
}

/// Formats a no-data value the way GDAL writes it.
fn format_nodata(nodata: f64) -> String {
    if nodata.is_nan() {
        "nan".to_string()
    } else {
        nodata.to_string()
    }
}

fn first_u16<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<u16>, RasterError> {
    Ok(decoder
        .find_tag_unsigned_vec::<u16>(tag)?
        .and_then(|values| values.first().copied()))
}

fn find_f64s<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<Vec<f64>>, RasterError> {
    Ok(decoder.find_tag(tag)?.map(|v| v.into_f64_vec()).transpose()?)
}

fn find_ascii<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<String>, RasterError> {
    Ok(decoder.find_tag(tag)?.map(|v| v.into_string()).transpose()?)
}

fn read_geo_transform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Option<GeoTransform>, RasterError> {
    if let Some(m) = find_f64s(decoder, Tag::ModelTransformationTag)? {
        if m.len() >= 8 {
            return Ok(Some(GeoTransform::from_gdal([
                m[3], m[0], m[1], m[7], m[4], m[5],
            ])));
        }
    }

    let scale = find_f64s(decoder, Tag::ModelPixelScaleTag)?;
    let tiepoint = find_f64s(decoder, Tag::ModelTiepointTag)?;
    match (scale, tiepoint) {
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => {
            let (sx, sy) = (s[0], s[1]);
            let (col, row, x, y) = (t[0], t[1], t[3], t[4]);
            Ok(Some(GeoTransform {
                origin_x: x - col * sx,
                pixel_width: sx,
                row_rotation: 0.0,
                origin_y: y + row * sy,
                col_rotation: 0.0,
                pixel_height: -sy,
            }))
        }
        _ => Ok(None),
    }
}

fn read_projection<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Projection, RasterError> {
    let geo_keys = decoder
        .find_tag_unsigned_vec::<u16>(Tag::GeoKeyDirectoryTag)?
        .unwrap_or_default();
    let geo_doubles = find_f64s(decoder, Tag::GeoDoubleParamsTag)?.unwrap_or_default();
    let geo_ascii = find_ascii(decoder, Tag::GeoAsciiParamsTag)?;
    Ok(Projection {
        geo_keys,
        geo_doubles,
        geo_ascii,
    })
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>, RasterError> {
    let Some(text) = find_ascii(decoder, Tag::GdalNodata)? else {
        return Ok(None);
    };
    let trimmed = text.trim_matches(char::from(0)).trim();
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|_| RasterError::Corrupt(format!("unparseable GDAL_NODATA value '{}'", trimmed)))
}

fn cell_type_for(sample_format: u16, bits: u16) -> Result<CellType, RasterError> {
    match (sample_format, bits) {
        (1, 8) => Ok(CellType::U8),
        (1, 16) => Ok(CellType::U16),
        (1, 32) => Ok(CellType::U32),
        (1, 64) => Ok(CellType::U64),
        (2, 8) => Ok(CellType::I8),
        (2, 16) => Ok(CellType::I16),
        (2, 32) => Ok(CellType::I32),
        (2, 64) => Ok(CellType::I64),
        (3, 32) => Ok(CellType::F32),
        (3, 64) => Ok(CellType::F64),
        _ => Err(RasterError::Unsupported(format!(
            "sample format {} with {} bits per sample",
            sample_format, bits
        ))),
    }
}

fn decoded_to_f64(result: DecodingResult) -> Result<Vec<f64>, RasterError> {
    let values = match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => {
            return Err(RasterError::Unsupported(
                "decoded sample type has no f64 conversion".to_string(),
            ))
        }
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn georeferenced_grid() -> Grid {
        let meta = GridMeta::new(5, 4, CellType::F32)
            .with_geo_transform(GeoTransform::north_up(500_000.0, 4_100_000.0, 30.0, 30.0))
            .with_projection(Projection {
                geo_keys: vec![1, 1, 0, 1, 3072, 0, 1, 32633],
                ..Default::default()
            })
            .with_nodata(Some(-9999.0));
        let values = (0..20).map(|v| v as f64 * 0.5).collect();
        Grid::new(meta, values).unwrap()
    }

    #[test]
    fn test_write_then_open_preserves_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.tif");
        let grid = georeferenced_grid();
        write_geotiff(&path, &grid, &WriteOptions::default()).unwrap();

        let source = GeoTiffSource::open(&path).unwrap();
        let meta = source.meta();
        assert_eq!(meta.width, 5);
        assert_eq!(meta.height, 4);
        assert_eq!(meta.cell_type, CellType::F32);
        assert_eq!(meta.nodata, Some(-9999.0));
        assert_eq!(meta.projection.epsg(), Some(32633));
        assert!(meta.geo_transform.approx_eq(&grid.meta().geo_transform));
    }

    #[test]
    fn test_read_window_matches_subgrid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.tif");
        let grid = georeferenced_grid();
        write_geotiff(
            &path,
            &grid,
            &WriteOptions::default().with_compression(Compression::None),
        )
        .unwrap();

        let source = GeoTiffSource::open(&path).unwrap();
        let window = Window::new(1, 1, 3, 2);
        let read = source.read_window(&window).unwrap();
        let expected = grid.subgrid(&window).unwrap();
        assert_eq!(read.values(), expected.values());
        assert!(read
            .meta()
            .geo_transform
            .approx_eq(&expected.meta().geo_transform));
    }

    #[test]
    fn test_read_window_out_of_bounds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.tif");
        write_geotiff(&path, &georeferenced_grid(), &WriteOptions::default()).unwrap();

        let source = GeoTiffSource::open(&path).unwrap();
        assert!(source.read_window(&Window::new(4, 0, 2, 1)).is_err());
    }

    #[test]
    fn test_rotated_transform_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rotated.tif");
        let meta = GridMeta::new(2, 2, CellType::F32)
            .with_geo_transform(GeoTransform::from_gdal([10.0, 2.0, 0.5, 20.0, 0.25, -2.0]));
        let grid = Grid::new(meta, vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        write_geotiff(&path, &grid, &WriteOptions::default()).unwrap();

        let source = GeoTiffSource::open(&path).unwrap();
        assert_eq!(
            source.meta().geo_transform.to_gdal(),
            [10.0, 2.0, 0.5, 20.0, 0.25, -2.0]
        );
        assert_eq!(source.meta().nodata, None);
    }

    #[test]
    fn test_nan_nodata_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nan.tif");
        let meta = GridMeta::new(1, 1, CellType::F32).with_nodata(Some(f64::NAN));
        write_geotiff(&path, &Grid::filled(meta, f64::NAN), &WriteOptions::default()).unwrap();

        let source = GeoTiffSource::open(&path).unwrap();
        assert!(source.meta().nodata.is_some_and(f64::is_nan));
        let grid = source.read_window(&Window::full(1, 1)).unwrap();
        assert!(grid.values()[0].is_nan());
    }

    #[test]
    fn test_write_rejects_short_buffer() {
        let dir = tempdir().unwrap();
        let meta = GridMeta::new(2, 2, CellType::F32);
        let err = write_geotiff_f32(
            &dir.path().join("short.tif"),
            &meta,
            &[0.0; 3],
            &WriteOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RasterError::Grid(_)));
        assert!(!dir.path().join("short.tif").exists());
    }

    #[test]
    fn test_open_missing_file() {
        let err = GeoTiffSource::open("/nonexistent/input.tif").err().unwrap();
        assert!(matches!(err, RasterError::Open { .. }));
        assert!(err.to_string().contains("/nonexistent/input.tif"));
    }

    #[test]
    fn test_compression_from_config_str() {
        assert_eq!(Compression::from_config_str("DEFLATE"), Some(Compression::Deflate));
        assert_eq!(Compression::from_config_str("none"), Some(Compression::None));
        assert_eq!(Compression::from_config_str("lzw"), None);
    }

    #[test]
    fn test_cell_type_for() {
        assert_eq!(cell_type_for(1, 8).unwrap(), CellType::U8);
        assert_eq!(cell_type_for(3, 32).unwrap(), CellType::F32);
        assert!(cell_type_for(3, 16).is_err());
    }
}
