//! Single band GeoTIFF encoding.
//!
//! Only the subset of GeoTIFF needed for north-up or affine
//! georeferenced, EPSG-coded rasters is supported.
//!
//! # References
//!
//! 1. [GeoTIFF 1.1 standard](https://docs.ogc.org/is/19-008r4/19-008r4.html)
//! 1. [GDAL_NODATA tag](https://gdal.org/drivers/raster/gtiff.html#nodata-value)

use crate::{Crs, GeoTransform, GridError, RasterGrid, Sample};
use log::debug;
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};
use tiff::{
    decoder::{Decoder, DecodingResult, Limits},
    encoder::{
        colortype::{ColorType, Gray16, Gray32Float, Gray64Float, Gray8},
        compression::Deflate,
        TiffEncoder, TiffValue,
    },
    tags::Tag,
    ColorType as DecodedColorType,
};

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_TYPE: u16 = 3072;

const MODEL_PROJECTED: u16 = 1;
const MODEL_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Sample types we can write.
pub trait TiffSample: Sample {
    type Color: ColorType<Inner = Self>;
}

impl TiffSample for u8 {
    type Color = Gray8;
}

impl TiffSample for u16 {
    type Color = Gray16;
}

impl TiffSample for f32 {
    type Color = Gray32Float;
}

impl TiffSample for f64 {
    type Color = Gray64Float;
}

/// Reads the first band of the GeoTIFF at `path`.
///
/// Samples of any integer or float type are widened to `f64`.
pub fn read<P: AsRef<Path>>(path: P) -> Result<RasterGrid<f64>, GridError> {
    let path = path.as_ref();
    let georef_err = || GridError::Georeference(path.to_owned());
    let mut decoder =
        Decoder::new(BufReader::new(File::open(path)?))?.with_limits(Limits::unlimited());

    if !matches!(decoder.colortype()?, DecodedColorType::Gray(_)) {
        return Err(GridError::SampleFormat(path.to_owned()));
    }
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let transform = match decoder.find_tag(Tag::ModelTransformationTag)? {
        Some(value) => {
            let m = value.into_f64_vec()?;
            if m.len() < 8 {
                return Err(georef_err());
            }
            GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]])
        }
        None => {
            let scale = decoder
                .find_tag(Tag::ModelPixelScaleTag)?
                .ok_or_else(georef_err)?
                .into_f64_vec()?;
            let tie = decoder
                .find_tag(Tag::ModelTiepointTag)?
                .ok_or_else(georef_err)?
                .into_f64_vec()?;
            if scale.len() < 2 || tie.len() < 6 {
                return Err(georef_err());
            }
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            GeoTransform::from_gdal([x - i * scale[0], scale[0], 0.0, y + j * scale[1], 0.0, -scale[1]])
        }
    };

    let keys = decoder
        .find_tag(Tag::GeoKeyDirectoryTag)?
        .ok_or_else(georef_err)?
        .into_u32_vec()?;
    let crs = crs_from_geokeys(&keys).ok_or_else(georef_err)?;

    let nodata = match decoder.find_tag(Tag::GdalNodata)? {
        Some(value) => parse_nodata(&value.into_string()?),
        None => None,
    };

    let samples: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        _ => return Err(GridError::SampleFormat(path.to_owned())),
    };

    debug!("read {path:?}; {width}x{height}, {crs}, nodata: {nodata:?}");
    RasterGrid::new(width, height, transform, crs, nodata, samples)
}

/// Writes `grid` as a Deflate compressed, single band GeoTIFF.
pub fn write<T, P>(grid: &RasterGrid<T>, path: P) -> Result<(), GridError>
where
    T: TiffSample,
    [T]: TiffValue,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let (width, height) = (
        u32::try_from(grid.width()).map_err(|_| GridError::SampleFormat(path.to_owned()))?,
        u32::try_from(grid.height()).map_err(|_| GridError::SampleFormat(path.to_owned()))?,
    );
    let geokeys = geokeys(grid.crs())?;

    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut image = encoder.new_image_with_compression::<T::Color, _>(
        width,
        height,
        Deflate::default(),
    )?;
    {
        let dir = image.encoder();
        let gt = grid.transform();
        if gt.has_rotation() {
            let m = [
                gt.dx, gt.rx, 0.0, gt.x0, //
                gt.ry, gt.dy, 0.0, gt.y0, //
                0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ];
            dir.write_tag(Tag::ModelTransformationTag, &m[..])?;
        } else {
            dir.write_tag(Tag::ModelPixelScaleTag, &[gt.dx, -gt.dy, 0.0][..])?;
            dir.write_tag(
                Tag::ModelTiepointTag,
                &[0.0, 0.0, 0.0, gt.x0, gt.y0, 0.0][..],
            )?;
        }
        dir.write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;
        if let Some(nodata) = grid.nodata() {
            dir.write_tag(Tag::GdalNodata, format_nodata(nodata).as_str())?;
        }
    }
    image.write_data(grid.samples())?;
    debug!("wrote {path:?}; {width}x{height}, {}", grid.crs());
    Ok(())
}

fn geokeys(crs: Crs) -> Result<Vec<u16>, GridError> {
    let code = u16::try_from(crs.epsg()).map_err(|_| GridError::UnsupportedCrs(crs.epsg()))?;
    let (model, key) = if crs.is_geographic() {
        (MODEL_GEOGRAPHIC, KEY_GEOGRAPHIC_TYPE)
    } else {
        (MODEL_PROJECTED, KEY_PROJECTED_TYPE)
    };
    Ok(vec![
        1, 1, 0, 3, //
        KEY_MODEL_TYPE, 0, 1, model, //
        KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA, //
        key, 0, 1, code,
    ])
}

/// Returns the EPSG code of the projected or geographic CRS key.
fn crs_from_geokeys(keys: &[u32]) -> Option<Crs> {
    let n_keys = *keys.get(3)? as usize;
    let entries = keys.get(4..4 + 4 * n_keys)?;
    let lookup = |wanted: u16| {
        entries
            .chunks_exact(4)
            .find(|e| e[0] == u32::from(wanted) && e[1] == 0)
            .map(|e| e[3])
    };
    lookup(KEY_PROJECTED_TYPE)
        .or_else(|| lookup(KEY_GEOGRAPHIC_TYPE))
        .filter(|code| *code != 0 && *code != 32767)
        .map(Crs::from_epsg)
}

fn format_nodata<T: Sample>(nodata: T) -> String {
    let v = nodata.as_f64();
    if v.is_nan() {
        "nan".to_owned()
    } else {
        format!("{v}")
    }
}

fn parse_nodata(raw: &str) -> Option<f64> {
    let raw = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if raw.eq_ignore_ascii_case("nan") {
        Some(f64::NAN)
    } else {
        raw.parse().ok()
    }
}
