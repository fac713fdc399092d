use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("{0}")]
    GeoJson(#[from] geojson::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported CRS EPSG:{0}")]
    UnsupportedCrs(u32),

    #[error("invalid CRS {0:?}")]
    InvalidCrs(String),

    #[error("reprojection from {from} to {to} failed, {reason}")]
    Projection {
        from: crate::Crs,
        to: crate::Crs,
        reason: String,
    },

    #[error("missing or invalid georeferencing in {0}")]
    Georeference(PathBuf),

    #[error("unsupported sample layout in {0}")]
    SampleFormat(PathBuf),

    #[error("{width}x{height} grid can not hold {len} samples")]
    Shape {
        width: usize,
        height: usize,
        len: usize,
    },

    #[error("geotransform is not invertible")]
    Singular,

    #[error("grid has no nodata value to fill uncovered pixels with")]
    NoNodata,

    #[error("invalid pixel size {0}")]
    Resolution(f64),

    #[error("non-polygonal geometry in {0}")]
    NotPolygonal(String),
}
