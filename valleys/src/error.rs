use crate::{acquire::Quadrant, ProviderError};
use geogrid::{Crs, GridError};
use std::path::PathBuf;
use thiserror::Error;

/// Problems detected before any unit is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid grouping level {0:?}, expected one of huc2, huc4, huc6, huc8, none")]
    Level(String),

    #[error("missing required file {0}")]
    MissingFile(PathBuf),

    #[error("{0}")]
    Grouping(#[from] GroupingError),

    #[error("mask, {0}")]
    Mask(#[from] MaskError),
}

#[derive(Error, Debug)]
pub enum GroupingError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("tile name {0} does not start with a 10 digit watershed id")]
    InvalidTileName(PathBuf),

    #[error("no tiles to mosaic in {0}")]
    NoTiles(PathBuf),
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("no grids to merge")]
    Empty,

    #[error("CRS mismatch, expected {expected} got {actual}")]
    CrsMismatch { expected: Crs, actual: Crs },

    #[error("degenerate pixel size")]
    PixelSize,

    #[error("merged footprint is empty")]
    EmptyFootprint,

    #[error("{0}")]
    Grid(#[from] GridError),
}

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("{0}")]
    Grid(#[from] GridError),

    #[error("no features match {key}={value}")]
    NoMatch { key: String, value: String },

    #[error("mask policy needs a working CRS in linear units, got {0}")]
    Geographic(Crs),
}

#[derive(Error, Debug)]
pub enum ClipError {
    #[error("{0}")]
    Grid(#[from] GridError),

    #[error("mask is in {mask}, grid is in {grid}")]
    CrsMismatch { mask: Crs, grid: Crs },

    #[error("grid has no nodata value to mark clipped pixels with")]
    Nodata,

    #[error("crop window does not intersect the grid")]
    Disjoint,
}

#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("{0}")]
    Direct(ProviderError),

    #[error("{quadrant} quadrant, {source}")]
    Quadrant {
        quadrant: Quadrant,
        source: ProviderError,
    },

    #[error("region has no extent")]
    EmptyRegion,

    #[error("{0}")]
    Grid(#[from] GridError),

    #[error("{0}")]
    Merge(#[from] MergeError),

    #[error("{0}")]
    Clip(#[from] ClipError),
}

/// Failure of one stage of one unit.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Acquire(#[from] AcquireError),

    #[error("{0}")]
    Grid(#[from] GridError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid boundary geometry, {0}")]
    Geometry(String),

    #[error("skipped, {0}")]
    Skipped(String),
}
