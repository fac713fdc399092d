//! Georeferenced raster grids and polygon sets.
//!
//! [`RasterGrid`] pairs a row-major sample buffer with an affine
//! [`GeoTransform`] and an EPSG [`Crs`]. [`PolygonSet`] is a CRS tagged
//! collection of [`Shape`]s. The [`geotiff`] and [`features`] modules
//! move both to and from disk, and [`warp_bilinear`] resamples a grid
//! into another CRS.

mod crs;
mod error;
pub mod features;
pub mod geotiff;
mod grid;
mod shape;
mod transform;
mod warp;

pub use crate::{
    crs::{Crs, Reprojector},
    error::GridError,
    grid::{RasterGrid, Sample},
    shape::{PolygonSet, Properties, Shape},
    transform::{GeoTransform, InverseTransform},
    warp::warp_bilinear,
};
