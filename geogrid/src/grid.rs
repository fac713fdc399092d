use crate::{Crs, GeoTransform, GridError};
use geo::geometry::{Coord, Rect};
use num_traits::NumCast;
use std::fmt::Debug;

/// Numeric pixel type a [`RasterGrid`] can hold.
pub trait Sample: Copy + PartialOrd + Debug + NumCast + Send + Sync + 'static {
    /// Returns true for NaN, which is always treated as nodata.
    #[allow(clippy::eq_op)]
    fn is_nan(self) -> bool {
        self.partial_cmp(&self).is_none()
    }

    fn as_f64(self) -> f64 {
        <f64 as NumCast>::from(self).unwrap_or(f64::NAN)
    }
}

impl<T> Sample for T where T: Copy + PartialOrd + Debug + NumCast + Send + Sync + 'static {}

/// A single band, georeferenced raster.
///
/// Samples are stored row-major, row 0 at the transform origin.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid<T: Sample = f64> {
    width: usize,
    height: usize,
    transform: GeoTransform,
    crs: Crs,
    nodata: Option<T>,
    samples: Vec<T>,
}

impl<T: Sample> RasterGrid<T> {
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: Crs,
        nodata: Option<T>,
        samples: Vec<T>,
    ) -> Result<Self, GridError> {
        if width * height != samples.len() {
            return Err(GridError::Shape {
                width,
                height,
                len: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            transform,
            crs,
            nodata,
            samples,
        })
    }

    /// Returns a grid with every sample set to `value`.
    pub fn filled(
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: Crs,
        nodata: Option<T>,
        value: T,
    ) -> Self {
        Self {
            width,
            height,
            transform,
            crs,
            nodata,
            samples: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the number of samples in this grid.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<T> {
        self.samples
    }

    /// Returns false for nodata and NaN samples.
    pub fn is_valid(&self, sample: T) -> bool {
        !sample.is_nan() && self.nodata != Some(sample)
    }

    /// Returns the raw sample at `(col, row)`.
    pub fn get(&self, col: usize, row: usize) -> Option<T> {
        (col < self.width && row < self.height).then(|| self.samples[row * self.width + col])
    }

    /// Returns the sample at `(col, row)` unless it is nodata.
    pub fn value(&self, col: usize, row: usize) -> Option<T> {
        self.get(col, row).filter(|s| self.is_valid(*s))
    }

    /// Returns the valid sample of the pixel containing `coord`.
    pub fn value_at(&self, coord: Coord) -> Result<Option<T>, GridError> {
        let (col, row) = self.transform.inverse()?.pixel(coord);
        if col < 0 || row < 0 {
            return Ok(None);
        }
        #[allow(clippy::cast_sign_loss)]
        let value = self.value(col as usize, row as usize);
        Ok(value)
    }

    pub fn pixel_center(&self, col: usize, row: usize) -> Coord {
        self.transform.pixel_center(col, row)
    }

    /// Axis aligned bounds of the grid footprint.
    pub fn bounds(&self) -> Rect {
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (self.width as f64, self.height as f64);
        let corners = [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(w, 0.0),
            self.transform.apply(0.0, h),
            self.transform.apply(w, h),
        ];
        let (mut min, mut max) = (corners[0], corners[0]);
        for c in &corners[1..] {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }
        Rect::new(min, max)
    }

    /// Returns a new grid of the same layout whose samples are
    /// `f(valid sample)`.
    pub fn map<U, F>(&self, nodata: Option<U>, f: F) -> RasterGrid<U>
    where
        U: Sample,
        F: Fn(Option<T>) -> U,
    {
        let samples = self
            .samples
            .iter()
            .map(|s| f(Some(*s).filter(|s| self.is_valid(*s))))
            .collect();
        RasterGrid {
            width: self.width,
            height: self.height,
            transform: self.transform,
            crs: self.crs,
            nodata,
            samples,
        }
    }

    /// Returns the same layout with different samples.
    pub fn with_samples<U: Sample>(
        &self,
        nodata: Option<U>,
        samples: Vec<U>,
    ) -> Result<RasterGrid<U>, GridError> {
        RasterGrid::new(
            self.width,
            self.height,
            self.transform,
            self.crs,
            nodata,
            samples,
        )
    }

    /// Number of samples equal to `value`.
    pub fn count(&self, value: T) -> usize {
        self.samples.iter().filter(|s| **s == value).count()
    }
}
