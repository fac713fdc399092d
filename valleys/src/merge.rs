//! Raster merge and binary floor classification.

use crate::MergeError;
use geo::geometry::{Coord, Rect};
use geogrid::{Crs, GeoTransform, RasterGrid, Sample};
use log::debug;
use std::ops::Range;

/// Pixel is valley floor.
pub const FLOOR: u8 = 1;

/// Pixel is valid terrain, but not valley floor.
pub const NOT_FLOOR: u8 = 0;

/// Pixel is outside of any source or clipped away.
pub const NODATA: u8 = 255;

/// Classifies every valid sample as [`FLOOR`] (`> 0`) or
/// [`NOT_FLOOR`]; nodata and NaN become [`NODATA`].
///
/// Binarizing a binary grid returns an equal grid.
pub fn binarize<T: Sample>(grid: &RasterGrid<T>) -> RasterGrid<u8> {
    grid.map(Some(NODATA), |sample| match sample {
        Some(v) if v.as_f64() > 0.0 => FLOOR,
        Some(_) => NOT_FLOOR,
        None => NODATA,
    })
}

/// Merges floor tiles into one binary grid covering their union.
///
/// Overlaps are resolved with OR: a merged pixel is [`FLOOR`] if any
/// source sample under it is positive, so the result does not depend
/// on input order. Pixels no source covers with valid data are
/// [`NODATA`].
pub fn merge_floors<T: Sample>(grids: &[RasterGrid<T>]) -> Result<RasterGrid<u8>, MergeError> {
    let layout = Layout::union(grids)?;
    let mut samples = vec![NODATA; layout.len()];
    layout.visit(grids, |idx, v| {
        if v.as_f64() > 0.0 {
            samples[idx] = FLOOR;
        } else if samples[idx] == NODATA {
            samples[idx] = NOT_FLOOR;
        }
    })?;
    Ok(layout.into_grid(Some(NODATA), samples)?)
}

/// Merges grids into one covering their union where the first valid
/// sample (in input order) wins.
///
/// Uncovered pixels are set to `nodata`.
pub fn merge_first_valid<T: Sample>(
    grids: &[RasterGrid<T>],
    nodata: T,
) -> Result<RasterGrid<T>, MergeError> {
    let layout = Layout::union(grids)?;
    let mut samples: Vec<Option<T>> = vec![None; layout.len()];
    layout.visit(grids, |idx, v| {
        samples[idx].get_or_insert(v);
    })?;
    let samples = samples.into_iter().map(|s| s.unwrap_or(nodata)).collect();
    Ok(layout.into_grid(Some(nodata), samples)?)
}

/// North-up output grid spanning the union of several inputs, at the
/// finest input pixel size.
struct Layout {
    width: usize,
    height: usize,
    transform: GeoTransform,
    crs: Crs,
}

impl Layout {
    fn union<T: Sample>(grids: &[RasterGrid<T>]) -> Result<Self, MergeError> {
        let first = grids.first().ok_or(MergeError::Empty)?;
        let crs = first.crs();
        if let Some(other) = grids.iter().find(|g| g.crs() != crs) {
            return Err(MergeError::CrsMismatch {
                expected: crs,
                actual: other.crs(),
            });
        }

        // Finest input resolution, so no source pixel falls between
        // output centers.
        let (mut px, mut py) = (f64::INFINITY, f64::INFINITY);
        for grid in grids {
            let (w, h) = (
                grid.transform().pixel_width(),
                grid.transform().pixel_height(),
            );
            if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
                return Err(MergeError::PixelSize);
            }
            px = px.min(w);
            py = py.min(h);
        }

        let bounds = grids
            .iter()
            .filter(|g| g.len() > 0)
            .map(RasterGrid::bounds)
            .reduce(|a, b| {
                Rect::new(
                    Coord {
                        x: a.min().x.min(b.min().x),
                        y: a.min().y.min(b.min().y),
                    },
                    Coord {
                        x: a.max().x.max(b.max().x),
                        y: a.max().y.max(b.max().y),
                    },
                )
            })
            .ok_or(MergeError::EmptyFootprint)?;

        let width = n_cells(bounds.width(), px);
        let height = n_cells(bounds.height(), py);
        if width == 0 || height == 0 {
            return Err(MergeError::EmptyFootprint);
        }
        let origin = Coord {
            x: bounds.min().x,
            y: bounds.max().y,
        };
        debug!(
            "merge layout; {} inputs, {width}x{height} at {px}x{py}, {crs}",
            grids.len()
        );
        Ok(Self {
            width,
            height,
            transform: GeoTransform::north_up(origin, px, py),
            crs,
        })
    }

    fn len(&self) -> usize {
        self.width * self.height
    }

    /// Calls `f(output index, sample)` for every valid source sample
    /// under every output pixel center, grid by grid in input order.
    fn visit<T, F>(&self, grids: &[RasterGrid<T>], mut f: F) -> Result<(), MergeError>
    where
        T: Sample,
        F: FnMut(usize, T),
    {
        for grid in grids {
            let inverse = grid.transform().inverse()?;
            let (cols, rows) = self.window(grid.bounds());
            for row in rows {
                for col in cols.clone() {
                    let (src_col, src_row) =
                        inverse.pixel(self.transform.pixel_center(col, row));
                    if src_col < 0 || src_row < 0 {
                        continue;
                    }
                    #[allow(clippy::cast_sign_loss)]
                    if let Some(v) = grid.value(src_col as usize, src_row as usize) {
                        f(row * self.width + col, v);
                    }
                }
            }
        }
        Ok(())
    }

    /// Output pixel ranges overlapping `rect`.
    fn window(&self, rect: Rect) -> (Range<usize>, Range<usize>) {
        let px = self.transform.dx;
        let py = -self.transform.dy;
        let (x0, y0) = (self.transform.x0, self.transform.y0);
        let cols = clamp_index(((rect.min().x - x0) / px).floor(), self.width)
            ..clamp_index(((rect.max().x - x0) / px).ceil(), self.width);
        let rows = clamp_index(((y0 - rect.max().y) / py).floor(), self.height)
            ..clamp_index(((y0 - rect.min().y) / py).ceil(), self.height);
        (cols, rows)
    }

    fn into_grid<U: Sample>(
        self,
        nodata: Option<U>,
        samples: Vec<U>,
    ) -> Result<RasterGrid<U>, geogrid::GridError> {
        RasterGrid::new(
            self.width,
            self.height,
            self.transform,
            self.crs,
            nodata,
            samples,
        )
    }
}

/// Number of whole cells of `size` needed to span `extent`, ignoring
/// floating point slop.
fn n_cells(extent: f64, size: f64) -> usize {
    let n = (extent / size - 1e-6).ceil();
    if n.is_finite() && n > 0.0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n = n as usize;
        n
    } else {
        0
    }
}

pub(crate) fn clamp_index(v: f64, max: usize) -> usize {
    if v.is_nan() || v <= 0.0 {
        0
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let v = v as usize;
        v.min(max)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{binarize, merge_first_valid, merge_floors, FLOOR, NODATA, NOT_FLOOR};
    use crate::MergeError;
    use geo::geometry::Coord;
    use geogrid::{Crs, GeoTransform, RasterGrid};

    /// A 10 m north-up test tile with its top-left corner at
    /// `(col * 10, -row * 10)` in a 3310 grid.
    pub(crate) fn tile<T: geogrid::Sample>(
        col: i32,
        row: i32,
        width: usize,
        nodata: Option<T>,
        samples: Vec<T>,
    ) -> RasterGrid<T> {
        let height = samples.len() / width;
        let origin = Coord {
            x: f64::from(col) * 10.0,
            y: f64::from(-row) * 10.0,
        };
        RasterGrid::new(
            width,
            height,
            GeoTransform::north_up(origin, 10.0, 10.0),
            Crs::CA_ALBERS,
            nodata,
            samples,
        )
        .unwrap()
    }

    #[test]
    fn test_binarize() {
        let raw = tile(0, 0, 3, Some(-1.0_f32), vec![0.0, 0.2, 7.0, -1.0, f32::NAN, -3.0]);
        let binary = binarize(&raw);
        assert_eq!(binary.nodata(), Some(NODATA));
        assert_eq!(binary.samples(), &[0, 1, 1, 255, 255, 0]);
    }

    #[test]
    fn test_binarize_idempotent() {
        let raw = tile(0, 0, 3, Some(-1.0_f32), vec![0.0, 0.2, 7.0, -1.0, f32::NAN, -3.0]);
        let once = binarize(&raw);
        let twice = binarize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_overlap_is_or() {
        // a covers cols 0..3, b covers cols 2..5 of the same row.
        let a = tile(0, 0, 3, Some(255_u8), vec![1, 0, 0]);
        let b = tile(2, 0, 3, Some(255_u8), vec![1, 0, 1]);
        let merged = merge_floors(&[a, b]).unwrap();
        assert_eq!(merged.width(), 5);
        assert_eq!(merged.height(), 1);
        assert_eq!(merged.samples(), &[1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_gap_is_nodata() {
        let a = tile(0, 0, 1, None, vec![1.0_f32]);
        let b = tile(2, 0, 1, None, vec![0.0_f32]);
        let merged = merge_floors(&[a, b]).unwrap();
        assert_eq!(merged.samples(), &[FLOOR, NODATA, NOT_FLOOR]);
    }

    #[test]
    fn test_source_nodata_does_not_mask_other_sources() {
        let a = tile(0, 0, 2, Some(-9999.0_f32), vec![-9999.0, 0.0]);
        let b = tile(0, 0, 2, Some(-9999.0_f32), vec![1.0, -9999.0]);
        let merged = merge_floors(&[a, b]).unwrap();
        assert_eq!(merged.samples(), &[1, 0]);
    }

    #[test]
    fn test_merge_commutative_and_associative() {
        let a = tile(0, 0, 3, Some(255_u8), vec![1, 0, 0, 0, 1, 0]);
        let b = tile(1, 1, 3, Some(255_u8), vec![0, 0, 1, 1, 255, 0]);
        let c = tile(2, 0, 2, Some(255_u8), vec![0, 1, 0, 0]);

        let abc = merge_floors(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let cba = merge_floors(&[c.clone(), b.clone(), a.clone()]).unwrap();
        let bca = merge_floors(&[b.clone(), c.clone(), a.clone()]).unwrap();
        assert_eq!(abc, cba);
        assert_eq!(abc, bca);

        let ab = merge_floors(&[a.clone(), b.clone()]).unwrap();
        let ab_c = merge_floors(&[ab, c.clone()]).unwrap();
        assert_eq!(ab_c, abc);

        let bc = merge_floors(&[b, c]).unwrap();
        let a_bc = merge_floors(&[a, bc]).unwrap();
        assert_eq!(a_bc, abc);
    }

    #[test]
    fn test_coarser_source_is_resampled() {
        let fine = tile(0, 0, 2, Some(255_u8), vec![0, 0, 0, 0]);
        let coarse = RasterGrid::new(
            1,
            1,
            GeoTransform::north_up(Coord { x: 0.0, y: 0.0 }, 20.0, 20.0),
            Crs::CA_ALBERS,
            None,
            vec![3.0_f32],
        )
        .unwrap();
        let fine = binarize(&fine);
        let coarse = binarize(&coarse);
        let merged = merge_floors(&[fine, coarse]).unwrap();
        assert_eq!(merged.width(), 2);
        assert_eq!(merged.samples(), &[1, 1, 1, 1]);
    }

    #[test]
    fn test_mixed_resolution_merge_is_order_independent() {
        let fine = tile(0, 0, 2, Some(255_u8), vec![1, 0, 0, 0]);
        let coarse = RasterGrid::new(
            1,
            1,
            GeoTransform::north_up(Coord { x: 0.0, y: 0.0 }, 20.0, 20.0),
            Crs::CA_ALBERS,
            Some(255_u8),
            vec![0],
        )
        .unwrap();
        let fine_first = merge_floors(&[fine.clone(), coarse.clone()]).unwrap();
        let coarse_first = merge_floors(&[coarse, fine]).unwrap();
        assert_eq!(coarse_first.width(), 2);
        assert_eq!(coarse_first.height(), 2);
        assert_eq!(fine_first.samples(), &[1, 0, 0, 0]);
        assert_eq!(coarse_first.samples(), fine_first.samples());
        assert_eq!(coarse_first.transform(), fine_first.transform());
    }

    #[test]
    fn test_merge_errors() {
        assert!(matches!(
            merge_floors::<u8>(&[]),
            Err(MergeError::Empty)
        ));
        let a = tile(0, 0, 1, None, vec![1_u8]);
        let b = RasterGrid::new(
            1,
            1,
            *a.transform(),
            Crs::WGS84,
            None,
            vec![1_u8],
        )
        .unwrap();
        assert!(matches!(
            merge_floors(&[a, b]),
            Err(MergeError::CrsMismatch { .. })
        ));
        let empty = tile::<u8>(0, 0, 1, None, vec![]);
        assert!(matches!(
            merge_floors(&[empty]),
            Err(MergeError::EmptyFootprint)
        ));
    }

    #[test]
    fn test_first_valid_wins() {
        let a = tile(0, 0, 2, Some(-9999.0_f32), vec![10.0, -9999.0]);
        let b = tile(1, 0, 2, Some(-9999.0_f32), vec![20.0, 30.0]);
        let merged = merge_first_valid(&[a, b], -9999.0).unwrap();
        assert_eq!(merged.samples(), &[10.0, 20.0, 30.0]);
        assert_eq!(merged.nodata(), Some(-9999.0));
    }
}
