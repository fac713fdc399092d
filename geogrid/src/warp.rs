//! Resampling grids into another CRS.

use crate::{Crs, GeoTransform, GridError, RasterGrid, Reprojector, Sample};
use geo::geometry::{Coord, Rect};
use log::debug;
use num_traits::NumCast;

/// Points projected along each footprint edge when computing the
/// target extent.
const EDGE_SAMPLES: usize = 32;

/// Reprojects `grid` onto a north-up grid in `target` with square
/// pixels of `resolution` target units, sampling bilinearly.
///
/// Output pixels whose center maps outside the source footprint, or
/// whose four source neighbors are all nodata, are nodata. Nodata
/// neighbors are left out of the weighted mean. A grid already in
/// `target` is returned as is.
pub fn warp_bilinear<T: Sample>(
    grid: &RasterGrid<T>,
    target: Crs,
    resolution: f64,
) -> Result<RasterGrid<T>, GridError> {
    let fill = grid.nodata().ok_or(GridError::NoNodata)?;
    if !(resolution.is_finite() && resolution > 0.0) {
        return Err(GridError::Resolution(resolution));
    }
    if grid.crs() == target {
        return Ok(grid.clone());
    }

    let bounds = projected_bounds(grid, &Reprojector::new(grid.crs(), target)?)?;
    let width = cells(bounds.width(), resolution);
    let height = cells(bounds.height(), resolution);
    let transform = GeoTransform::north_up(
        Coord {
            x: bounds.min().x,
            y: bounds.max().y,
        },
        resolution,
        resolution,
    );

    let back = Reprojector::new(target, grid.crs())?;
    let inverse = grid.transform().inverse()?;
    let mut samples = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let value = back
                .transform(transform.pixel_center(col, row))
                .ok()
                .and_then(|src| bilinear(grid, inverse.apply(src)))
                .and_then(<T as NumCast>::from)
                .unwrap_or(fill);
            samples.push(value);
        }
    }
    debug!(
        "warped {}x{} {} grid to {width}x{height} {target} at {resolution}",
        grid.width(),
        grid.height(),
        grid.crs()
    );
    RasterGrid::new(width, height, transform, target, Some(fill), samples)
}

/// Extent of the grid footprint once projected.
fn projected_bounds<T: Sample>(
    grid: &RasterGrid<T>,
    reprojector: &Reprojector,
) -> Result<Rect, GridError> {
    #[allow(clippy::cast_precision_loss)]
    let (w, h, n) = (grid.width() as f64, grid.height() as f64, EDGE_SAMPLES as f64);
    let mut min = Coord {
        x: f64::INFINITY,
        y: f64::INFINITY,
    };
    let mut max = Coord {
        x: f64::NEG_INFINITY,
        y: f64::NEG_INFINITY,
    };
    for i in 0..=EDGE_SAMPLES {
        #[allow(clippy::cast_precision_loss)]
        let t = i as f64 / n;
        for (col, row) in [(t * w, 0.0), (t * w, h), (0.0, t * h), (w, t * h)] {
            let c = reprojector.transform(grid.transform().apply(col, row))?;
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }
    }
    Ok(Rect::new(min, max))
}

fn cells(extent: f64, size: f64) -> usize {
    let n = (extent / size - 1e-6).ceil();
    if n.is_finite() && n > 1.0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n = n as usize;
        n
    } else {
        1
    }
}

/// Bilinear mean of the valid pixel centers around fractional pixel
/// position `(col, row)`.
fn bilinear<T: Sample>(grid: &RasterGrid<T>, (col, row): (f64, f64)) -> Option<f64> {
    #[allow(clippy::cast_precision_loss)]
    let (w, h) = (grid.width() as f64, grid.height() as f64);
    if !(col >= 0.0 && row >= 0.0 && col < w && row < h) {
        return None;
    }
    let (x, y) = (col - 0.5, row - 0.5);
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let neighbors = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1.0, y0, fx * (1.0 - fy)),
        (x0, y0 + 1.0, (1.0 - fx) * fy),
        (x0 + 1.0, y0 + 1.0, fx * fy),
    ];
    let (mut sum, mut total) = (0.0, 0.0);
    for (c, r, k) in neighbors {
        if k == 0.0 || c < 0.0 || r < 0.0 {
            continue;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = grid.value(c as usize, r as usize);
        if let Some(v) = value {
            sum += k * v.as_f64();
            total += k;
        }
    }
    (total > 0.0).then(|| sum / total)
}

#[cfg(test)]
mod tests {
    use super::{bilinear, warp_bilinear};
    use crate::{Crs, GeoTransform, GridError, RasterGrid, Reprojector};
    use approx::assert_relative_eq;
    use geo::geometry::Coord;

    fn row(samples: Vec<f32>) -> RasterGrid<f32> {
        RasterGrid::new(
            samples.len(),
            1,
            GeoTransform::north_up(Coord { x: 0.0, y: 0.0 }, 1.0, 1.0),
            Crs::CA_ALBERS,
            Some(-9999.0),
            samples,
        )
        .unwrap()
    }

    #[test]
    fn test_bilinear_weights() {
        let grid = row(vec![0.0, 10.0]);
        assert_relative_eq!(bilinear(&grid, (1.0, 0.5)).unwrap(), 5.0);
        assert_relative_eq!(bilinear(&grid, (1.25, 0.5)).unwrap(), 7.5);
        // Half a pixel from the edge only the edge center contributes.
        assert_relative_eq!(bilinear(&grid, (0.2, 0.5)).unwrap(), 0.0);
        assert_eq!(bilinear(&grid, (2.0, 0.5)), None);
        assert_eq!(bilinear(&grid, (-0.1, 0.5)), None);
    }

    #[test]
    fn test_bilinear_skips_nodata() {
        let grid = row(vec![4.0, -9999.0]);
        assert_relative_eq!(bilinear(&grid, (1.25, 0.5)).unwrap(), 4.0);
        let grid = row(vec![-9999.0, -9999.0]);
        assert_eq!(bilinear(&grid, (1.0, 0.5)), None);
    }

    #[test]
    fn test_geographic_to_albers() {
        let dem = RasterGrid::filled(
            20,
            20,
            GeoTransform::north_up(Coord { x: -120.1, y: 37.1 }, 0.01, 0.01),
            Crs::WGS84,
            Some(-9999.0_f32),
            1500.0,
        );
        let warped = warp_bilinear(&dem, Crs::CA_ALBERS, 100.0).unwrap();
        assert_eq!(warped.crs(), Crs::CA_ALBERS);
        assert_eq!(warped.nodata(), Some(-9999.0));
        assert_relative_eq!(warped.transform().pixel_width(), 100.0);

        let to_albers = Reprojector::new(Crs::WGS84, Crs::CA_ALBERS).unwrap();
        let center = to_albers.transform(Coord { x: -120.0, y: 37.0 }).unwrap();
        assert_eq!(warped.value_at(center).unwrap(), Some(1500.0));
        assert!(warped
            .samples()
            .iter()
            .all(|v| *v == -9999.0 || *v == 1500.0));
    }

    #[test]
    fn test_same_crs_and_errors() {
        let grid = row(vec![1.0, 2.0]);
        assert_eq!(warp_bilinear(&grid, Crs::CA_ALBERS, 30.0).unwrap(), grid);
        assert!(matches!(
            warp_bilinear(&grid, Crs::WGS84, 0.0),
            Err(GridError::Resolution(_))
        ));
        let no_nodata = grid.with_samples(None, vec![1.0_f32, 2.0]).unwrap();
        assert!(matches!(
            warp_bilinear(&no_nodata, Crs::WGS84, 0.001),
            Err(GridError::NoNodata)
        ));
    }
}
