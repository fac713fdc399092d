//! Clipping grids to polygon masks.

use crate::{merge::clamp_index, ClipError};
use geo::geometry::{Coord, LineString, Polygon, Rect};
use geogrid::{GeoTransform, InverseTransform, PolygonSet, RasterGrid, Sample};
use log::debug;

/// Which pixels count as inside a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TouchRule {
    /// Any pixel the polygon touches, however slightly.
    #[default]
    AllTouched,

    /// Pixels whose center lies inside the polygon.
    Centers,
}

/// Sets every pixel of `grid` not covered by `mask` (under `rule`) to
/// the grid's nodata value. Covered pixels are unchanged.
pub fn clip_to_mask<T: Sample>(
    grid: &RasterGrid<T>,
    mask: &PolygonSet,
    rule: TouchRule,
) -> Result<RasterGrid<T>, ClipError> {
    if mask.crs() != grid.crs() {
        return Err(ClipError::CrsMismatch {
            mask: mask.crs(),
            grid: grid.crs(),
        });
    }
    let fill = grid.nodata().ok_or(ClipError::Nodata)?;
    let covered = burn(
        mask.parts(),
        grid.transform(),
        grid.width(),
        grid.height(),
        rule,
    )?;
    let samples: Vec<T> = grid
        .samples()
        .iter()
        .zip(&covered)
        .map(|(s, inside)| if *inside { *s } else { fill })
        .collect();
    debug!(
        "clipped {}x{} grid, {} of {} pixels covered",
        grid.width(),
        grid.height(),
        covered.iter().filter(|c| **c).count(),
        covered.len()
    );
    Ok(grid.with_samples(grid.nodata(), samples)?)
}

/// Returns the window of `grid` made of the pixels intersecting
/// `rect`.
pub fn crop_to_bounds<T: Sample>(grid: &RasterGrid<T>, rect: Rect) -> Result<RasterGrid<T>, ClipError> {
    const EPS: f64 = 1e-9;
    let transform = grid.transform();
    let inverse = transform.inverse()?;
    let corners = [
        rect.min(),
        rect.max(),
        Coord {
            x: rect.min().x,
            y: rect.max().y,
        },
        Coord {
            x: rect.max().x,
            y: rect.min().y,
        },
    ]
    .map(|c| inverse.apply(c));
    let (mut min, mut max) = (corners[0], corners[0]);
    for (col, row) in &corners[1..] {
        min = (min.0.min(*col), min.1.min(*row));
        max = (max.0.max(*col), max.1.max(*row));
    }
    let cols = clamp_index((min.0 + EPS).floor(), grid.width())
        ..clamp_index((max.0 - EPS).ceil(), grid.width());
    let rows = clamp_index((min.1 + EPS).floor(), grid.height())
        ..clamp_index((max.1 - EPS).ceil(), grid.height());
    if cols.is_empty() || rows.is_empty() {
        return Err(ClipError::Disjoint);
    }

    let mut samples = Vec::with_capacity(cols.len() * rows.len());
    for row in rows.clone() {
        let start = row * grid.width();
        samples.extend_from_slice(&grid.samples()[start + cols.start..start + cols.end]);
    }
    #[allow(clippy::cast_precision_loss)]
    let origin = transform.apply(cols.start as f64, rows.start as f64);
    let window = GeoTransform {
        x0: origin.x,
        y0: origin.y,
        ..*transform
    };
    Ok(RasterGrid::new(
        cols.len(),
        rows.len(),
        window,
        grid.crs(),
        grid.nodata(),
        samples,
    )?)
}

/// Marks the pixels of a `width` x `height` grid laid out by
/// `transform` that `polygons` cover under `rule`. Row-major.
pub fn burn<'a, I>(
    polygons: I,
    transform: &GeoTransform,
    width: usize,
    height: usize,
    rule: TouchRule,
) -> Result<Vec<bool>, ClipError>
where
    I: IntoIterator<Item = &'a Polygon>,
{
    let inverse = transform.inverse()?;
    let mut covered = vec![false; width * height];
    let mut mark = |col: usize, row: usize| covered[row * width + col] = true;
    for polygon in polygons {
        let rings: Vec<Vec<(f64, f64)>> = std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .map(|ring| to_pixel_space(ring, &inverse))
            .collect();
        fill_centers(&rings, width, height, &mut mark);
        if rule == TouchRule::AllTouched {
            for ring in &rings {
                for edge in ring.windows(2) {
                    trace_segment(edge[0], edge[1], width, height, &mut mark);
                }
            }
        }
    }
    Ok(covered)
}

fn to_pixel_space(ring: &LineString, inverse: &InverseTransform) -> Vec<(f64, f64)> {
    let mut pts: Vec<(f64, f64)> = ring.coords().map(|c| inverse.apply(*c)).collect();
    if pts.first() != pts.last() {
        if let Some(first) = pts.first().copied() {
            pts.push(first);
        }
    }
    pts
}

/// Even-odd scanline fill through pixel centers.
///
/// Each edge is bucketed into the rows whose center line it crosses, so
/// an edge is only visited for its own rows.
fn fill_centers<F>(rings: &[Vec<(f64, f64)>], width: usize, height: usize, mark: &mut F)
where
    F: FnMut(usize, usize),
{
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for (_, y) in rings.iter().flatten() {
        lo = lo.min(*y);
        hi = hi.max(*y);
    }
    let first = clamp_index((lo - 0.5).floor(), height);
    let last = clamp_index((hi + 0.5).ceil(), height);
    if first >= last {
        return;
    }

    let mut crossings: Vec<Vec<f64>> = vec![Vec::new(); last - first];
    for ring in rings {
        for edge in ring.windows(2) {
            let ((x0, y0), (x1, y1)) = (edge[0], edge[1]);
            let (bottom, top) = if y0 < y1 { (y0, y1) } else { (y1, y0) };
            // Center lines y with bottom <= y < top; horizontal edges
            // cross none.
            let rows = clamp_index((bottom - 0.5).ceil(), height).max(first)
                ..clamp_index((top - 0.5).ceil(), height).min(last);
            for row in rows {
                #[allow(clippy::cast_precision_loss)]
                let y = row as f64 + 0.5;
                crossings[row - first].push(x0 + (y - y0) * (x1 - x0) / (y1 - y0));
            }
        }
    }

    for (row, xs) in (first..last).zip(crossings.iter_mut()) {
        xs.sort_by(f64::total_cmp);
        for span in xs.chunks_exact(2) {
            let cols = clamp_index((span[0] - 0.5).ceil(), width)
                ..clamp_index((span[1] - 0.5).ceil(), width);
            for col in cols {
                mark(col, row);
            }
        }
    }
}

/// Visits every pixel the segment `a`-`b` passes through.
fn trace_segment<F>(a: (f64, f64), b: (f64, f64), width: usize, height: usize, mark: &mut F)
where
    F: FnMut(usize, usize),
{
    #[allow(clippy::cast_precision_loss)]
    let Some((a, b)) = clip_segment(a, b, width as f64, height as f64) else {
        return;
    };
    #[allow(clippy::cast_possible_truncation)]
    let cell = |v: f64| v.floor() as isize;
    let (mut col, mut row) = (cell(a.0), cell(a.1));
    let (end_col, end_row) = (cell(b.0), cell(b.1));
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let (step_col, step_row) = (if dx > 0.0 { 1 } else { -1 }, if dy > 0.0 { 1 } else { -1 });
    #[allow(clippy::cast_precision_loss)]
    let next_boundary = |pos: f64, idx: isize, d: f64| {
        if d > 0.0 {
            (idx as f64 + 1.0 - pos) / d
        } else if d < 0.0 {
            (idx as f64 - pos) / d
        } else {
            f64::INFINITY
        }
    };
    let mut t_col = next_boundary(a.0, col, dx);
    let mut t_row = next_boundary(a.1, row, dy);
    let dt_col = if dx == 0.0 { f64::INFINITY } else { dx.abs().recip() };
    let dt_row = if dy == 0.0 { f64::INFINITY } else { dy.abs().recip() };

    let steps = (end_col - col).unsigned_abs() + (end_row - row).unsigned_abs();
    for _ in 0..=steps {
        if let (Ok(c), Ok(r)) = (usize::try_from(col), usize::try_from(row)) {
            if c < width && r < height {
                mark(c, r);
            }
        }
        if col == end_col && row == end_row {
            break;
        }
        if t_col < t_row {
            col += step_col;
            t_col += dt_col;
        } else {
            row += step_row;
            t_row += dt_row;
        }
    }
}

/// Liang-Barsky clip of segment `a`-`b` to `[0, w] x [0, h]`.
fn clip_segment(a: (f64, f64), b: (f64, f64), w: f64, h: f64) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for (p, q) in [(-dx, a.0), (dx, w - a.0), (-dy, a.1), (dy, h - a.1)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some(((a.0 + t0 * dx, a.1 + t0 * dy), (a.0 + t1 * dx, a.1 + t1 * dy)))
}
