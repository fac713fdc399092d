//! Raster to polygon conversion and back.

use crate::{
    clip::{burn, TouchRule},
    merge::{FLOOR, NODATA, NOT_FLOOR},
    ClipError,
};
use geo::{
    geometry::{Coord, LineString, Point, Polygon},
    orient::Direction,
    Contains, Orient,
};
use geogrid::{GeoTransform, PolygonSet, Properties, RasterGrid, Sample};
use log::debug;
use std::{collections::HashMap, fmt, str::FromStr};

/// Property every vectorized polygon carries, set to the traced
/// pixel value.
pub const VALUE_KEY: &str = "raster_val";

/// Which neighbors make two pixels part of the same region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Edge neighbors only; diagonal pixels are separate polygons.
    #[default]
    Four,
    /// Edge and corner neighbors.
    Eight,
}

impl FromStr for Connectivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "4" => Ok(Self::Four),
            "8" => Ok(Self::Eight),
            other => Err(format!("connectivity must be 4 or 8, got {other:?}")),
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Four => f.write_str("4"),
            Self::Eight => f.write_str("8"),
        }
    }
}

/// Vertex on the pixel corner lattice, `(col, row)`.
type Vertex = (i64, i64);

/// Directed pixel boundary segment with the region on its left.
#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    dir: Vertex,
}

impl Edge {
    fn to(self) -> Vertex {
        (self.from.0 + self.dir.0, self.from.1 + self.dir.1)
    }

    /// Center of the pixel this edge borders.
    fn inside(self) -> (f64, f64) {
        let (x, y) = self.from;
        let (col, row) = match self.dir {
            (1, 0) => (x, y),
            (0, 1) => (x - 1, y),
            (-1, 0) => (x - 1, y - 1),
            _ => (x, y - 1),
        };
        #[allow(clippy::cast_precision_loss)]
        let center = (col as f64 + 0.5, row as f64 + 0.5);
        center
    }
}

/// A closed boundary in pixel space.
struct Ring {
    vertices: Vec<Vertex>,
    /// Twice the signed area; positive for outer rings.
    area2: i64,
    /// A pixel center just inside the region this ring bounds.
    probe: (f64, f64),
}

/// Traces the regions of `grid` equal to `value` into polygons in the
/// grid's CRS.
///
/// Exteriors are counter-clockwise and holes clockwise. Vertices on a
/// straight pixel edge run are dropped. Output order follows the grid's
/// row-major scan.
pub fn vectorize(grid: &RasterGrid<u8>, value: u8, connectivity: Connectivity) -> PolygonSet {
    let edges = boundary_edges(grid, value);
    let rings = trace_rings(&edges, connectivity);

    let (outers, holes): (Vec<Ring>, Vec<Ring>) = rings.into_iter().partition(|r| r.area2 > 0);
    let outer_shapes: Vec<Polygon> = outers
        .iter()
        .map(|r| Polygon::new(pixel_ring(&r.vertices), vec![]))
        .collect();

    let mut interiors: Vec<Vec<&Ring>> = outers.iter().map(|_| Vec::new()).collect();
    for hole in &holes {
        let probe = Point::new(hole.probe.0, hole.probe.1);
        let owner = outers
            .iter()
            .zip(&outer_shapes)
            .enumerate()
            .filter(|(_, (_, shape))| shape.contains(&probe))
            .min_by_key(|(_, (ring, _))| ring.area2)
            .map(|(idx, _)| idx);
        match owner {
            Some(idx) => interiors[idx].push(hole),
            None => debug!("dropping hole with no enclosing ring at {:?}", hole.probe),
        }
    }

    let transform = grid.transform();
    let mut props = Properties::new();
    props.insert(VALUE_KEY.to_owned(), value.to_string());
    let mut set = PolygonSet::new(grid.crs());
    for (outer, inner) in outers.iter().zip(interiors) {
        let polygon = Polygon::new(
            world_ring(&outer.vertices, transform),
            inner
                .iter()
                .map(|h| world_ring(&h.vertices, transform))
                .collect(),
        );
        set.push(polygon.orient(Direction::Default), props.clone());
    }
    debug!(
        "vectorized {}x{} grid into {} polygons, {} holes",
        grid.width(),
        grid.height(),
        set.len(),
        holes.len()
    );
    set
}

/// Merges every polygon of `polygons` into one multi-polygon feature
/// carrying the first feature's properties. Polygons touching at a
/// corner become one part. An empty set stays empty.
pub fn dissolve(polygons: &PolygonSet) -> PolygonSet {
    let mut out = PolygonSet::new(polygons.crs());
    if let Some((_, props)) = polygons.iter().next() {
        out.push(polygons.union(), props.clone());
    }
    debug!("dissolved {} polygons", polygons.len());
    out
}

/// Burns `polygons` onto the layout of `like` by pixel center:
/// [`FLOOR`] inside, [`NOT_FLOOR`] outside.
pub fn rasterize<T: Sample>(
    polygons: &PolygonSet,
    like: &RasterGrid<T>,
) -> Result<RasterGrid<u8>, ClipError> {
    if polygons.crs() != like.crs() {
        return Err(ClipError::CrsMismatch {
            mask: polygons.crs(),
            grid: like.crs(),
        });
    }
    let covered = burn(
        polygons.parts(),
        like.transform(),
        like.width(),
        like.height(),
        TouchRule::Centers,
    )?;
    let samples = covered
        .into_iter()
        .map(|c| if c { FLOOR } else { NOT_FLOOR })
        .collect();
    Ok(like.with_samples(Some(NODATA), samples)?)
}

/// Every pixel side separating a `value` pixel from a non-`value` one,
/// in row-major pixel order.
fn boundary_edges(grid: &RasterGrid<u8>, value: u8) -> Vec<Edge> {
    let filled = |col: i64, row: i64| {
        usize::try_from(col)
            .ok()
            .zip(usize::try_from(row).ok())
            .and_then(|(c, r)| grid.get(c, r))
            == Some(value)
    };
    let mut edges = Vec::new();
    for row in 0..grid.height() {
        for col in 0..grid.width() {
            #[allow(clippy::cast_possible_wrap)]
            let (c, r) = (col as i64, row as i64);
            if !filled(c, r) {
                continue;
            }
            if !filled(c, r - 1) {
                edges.push(Edge { from: (c, r), dir: (1, 0) });
            }
            if !filled(c + 1, r) {
                edges.push(Edge { from: (c + 1, r), dir: (0, 1) });
            }
            if !filled(c, r + 1) {
                edges.push(Edge { from: (c + 1, r + 1), dir: (-1, 0) });
            }
            if !filled(c - 1, r) {
                edges.push(Edge { from: (c, r + 1), dir: (0, -1) });
            }
        }
    }
    edges
}

fn trace_rings(edges: &[Edge], connectivity: Connectivity) -> Vec<Ring> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (idx, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_default().push(idx);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        let mut vertices = Vec::new();
        let mut current = first;
        loop {
            used[current] = true;
            let edge = edges[current];
            vertices.push(edge.from);
            let candidates: Vec<usize> = outgoing
                .get(&edge.to())
                .into_iter()
                .flatten()
                .copied()
                .filter(|&idx| !used[idx] || idx == first)
                .collect();
            let next = match candidates.as_slice() {
                [] => break,
                [only] => *only,
                many => choose_turn(edge.dir, many, edges, connectivity),
            };
            if next == first {
                break;
            }
            current = next;
        }
        let vertices = drop_collinear(vertices);
        rings.push(Ring {
            area2: shoelace2(&vertices),
            probe: edges[first].inside(),
            vertices,
        });
    }
    rings
}

/// At a vertex two regions meet diagonally: a left turn keeps the
/// regions apart, a right turn joins them.
fn choose_turn(dir: Vertex, candidates: &[usize], edges: &[Edge], connectivity: Connectivity) -> usize {
    let cross = |idx: &usize| {
        let out = edges[*idx].dir;
        dir.0 * out.1 - dir.1 * out.0
    };
    let pick = match connectivity {
        Connectivity::Four => candidates.iter().max_by_key(|idx| cross(*idx)),
        Connectivity::Eight => candidates.iter().min_by_key(|idx| cross(*idx)),
    };
    pick.copied().unwrap_or(candidates[0])
}

/// Removes vertices in the middle of a straight run.
fn drop_collinear(vertices: Vec<Vertex>) -> Vec<Vertex> {
    let n = vertices.len();
    if n < 4 {
        return vertices;
    }
    let direction = |a: Vertex, b: Vertex| ((b.0 - a.0).signum(), (b.1 - a.1).signum());
    (0..n)
        .filter(|&i| {
            let prev = vertices[(i + n - 1) % n];
            let next = vertices[(i + 1) % n];
            direction(prev, vertices[i]) != direction(vertices[i], next)
        })
        .map(|i| vertices[i])
        .collect()
}

fn shoelace2(vertices: &[Vertex]) -> i64 {
    let n = vertices.len();
    (0..n)
        .map(|i| {
            let (a, b) = (vertices[i], vertices[(i + 1) % n]);
            a.0 * b.1 - b.0 * a.1
        })
        .sum()
}

#[allow(clippy::cast_precision_loss)]
fn pixel_ring(vertices: &[Vertex]) -> LineString {
    vertices
        .iter()
        .map(|&(c, r)| Coord {
            x: c as f64,
            y: r as f64,
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn world_ring(vertices: &[Vertex], transform: &GeoTransform) -> LineString {
    vertices
        .iter()
        .map(|&(c, r)| transform.apply(c as f64, r as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{dissolve, vectorize, Connectivity, VALUE_KEY};
    use approx::assert_abs_diff_eq;
    use crate::{
        clip::{clip_to_mask, TouchRule},
        merge::tests::tile,
        vectorize::rasterize,
    };
    use geo::{Area, Winding};
    use geogrid::{PolygonSet, RasterGrid};

    fn grid(width: usize, samples: Vec<u8>) -> RasterGrid<u8> {
        tile(0, 0, width, Some(255), samples)
    }

    fn polygon_count(set: &PolygonSet) -> usize {
        set.parts().count()
    }

    #[test]
    fn test_single_block() {
        #[rustfmt::skip]
        let g = grid(4, vec![
            0, 0, 0, 0,
            0, 1, 1, 0,
            0, 1, 1, 0,
            0, 0, 0, 0,
        ]);
        let set = vectorize(&g, 1, Connectivity::Four);
        assert_eq!(polygon_count(&set), 1);
        let polygon = set.parts().next().unwrap();
        // Collinear vertices merged: 4 corners + closing vertex.
        assert_eq!(polygon.exterior().0.len(), 5);
        assert!(polygon.exterior().is_ccw());
        assert_abs_diff_eq!(polygon.unsigned_area(), 400.0, epsilon = 1e-9);
        let (_, props) = set.iter().next().unwrap();
        assert_eq!(props.get(VALUE_KEY).unwrap(), "1");
    }

    #[test]
    fn test_diagonal_pinch() {
        #[rustfmt::skip]
        let g = grid(2, vec![
            1, 0,
            0, 1,
        ]);
        let four = vectorize(&g, 1, Connectivity::Four);
        assert_eq!(polygon_count(&four), 2);
        for p in four.parts() {
            assert_abs_diff_eq!(p.unsigned_area(), 100.0, epsilon = 1e-9);
        }
        let eight = vectorize(&g, 1, Connectivity::Eight);
        assert_eq!(polygon_count(&eight), 1);
        assert_abs_diff_eq!(
            eight.parts().next().unwrap().unsigned_area(),
            200.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_hole() {
        #[rustfmt::skip]
        let g = grid(5, vec![
            1, 1, 1, 1, 1,
            1, 0, 0, 1, 1,
            1, 0, 0, 1, 1,
            1, 1, 1, 1, 1,
        ]);
        let set = vectorize(&g, 1, Connectivity::Four);
        assert_eq!(polygon_count(&set), 1);
        let polygon = set.parts().next().unwrap();
        assert_eq!(polygon.interiors().len(), 1);
        assert!(polygon.exterior().is_ccw());
        assert!(polygon.interiors()[0].is_cw());
        assert_abs_diff_eq!(polygon.unsigned_area(), 1600.0, epsilon = 1e-9);
    }

    #[test]
    fn test_island_in_hole() {
        #[rustfmt::skip]
        let g = grid(5, vec![
            1, 1, 1, 1, 1,
            1, 0, 0, 0, 1,
            1, 0, 1, 0, 1,
            1, 0, 0, 0, 1,
            1, 1, 1, 1, 1,
        ]);
        let set = vectorize(&g, 1, Connectivity::Four);
        assert_eq!(polygon_count(&set), 2);
        let with_hole: Vec<_> = set.parts().filter(|p| !p.interiors().is_empty()).collect();
        assert_eq!(with_hole.len(), 1);
        assert_abs_diff_eq!(with_hole[0].unsigned_area(), 1600.0, epsilon = 1e-9);
    }

    #[test]
    fn test_dissolve_makes_one_feature() {
        #[rustfmt::skip]
        let g = grid(5, vec![
            1, 1, 0, 0, 0,
            1, 1, 0, 0, 1,
            0, 0, 1, 0, 0,
        ]);
        let regions = vectorize(&g, 1, Connectivity::Four);
        assert_eq!(regions.len(), 3);

        let dissolved = dissolve(&regions);
        assert_eq!(dissolved.len(), 1);
        assert_eq!(dissolved.crs(), regions.crs());
        let (_, props) = dissolved.iter().next().unwrap();
        assert_eq!(props.get(VALUE_KEY).unwrap(), "1");
        let area: f64 = dissolved.parts().map(|p| p.unsigned_area()).sum();
        assert_abs_diff_eq!(area, 600.0, epsilon = 1e-6);

        assert!(dissolve(&PolygonSet::new(regions.crs())).is_empty());
    }

    #[test]
    fn test_nodata_and_zero_are_background() {
        let g = grid(3, vec![255, 1, 0]);
        let set = vectorize(&g, 1, Connectivity::Four);
        assert_eq!(polygon_count(&set), 1);
        assert!(vectorize(&grid(2, vec![0, 255]), 1, Connectivity::Four).is_empty());
    }

    #[test]
    fn test_round_trip_recovers_footprint() {
        #[rustfmt::skip]
        let g = grid(6, vec![
            1, 1, 0, 0, 1, 0,
            1, 0, 1, 0, 1, 1,
            0, 1, 1, 1, 0, 1,
            255, 1, 0, 1, 1, 1,
            1, 0, 1, 0, 0, 255,
        ]);
        for connectivity in [Connectivity::Four, Connectivity::Eight] {
            let set = vectorize(&g, 1, connectivity);
            let back = rasterize(&set, &g).unwrap();
            for (orig, burned) in g.samples().iter().zip(back.samples()) {
                assert_eq!(*orig == 1, *burned == 1);
            }
        }
    }

    #[test]
    fn test_clip_then_vectorize_round_trip() {
        #[rustfmt::skip]
        let g = grid(4, vec![
            1, 1, 1, 1,
            1, 0, 1, 1,
            1, 1, 1, 0,
            0, 1, 1, 1,
        ]);
        let mask = PolygonSet::from_shapes(
            g.crs(),
            [crate::mask::tests::rect(0.0, -40.0, 25.0, 0.0)],
        );
        let clipped = clip_to_mask(&g, &mask, TouchRule::AllTouched).unwrap();
        let set = vectorize(&clipped, 1, Connectivity::Four);
        let back = rasterize(&set, &clipped).unwrap();
        for (orig, burned) in clipped.samples().iter().zip(back.samples()) {
            assert_eq!(*orig == 1, *burned == 1);
        }
        assert_eq!(back.count(1), clipped.count(1));
    }

    #[test]
    fn test_connectivity_from_str() {
        assert_eq!("4".parse::<Connectivity>().unwrap(), Connectivity::Four);
        assert_eq!("8".parse::<Connectivity>().unwrap(), Connectivity::Eight);
        assert!("6".parse::<Connectivity>().is_err());
    }
}
