use crate::{crs::Reprojector, Crs, GridError};
use geo::{
    geometry::{Coord, Geometry, MultiPolygon, Polygon, Rect},
    BooleanOps, BoundingRect, MapCoords,
};
use std::collections::BTreeMap;

/// String attributes attached to a shape.
pub type Properties = BTreeMap<String, String>;

/// A polygonal geometry: one polygon or several.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Single(Polygon),
    Multi(MultiPolygon),
}

impl Shape {
    /// Iterates the polygons making up this shape.
    pub fn parts(&self) -> std::slice::Iter<'_, Polygon> {
        match self {
            Self::Single(polygon) => std::slice::from_ref(polygon).iter(),
            Self::Multi(multi) => multi.0.iter(),
        }
    }

    pub fn to_multi_polygon(&self) -> MultiPolygon {
        MultiPolygon::new(self.parts().cloned().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.parts().all(|p| p.exterior().0.is_empty())
    }

    fn try_map(&self, reprojector: &Reprojector) -> Result<Self, GridError> {
        let f = |c: Coord| reprojector.transform(c);
        Ok(match self {
            Self::Single(polygon) => Self::Single(polygon.try_map_coords(f)?),
            Self::Multi(multi) => Self::Multi(multi.try_map_coords(f)?),
        })
    }
}

impl From<Polygon> for Shape {
    fn from(polygon: Polygon) -> Self {
        Self::Single(polygon)
    }
}

impl From<MultiPolygon> for Shape {
    fn from(multi: MultiPolygon) -> Self {
        Self::Multi(multi)
    }
}

impl TryFrom<Geometry> for Shape {
    type Error = GridError;

    fn try_from(geometry: Geometry) -> Result<Self, Self::Error> {
        match geometry {
            Geometry::Polygon(polygon) => Ok(Self::Single(polygon)),
            Geometry::MultiPolygon(multi) => Ok(Self::Multi(multi)),
            Geometry::Rect(rect) => Ok(Self::Single(rect.to_polygon())),
            other => Err(GridError::NotPolygonal(format!("{other:?}"))),
        }
    }
}

/// An ordered collection of shapes in one CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonSet {
    crs: Crs,
    shapes: Vec<Shape>,
    properties: Vec<Properties>,
}

impl PolygonSet {
    pub fn new(crs: Crs) -> Self {
        Self {
            crs,
            shapes: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn from_shapes<I, S>(crs: Crs, shapes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Shape>,
    {
        let mut set = Self::new(crs);
        for shape in shapes {
            set.push(shape, Properties::new());
        }
        set
    }

    pub fn push(&mut self, shape: impl Into<Shape>, properties: Properties) {
        self.shapes.push(shape.into());
        self.properties.push(properties);
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Shape, &Properties)> + '_ {
        self.shapes.iter().zip(self.properties.iter())
    }

    /// Iterates every polygon of every shape.
    pub fn parts(&self) -> impl Iterator<Item = &Polygon> + '_ {
        self.shapes.iter().flat_map(Shape::parts)
    }

    /// Returns the members whose properties satisfy `pred`.
    pub fn filter<F>(&self, pred: F) -> Self
    where
        F: Fn(&Properties) -> bool,
    {
        let mut out = Self::new(self.crs);
        for (shape, props) in self.iter().filter(|(_, props)| pred(props)) {
            out.push(shape.clone(), props.clone());
        }
        out
    }

    /// Appends `other`, which must already be in this set's CRS.
    pub fn extend(&mut self, other: Self) -> Result<(), GridError> {
        if other.crs != self.crs {
            return Err(GridError::Projection {
                from: other.crs,
                to: self.crs,
                reason: "polygon sets must be reprojected before combining".to_owned(),
            });
        }
        self.shapes.extend(other.shapes);
        self.properties.extend(other.properties);
        Ok(())
    }

    /// Flattens all parts into one multi-polygon, without dissolving.
    pub fn to_multi_polygon(&self) -> MultiPolygon {
        MultiPolygon::new(self.parts().cloned().collect())
    }

    /// Dissolves all parts into one multi-polygon.
    pub fn union(&self) -> MultiPolygon {
        self.parts().fold(MultiPolygon::new(vec![]), |acc, part| {
            acc.union(&MultiPolygon::new(vec![part.clone()]))
        })
    }

    pub fn bounding_rect(&self) -> Option<Rect> {
        self.to_multi_polygon().bounding_rect()
    }

    /// Returns a copy of this set in `target` CRS.
    pub fn reproject(&self, target: Crs) -> Result<Self, GridError> {
        let reprojector = Reprojector::new(self.crs, target)?;
        if reprojector.is_identity() {
            return Ok(self.clone());
        }
        let shapes = self
            .shapes
            .iter()
            .map(|shape| shape.try_map(&reprojector))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            crs: target,
            shapes,
            properties: self.properties.clone(),
        })
    }
}
