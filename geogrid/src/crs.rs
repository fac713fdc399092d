//! EPSG coordinate reference systems and point reprojection.

use crate::GridError;
use geo::geometry::Coord;
use proj4rs::{proj::Proj, transform::transform};
use std::{fmt, str::FromStr};

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Crs(u32);

impl Crs {
    /// WGS 84 longitude/latitude.
    pub const WGS84: Self = Self(4326);

    /// NAD83 longitude/latitude.
    pub const NAD83: Self = Self(4269);

    /// NAD83 / California Albers, meters.
    pub const CA_ALBERS: Self = Self(3310);

    /// NAD83 / Conus Albers, meters.
    pub const CONUS_ALBERS: Self = Self(5070);

    pub const fn from_epsg(code: u32) -> Self {
        Self(code)
    }

    pub const fn epsg(self) -> u32 {
        self.0
    }

    /// Returns true if coordinates in this CRS are degrees.
    pub fn is_geographic(self) -> bool {
        matches!(self.0, 4326 | 4269)
    }

    /// Returns the proj string for this CRS, if we know it.
    pub fn proj_string(self) -> Option<&'static str> {
        let def = match self.0 {
            4326 => "+proj=longlat +datum=WGS84 +no_defs",
            4269 => "+proj=longlat +datum=NAD83 +no_defs",
            3310 => "+proj=aea +lat_0=0 +lon_0=-120 +lat_1=34 +lat_2=40.5 +x_0=0 +y_0=-4000000 +datum=NAD83 +units=m +no_defs",
            5070 => "+proj=aea +lat_0=23 +lon_0=-96 +lat_1=29.5 +lat_2=45.5 +x_0=0 +y_0=0 +datum=NAD83 +units=m +no_defs",
            3857 => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs",
            26910 => "+proj=utm +zone=10 +datum=NAD83 +units=m +no_defs",
            26911 => "+proj=utm +zone=11 +datum=NAD83 +units=m +no_defs",
            32610 => "+proj=utm +zone=10 +datum=WGS84 +units=m +no_defs",
            32611 => "+proj=utm +zone=11 +datum=WGS84 +units=m +no_defs",
            _ => return None,
        };
        Some(def)
    }

    /// OGC URN, as written into GeoJSON `crs` members.
    pub fn urn(self) -> String {
        format!("urn:ogc:def:crs:EPSG::{}", self.0)
    }

    fn proj(self) -> Result<Proj, GridError> {
        let def = self.proj_string().ok_or(GridError::UnsupportedCrs(self.0))?;
        Proj::from_proj_string(def).map_err(|e| GridError::Projection {
            from: self,
            to: self,
            reason: format!("{e:?}"),
        })
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for Crs {
    type Err = GridError;

    /// Parses `EPSG:3310`, `3310`, or an OGC URN/CRS84 name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.ends_with("CRS84") {
            return Ok(Self::WGS84);
        }
        let code = s
            .rsplit(':')
            .next()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| GridError::InvalidCrs(s.to_owned()))?;
        code.parse::<u32>()
            .map(Self)
            .map_err(|_| GridError::InvalidCrs(s.to_owned()))
    }
}

/// Transforms coordinates from one CRS to another.
///
/// Same-CRS reprojection is the identity and never touches proj.
pub struct Reprojector {
    from: Crs,
    to: Crs,
    projs: Option<(Proj, Proj)>,
}

impl Reprojector {
    pub fn new(from: Crs, to: Crs) -> Result<Self, GridError> {
        let projs = if from == to {
            None
        } else {
            Some((from.proj()?, to.proj()?))
        };
        Ok(Self { from, to, projs })
    }

    pub fn is_identity(&self) -> bool {
        self.projs.is_none()
    }

    pub fn transform(&self, coord: Coord) -> Result<Coord, GridError> {
        let Some((src, dst)) = &self.projs else {
            return Ok(coord);
        };
        let mut point = if self.from.is_geographic() {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        transform(src, dst, &mut point).map_err(|e| GridError::Projection {
            from: self.from,
            to: self.to,
            reason: format!("{e:?}"),
        })?;
        let out = if self.to.is_geographic() {
            Coord {
                x: point.0.to_degrees(),
                y: point.1.to_degrees(),
            }
        } else {
            Coord {
                x: point.0,
                y: point.1,
            }
        };
        Ok(out)
    }
}
