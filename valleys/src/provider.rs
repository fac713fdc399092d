//! Seams to the outside world: remote geometry/elevation services and
//! the valley floor delineation engine.

use crate::WatershedId;
use geo::geometry::{LineString, MultiPolygon, Rect};
use geogrid::{Crs, PolygonSet, RasterGrid};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The service could not satisfy the request, e.g. it timed out
    /// or the response was too large. Retrying with a smaller request
    /// may succeed.
    #[error("provider failure, {0}")]
    Failure(String),

    /// The request itself is malformed; retrying won't help.
    #[error("invalid provider request, {0}")]
    InvalidInput(String),
}

/// Area an elevation request covers.
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    Polygon(MultiPolygon),
    Bounds(Rect),
}

/// A watershed boundary and the jurisdictions it touches.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub polygons: PolygonSet,
    /// Jurisdiction codes, e.g. `["CA", "MX"]`.
    pub states: Vec<String>,
}

impl Boundary {
    /// Returns true if any listed jurisdiction is in Mexico.
    pub fn touches_mexico(&self) -> bool {
        self.states.iter().any(|s| s.contains("MX"))
    }
}

/// NHD feature type of a flowline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    StreamRiver,
    ArtificialPath,
    Connector,
    CanalDitch,
    Pipeline,
    Coastline,
    Other(u16),
}

impl FlowType {
    /// Maps an NHD `FType` code.
    pub fn from_code(code: u16) -> Self {
        match code {
            460 => Self::StreamRiver,
            558 => Self::ArtificialPath,
            334 => Self::Connector,
            336 => Self::CanalDitch,
            428 => Self::Pipeline,
            566 => Self::Coastline,
            other => Self::Other(other),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::StreamRiver => "StreamRiver",
            Self::ArtificialPath => "ArtificialPath",
            Self::Connector => "Connector",
            Self::CanalDitch => "CanalDitch",
            Self::Pipeline => "Pipeline",
            Self::Coastline => "Coastline",
            Self::Other(_) => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flowline {
    pub geometry: LineString,
    pub ftype: FlowType,
    /// True for the first segment of a headwater stream.
    pub start_flag: bool,
    pub length_km: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowNetwork {
    pub crs: Crs,
    pub flowlines: Vec<Flowline>,
}

/// Remote hydrography and elevation services.
pub trait GeometryProvider: Sync {
    /// Returns the boundary of `unit`.
    fn fetch_boundary(&self, unit: &WatershedId) -> Result<Boundary, ProviderError>;

    /// Returns the flowlines within `area`.
    fn fetch_flow_network(&self, area: &PolygonSet) -> Result<FlowNetwork, ProviderError>;

    /// Returns elevation covering `region`, given in `crs`, sampled at
    /// roughly `resolution` meters.
    fn fetch_elevation(
        &self,
        region: &Region,
        resolution: f64,
        crs: Crs,
    ) -> Result<RasterGrid<f32>, ProviderError>;
}

/// External valley floor delineation.
pub trait ValleyFloorEngine: Sync {
    /// Delineates valley floors from a DEM and filtered flowlines.
    ///
    /// `config` is the engine's own parameter file and `work_dir` a
    /// scratch directory for intermediate products.
    fn compute(
        &self,
        dem: &Path,
        flowlines: &Path,
        config: &Path,
        work_dir: &Path,
    ) -> Result<PolygonSet, ProviderError>;
}
