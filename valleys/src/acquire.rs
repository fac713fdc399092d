//! Elevation acquisition that falls back to smaller requests when the
//! provider can't serve a whole region at once.

use crate::{
    clip::{clip_to_mask, crop_to_bounds, TouchRule},
    merge::merge_first_valid,
    provider::{GeometryProvider, Region},
    AcquireError, ProviderError,
};
use geo::{
    geometry::{Coord, MultiPolygon, Rect},
    BoundingRect, MapCoords,
};
use geogrid::{Crs, PolygonSet, RasterGrid, Reprojector};
use log::{debug, info, warn};
use std::fmt;

/// Nodata of stitched elevation grids.
pub const DEM_NODATA: f32 = -9999.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionConfig {
    /// Requested sample spacing in meters.
    pub resolution: f64,
    /// CRS regions are sent to the provider in.
    pub request_crs: Crs,
    /// How many times a failing request may be split into quadrants.
    /// Zero disables the fallback.
    pub max_depth: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            resolution: 10.0,
            request_crs: Crs::WGS84,
            max_depth: 1,
        }
    }
}

/// One quarter of a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    SouthWest,
    SouthEast,
    NorthWest,
    NorthEast,
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SouthWest => "SW",
            Self::SouthEast => "SE",
            Self::NorthWest => "NW",
            Self::NorthEast => "NE",
        };
        f.write_str(name)
    }
}

/// Splits `rect` at its midpoints, in SW, SE, NW, NE order.
pub fn quadrants(rect: Rect) -> [(Quadrant, Rect); 4] {
    let (min, max, mid) = (rect.min(), rect.max(), rect.center());
    let mk = |x0: f64, y0: f64, x1: f64, y1: f64| Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 });
    [
        (Quadrant::SouthWest, mk(min.x, min.y, mid.x, mid.y)),
        (Quadrant::SouthEast, mk(mid.x, min.y, max.x, mid.y)),
        (Quadrant::NorthWest, mk(min.x, mid.y, mid.x, max.y)),
        (Quadrant::NorthEast, mk(mid.x, mid.y, max.x, max.y)),
    ]
}

/// Fetches elevation for a polygon, first in one request and, if the
/// provider fails, as four quadrant requests stitched back together.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveAcquisition {
    config: AcquisitionConfig,
}

impl AdaptiveAcquisition {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Returns elevation covering `area`, which is given in `crs`.
    ///
    /// Only [`ProviderError::Failure`] triggers the quadrant fallback.
    /// A quadrant that still fails at the depth limit fails the whole
    /// acquisition.
    pub fn acquire<P>(
        &self,
        provider: &P,
        area: &MultiPolygon,
        crs: Crs,
    ) -> Result<RasterGrid<f32>, AcquireError>
    where
        P: GeometryProvider + ?Sized,
    {
        let request_crs = self.config.request_crs;
        let area = if crs == request_crs {
            area.clone()
        } else {
            let reprojector = Reprojector::new(crs, request_crs)?;
            area.try_map_coords(|c| reprojector.transform(c))?
        };
        let bounds = area
            .bounding_rect()
            .filter(|r| r.width() > 0.0 && r.height() > 0.0)
            .ok_or(AcquireError::EmptyRegion)?;

        let region = Region::Polygon(area.clone());
        match provider.fetch_elevation(&region, self.config.resolution, request_crs) {
            Ok(grid) => {
                debug!("direct fetch of {bounds:?} succeeded");
                Ok(grid)
            }
            Err(ProviderError::Failure(reason)) if self.config.max_depth > 0 => {
                warn!("direct fetch failed, {reason}; retrying as quadrants");
                let mosaic = self.fetch_quadrants(provider, bounds, 1)?;
                let cropped = crop_to_bounds(&mosaic, bounds)?;
                let footprint = PolygonSet::from_shapes(request_crs, [area]);
                let clipped = clip_to_mask(&cropped, &footprint, TouchRule::Centers)?;
                info!(
                    "stitched {}x{} elevation grid from quadrants",
                    clipped.width(),
                    clipped.height()
                );
                Ok(clipped)
            }
            Err(e) => Err(AcquireError::Direct(e)),
        }
    }

    fn fetch_quadrants<P>(
        &self,
        provider: &P,
        rect: Rect,
        depth: u32,
    ) -> Result<RasterGrid<f32>, AcquireError>
    where
        P: GeometryProvider + ?Sized,
    {
        let mut tiles = Vec::with_capacity(4);
        for (quadrant, bounds) in quadrants(rect) {
            debug!("fetching {quadrant} quadrant {bounds:?} at depth {depth}");
            let region = Region::Bounds(bounds);
            match provider.fetch_elevation(&region, self.config.resolution, self.config.request_crs) {
                Ok(grid) => tiles.push(grid),
                Err(ProviderError::Failure(reason)) if depth < self.config.max_depth => {
                    warn!("{quadrant} quadrant failed, {reason}; splitting further");
                    tiles.push(self.fetch_quadrants(provider, bounds, depth + 1)?);
                }
                Err(source) => return Err(AcquireError::Quadrant { quadrant, source }),
            }
        }
        Ok(merge_first_valid(&tiles, DEM_NODATA)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{quadrants, AcquisitionConfig, AdaptiveAcquisition, Quadrant, DEM_NODATA};
    use approx::assert_abs_diff_eq;
    use crate::{
        mask::tests::rect,
        provider::{Boundary, FlowNetwork, GeometryProvider, Region},
        AcquireError, ProviderError, WatershedId,
    };
    use geo::{
        geometry::{Coord, MultiPolygon, Rect},
        polygon,
    };
    use geogrid::{Crs, GeoTransform, PolygonSet, RasterGrid};
    use std::sync::Mutex;

    /// Serves flat elevation for boxes no wider than `max_span`
    /// degrees and fails everything else. Records every request.
    pub(crate) struct MockProvider {
        pub(crate) max_span: f64,
        pub(crate) invalid: bool,
        pub(crate) requests: Mutex<Vec<Region>>,
    }

    impl MockProvider {
        pub(crate) fn new(max_span: f64) -> Self {
            Self {
                max_span,
                invalid: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn requests(&self) -> Vec<Region> {
            self.requests.lock().unwrap().clone()
        }

        fn flat(rect: Rect, elevation: f32) -> RasterGrid<f32> {
            let step = 0.25;
            let width = (rect.width() / step).round() as usize;
            let height = (rect.height() / step).round() as usize;
            RasterGrid::filled(
                width,
                height,
                GeoTransform::north_up(
                    Coord {
                        x: rect.min().x,
                        y: rect.max().y,
                    },
                    step,
                    step,
                ),
                Crs::WGS84,
                Some(-1.0),
                elevation,
            )
        }
    }

    impl GeometryProvider for MockProvider {
        fn fetch_boundary(&self, _unit: &WatershedId) -> Result<Boundary, ProviderError> {
            Err(ProviderError::Failure("no boundaries here".to_owned()))
        }

        fn fetch_flow_network(&self, _area: &PolygonSet) -> Result<FlowNetwork, ProviderError> {
            Err(ProviderError::Failure("no flowlines here".to_owned()))
        }

        fn fetch_elevation(
            &self,
            region: &Region,
            _resolution: f64,
            crs: Crs,
        ) -> Result<RasterGrid<f32>, ProviderError> {
            assert_eq!(crs, Crs::WGS84);
            self.requests.lock().unwrap().push(region.clone());
            if self.invalid {
                return Err(ProviderError::InvalidInput("bad region".to_owned()));
            }
            match region {
                Region::Polygon(_) => Err(ProviderError::Failure("too large".to_owned())),
                Region::Bounds(r) if r.width() > self.max_span => {
                    Err(ProviderError::Failure("too large".to_owned()))
                }
                Region::Bounds(r) => Ok(Self::flat(*r, (r.min().x + 200.0) as f32)),
            }
        }
    }

    fn two_degree_box() -> MultiPolygon {
        MultiPolygon::new(vec![rect(-120.0, 36.0, -118.0, 38.0)])
    }

    #[test]
    fn test_quadrant_split() {
        let r = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 2.0 });
        let q = quadrants(r);
        assert_eq!(q[0].0, Quadrant::SouthWest);
        assert_eq!(q[0].1, Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }));
        assert_eq!(q[3].0, Quadrant::NorthEast);
        assert_eq!(q[3].1, Rect::new(Coord { x: 1.0, y: 1.0 }, Coord { x: 2.0, y: 2.0 }));
        assert_eq!(q[1].0.to_string(), "SE");
    }

    #[test]
    fn test_failure_falls_back_to_four_quadrants() {
        let provider = MockProvider::new(1.0);
        let dem = AdaptiveAcquisition::default()
            .acquire(&provider, &two_degree_box(), Crs::WGS84)
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 5);
        assert!(matches!(requests[0], Region::Polygon(_)));
        for region in &requests[1..] {
            let Region::Bounds(r) = region else {
                panic!("expected a box request, got {region:?}");
            };
            assert_abs_diff_eq!(r.width(), 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(r.height(), 1.0, epsilon = 1e-12);
        }

        assert_eq!((dem.width(), dem.height()), (8, 8));
        assert_eq!(dem.nodata(), Some(DEM_NODATA));
        // West half came from the SW/NW quadrants, east half from SE/NE.
        assert_eq!(dem.get(0, 0), Some(80.0));
        assert_eq!(dem.get(7, 7), Some(81.0));
        assert_eq!(dem.count(DEM_NODATA), 0);
    }

    #[test]
    fn test_quadrant_result_clipped_to_polygon() {
        let provider = MockProvider::new(1.0);
        let triangle = MultiPolygon::new(vec![polygon![
            (x: -120.0, y: 36.0),
            (x: -118.0, y: 36.0),
            (x: -120.0, y: 38.0),
            (x: -120.0, y: 36.0),
        ]]);
        let dem = AdaptiveAcquisition::default()
            .acquire(&provider, &triangle, Crs::WGS84)
            .unwrap();
        assert_eq!(provider.requests().len(), 5);
        // South-west corner is inside, north-east corner outside.
        assert_eq!(dem.value(0, 7), Some(80.0));
        assert_eq!(dem.value(7, 0), None);
        assert!(dem.count(DEM_NODATA) > 0);
    }

    #[test]
    fn test_invalid_input_is_not_retried() {
        let mut provider = MockProvider::new(1.0);
        provider.invalid = true;
        let result = AdaptiveAcquisition::default().acquire(&provider, &two_degree_box(), Crs::WGS84);
        assert!(matches!(
            result,
            Err(AcquireError::Direct(ProviderError::InvalidInput(_)))
        ));
        assert_eq!(provider.requests().len(), 1);
    }

    #[test]
    fn test_quadrant_failure_is_fatal_at_depth_limit() {
        let provider = MockProvider::new(0.5);
        let result = AdaptiveAcquisition::default().acquire(&provider, &two_degree_box(), Crs::WGS84);
        assert!(matches!(
            result,
            Err(AcquireError::Quadrant {
                quadrant: Quadrant::SouthWest,
                ..
            })
        ));
        assert_eq!(provider.requests().len(), 2);
    }

    #[test]
    fn test_deeper_subdivision() {
        let provider = MockProvider::new(0.5);
        let acquisition = AdaptiveAcquisition::new(AcquisitionConfig {
            max_depth: 2,
            ..AcquisitionConfig::default()
        });
        let dem = acquisition
            .acquire(&provider, &two_degree_box(), Crs::WGS84)
            .unwrap();
        // 1 direct + 4 failing quadrants + 16 sub-quadrants.
        assert_eq!(provider.requests().len(), 21);
        assert_eq!((dem.width(), dem.height()), (8, 8));
        assert_eq!(dem.count(DEM_NODATA), 0);
    }

    #[test]
    fn test_no_fallback_when_disabled() {
        let provider = MockProvider::new(1.0);
        let acquisition = AdaptiveAcquisition::new(AcquisitionConfig {
            max_depth: 0,
            ..AcquisitionConfig::default()
        });
        assert!(matches!(
            acquisition.acquire(&provider, &two_degree_box(), Crs::WGS84),
            Err(AcquireError::Direct(ProviderError::Failure(_)))
        ));
        assert_eq!(provider.requests().len(), 1);
    }
}
