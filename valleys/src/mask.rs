//! Land and jurisdiction masks.

use crate::MaskError;
use dashmap::DashMap;
use geo::{geometry::MultiPolygon, BooleanOps, Buffer};
use geogrid::{features, Crs, PolygonSet, Properties};
use log::{debug, info};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Attribute holding the two letter state code in the US land file.
pub const STATE_KEY: &str = "STATE";

/// Attributes tried, in order, when matching a country in the North
/// America land file.
pub const COUNTRY_KEYS: [&str; 4] = ["ADM0_A3", "ISO_A3", "ADMIN", "NAME"];

/// How floor mosaics are clipped. Chosen once per run.
#[derive(Debug, Clone, PartialEq)]
pub enum MaskPolicy {
    /// Keep only what lies inside one state.
    StateBoundary { state: String },

    /// Keep what lies inside any of `jurisdictions` or inside
    /// `country`, the latter grown by `buffer` units of `working_crs`
    /// to close seams between the two sources.
    CompositeLand {
        jurisdictions: Vec<String>,
        country: String,
        buffer: f64,
        working_crs: Crs,
    },

    /// Don't clip.
    Unclipped,
}

impl MaskPolicy {
    pub fn state_boundary(state: &str) -> Self {
        Self::StateBoundary {
            state: state.to_owned(),
        }
    }

    /// Returns true if building this mask reads land files.
    pub fn needs_land(&self) -> bool {
        !matches!(self, Self::Unclipped)
    }
}

impl Default for MaskPolicy {
    fn default() -> Self {
        Self::CompositeLand {
            jurisdictions: ["CA", "OR", "NV", "AZ"].map(String::from).to_vec(),
            country: "MEX".to_owned(),
            buffer: 1000.0,
            working_crs: Crs::CA_ALBERS,
        }
    }
}

/// Paths of the two land polygon files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandFiles {
    pub north_america: PathBuf,
    pub united_states: PathBuf,
}

impl LandFiles {
    /// Returns the first of the two files that doesn't exist.
    pub fn missing(&self) -> Option<&Path> {
        [&self.north_america, &self.united_states]
            .into_iter()
            .find(|p| !p.is_file())
            .map(PathBuf::as_path)
    }

    pub fn read(&self) -> Result<Land, MaskError> {
        Ok(Land {
            north_america: features::read_polygons(&self.north_america)?,
            united_states: features::read_polygons(&self.united_states)?,
        })
    }
}

/// Land polygons, loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Land {
    /// Country polygons of North America.
    pub north_america: PolygonSet,
    /// US state polygons.
    pub united_states: PolygonSet,
}

/// Builds the mask `policy` describes, or `None` for
/// [`MaskPolicy::Unclipped`].
///
/// The result only depends on the set of matching features, not on
/// their order in the land files.
pub fn build_mask(policy: &MaskPolicy, land: &Land) -> Result<Option<PolygonSet>, MaskError> {
    let mask = match policy {
        MaskPolicy::Unclipped => return Ok(None),
        MaskPolicy::StateBoundary { state } => select(&land.united_states, &[STATE_KEY], state)?,
        MaskPolicy::CompositeLand {
            jurisdictions,
            country,
            buffer,
            working_crs,
        } => {
            if working_crs.is_geographic() {
                return Err(MaskError::Geographic(*working_crs));
            }
            let mut states = PolygonSet::new(land.united_states.crs());
            for code in jurisdictions {
                states.extend(select(&land.united_states, &[STATE_KEY], code)?)?;
            }
            let states = states.reproject(*working_crs)?;
            let country = select(&land.north_america, &COUNTRY_KEYS, country)?
                .reproject(*working_crs)?
                .union();
            let country = if *buffer > 0.0 {
                country.buffer(*buffer)
            } else {
                country
            };
            let dissolved: MultiPolygon = states.union().union(&country);
            debug!(
                "composite mask; {} jurisdictions + buffered country, {} parts",
                jurisdictions.len(),
                dissolved.0.len()
            );
            PolygonSet::from_shapes(*working_crs, [dissolved])
        }
    };
    info!("built mask with {} shapes in {}", mask.len(), mask.crs());
    Ok(Some(mask))
}

/// Members of `set` where any of `keys` equals `value`.
fn select(set: &PolygonSet, keys: &[&str], value: &str) -> Result<PolygonSet, MaskError> {
    let matches =
        |props: &Properties| keys.iter().any(|k| props.get(*k).map(String::as_str) == Some(value));
    let selected = set.filter(matches);
    if selected.is_empty() {
        return Err(MaskError::NoMatch {
            key: keys.join("|"),
            value: value.to_owned(),
        });
    }
    Ok(selected)
}

/// A run's mask, reprojected on demand and kept for the run's
/// lifetime.
#[derive(Debug, Default)]
pub struct MaskCache {
    mask: Option<Arc<PolygonSet>>,
    by_crs: DashMap<Crs, Arc<PolygonSet>>,
}

impl MaskCache {
    pub fn new(mask: Option<PolygonSet>) -> Self {
        Self {
            mask: mask.map(Arc::new),
            by_crs: DashMap::new(),
        }
    }

    /// Returns the mask in `crs`, or `None` when the run is unclipped.
    ///
    /// Each CRS is projected at most once.
    pub fn get(&self, crs: Crs) -> Result<Option<Arc<PolygonSet>>, MaskError> {
        let Some(mask) = &self.mask else {
            return Ok(None);
        };
        if mask.crs() == crs {
            return Ok(Some(Arc::clone(mask)));
        }
        self.by_crs
            .entry(crs)
            .or_try_insert_with(|| {
                debug!("projecting mask from {} to {crs}", mask.crs());
                mask.reproject(crs).map(Arc::new)
            })
            .map(|r| Some(r.clone()))
            .map_err(MaskError::from)
    }

    /// Number of projections computed so far.
    pub fn projections(&self) -> usize {
        self.by_crs.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{build_mask, Land, LandFiles, MaskCache, MaskPolicy};
    use approx::assert_abs_diff_eq;
    use crate::MaskError;
    use geo::{polygon, Area, Contains, Point, Polygon};
    use geogrid::{features, Crs, PolygonSet, Properties};

    pub(crate) fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon {
        polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]
    }

    fn labeled(crs: Crs, key: &str, rows: &[(&str, Polygon)]) -> PolygonSet {
        let mut set = PolygonSet::new(crs);
        for (value, polygon) in rows {
            let mut props = Properties::new();
            props.insert(key.to_owned(), (*value).to_owned());
            set.push(polygon.clone(), props);
        }
        set
    }

    /// States and a country in a projected CRS, with a 500 unit gap
    /// between CA and MEX.
    pub(crate) fn land() -> Land {
        Land {
            united_states: labeled(
                Crs::CA_ALBERS,
                "STATE",
                &[
                    ("CA", rect(0.0, 0.0, 1000.0, 1000.0)),
                    ("NV", rect(1000.0, 0.0, 2000.0, 1000.0)),
                    ("WA", rect(0.0, 5000.0, 1000.0, 6000.0)),
                ],
            ),
            north_america: labeled(
                Crs::CA_ALBERS,
                "ADM0_A3",
                &[
                    ("MEX", rect(0.0, -1500.0, 2000.0, -500.0)),
                    ("CAN", rect(0.0, 9000.0, 1000.0, 9500.0)),
                ],
            ),
        }
    }

    fn composite(jurisdictions: &[&str], buffer: f64) -> MaskPolicy {
        MaskPolicy::CompositeLand {
            jurisdictions: jurisdictions.iter().map(|s| (*s).to_owned()).collect(),
            country: "MEX".to_owned(),
            buffer,
            working_crs: Crs::CA_ALBERS,
        }
    }

    fn covers(mask: &PolygonSet, x: f64, y: f64) -> bool {
        mask.parts().any(|p| p.contains(&Point::new(x, y)))
    }

    #[test]
    fn test_state_boundary() {
        let mask = build_mask(&MaskPolicy::state_boundary("CA"), &land())
            .unwrap()
            .unwrap();
        assert_eq!(mask.len(), 1);
        assert!(covers(&mask, 500.0, 500.0));
        assert!(!covers(&mask, 1500.0, 500.0));
    }

    #[test]
    fn test_unknown_state() {
        assert!(matches!(
            build_mask(&MaskPolicy::state_boundary("ZZ"), &land()),
            Err(MaskError::NoMatch { .. })
        ));
    }

    #[test]
    fn test_unclipped() {
        assert!(build_mask(&MaskPolicy::Unclipped, &land())
            .unwrap()
            .is_none());
        assert!(!MaskPolicy::Unclipped.needs_land());
    }

    #[test]
    fn test_buffer_closes_seam_gap() {
        let seam = (500.0, -250.0);

        let unbuffered = build_mask(&composite(&["CA", "NV"], 0.0), &land())
            .unwrap()
            .unwrap();
        assert!(!covers(&unbuffered, seam.0, seam.1));

        let buffered = build_mask(&composite(&["CA", "NV"], 1000.0), &land())
            .unwrap()
            .unwrap();
        assert!(covers(&buffered, seam.0, seam.1));
        assert_eq!(buffered.to_multi_polygon().0.len(), 1);
        assert!(!covers(&buffered, 500.0, 5500.0));
    }

    #[test]
    fn test_composite_order_independent_and_idempotent() {
        let a = build_mask(&composite(&["CA", "NV"], 1000.0), &land())
            .unwrap()
            .unwrap();
        let b = build_mask(&composite(&["NV", "CA"], 1000.0), &land())
            .unwrap()
            .unwrap();
        let again = build_mask(&composite(&["CA", "NV"], 1000.0), &land())
            .unwrap()
            .unwrap();
        assert_eq!(a, again);

        let (a, b) = (a.to_multi_polygon(), b.to_multi_polygon());
        assert_abs_diff_eq!(a.unsigned_area(), b.unsigned_area(), epsilon = 1e-6);
        let sym_diff = geo::BooleanOps::xor(&a, &b);
        assert!(sym_diff.unsigned_area() < 1e-6);
    }

    #[test]
    fn test_composite_needs_projected_crs() {
        let policy = MaskPolicy::CompositeLand {
            jurisdictions: vec!["CA".to_owned()],
            country: "MEX".to_owned(),
            buffer: 1000.0,
            working_crs: Crs::WGS84,
        };
        assert!(matches!(
            build_mask(&policy, &land()),
            Err(MaskError::Geographic(_))
        ));
    }

    #[test]
    fn test_cache_projects_once_per_crs() {
        let mask = build_mask(&MaskPolicy::state_boundary("CA"), &land()).unwrap();
        let cache = MaskCache::new(mask);
        let native = cache.get(Crs::CA_ALBERS).unwrap().unwrap();
        assert_eq!(native.crs(), Crs::CA_ALBERS);
        assert_eq!(cache.projections(), 0);

        let a = cache.get(Crs::CONUS_ALBERS).unwrap().unwrap();
        let b = cache.get(Crs::CONUS_ALBERS).unwrap().unwrap();
        assert!(std::sync::Arc::ptr_eq(&a, &b));
        assert_eq!(a.crs(), Crs::CONUS_ALBERS);
        assert_eq!(cache.projections(), 1);

        assert!(MaskCache::new(None).get(Crs::WGS84).unwrap().is_none());
    }

    #[test]
    fn test_land_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = LandFiles {
            north_america: dir.path().join("na.geojson"),
            united_states: dir.path().join("us.geojson"),
        };
        assert_eq!(files.missing(), Some(files.north_america.as_path()));

        let land = land();
        features::write_polygons(&land.north_america, &files.north_america).unwrap();
        features::write_polygons(&land.united_states, &files.united_states).unwrap();
        assert_eq!(files.missing(), None);
        let read = files.read().unwrap();
        assert_eq!(read.united_states.len(), 3);
        assert_eq!(read.north_america.crs(), Crs::CA_ALBERS);
    }
}
