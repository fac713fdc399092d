//! Per-watershed input preparation and valley floor delineation.

use crate::{
    acquire::{AcquisitionConfig, AdaptiveAcquisition},
    export::write_atomic,
    flowlines,
    ledger::{Ledger, Stage},
    mask::Land,
    provider::{GeometryProvider, ValleyFloorEngine},
    UnitError, WatershedId,
};
use geo::{
    geometry::{MultiPolygon, Polygon},
    Area, BooleanOps, BoundingRect, Intersects,
};
use geogrid::{features, geotiff, warp_bilinear, Crs, PolygonSet};
use log::info;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Settings shared by every unit of a preparation run.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitConfig {
    pub acquisition: AcquisitionConfig,
    /// CRS flowlines and DEMs are written in. DEMs are resampled into
    /// it bilinearly at the acquisition resolution.
    pub working_crs: Crs,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig::default(),
            working_crs: Crs::CA_ALBERS,
        }
    }
}

/// Inputs gathered for one unit. A missing path means that stage
/// failed and was recorded in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedUnit {
    pub unit: WatershedId,
    /// Boundary with ocean removed, in the provider's CRS.
    pub boundary: PolygonSet,
    pub flowlines: Option<PathBuf>,
    pub dem: Option<PathBuf>,
}

impl PreparedUnit {
    pub fn is_complete(&self) -> bool {
        self.flowlines.is_some() && self.dem.is_some()
    }
}

/// Downloads and writes the boundary, flowlines and DEM of `unit`.
///
/// Returns `None` when the boundary stage fails, since the later
/// stages need it. A failed flowline stage does not stop the DEM stage.
pub fn prepare_unit<P>(
    provider: &P,
    land: &Land,
    unit: &WatershedId,
    config: &UnitConfig,
    out_dir: &Path,
    ledger: &mut Ledger,
) -> Option<PreparedUnit>
where
    P: GeometryProvider + ?Sized,
{
    let boundary = match land_boundary(provider, land, unit) {
        Ok(boundary) => boundary,
        Err(e) => {
            ledger.record(unit.as_str(), Stage::Boundary, e);
            return None;
        }
    };

    let flowlines_path = out_dir.join(format!("{unit}-flowlines.geojson"));
    let flowlines = provider
        .fetch_flow_network(&boundary)
        .map_err(UnitError::from)
        .and_then(|network| {
            let network = flowlines::filter(network);
            write_atomic(&flowlines_path, |tmp| {
                flowlines::write(&network, config.working_crs, tmp)
            })?;
            Ok(flowlines_path)
        })
        .map_err(|e| ledger.record(unit.as_str(), Stage::Flowlines, e))
        .ok();

    let dem_path = out_dir.join(format!("{unit}-dem.tif"));
    let acquisition = AdaptiveAcquisition::new(config.acquisition);
    let dem = acquisition
        .acquire(provider, &boundary.to_multi_polygon(), boundary.crs())
        .map_err(UnitError::from)
        .and_then(|grid| {
            let grid = warp_bilinear(&grid, config.working_crs, config.acquisition.resolution)?;
            write_atomic(&dem_path, |tmp| geotiff::write(&grid, tmp))?;
            Ok(dem_path)
        })
        .map_err(|e| ledger.record(unit.as_str(), Stage::Dem, e))
        .ok();

    info!(
        "prepared {unit}; flowlines: {}, dem: {}",
        flowlines.is_some(),
        dem.is_some()
    );
    Some(PreparedUnit {
        unit: unit.clone(),
        boundary,
        flowlines,
        dem,
    })
}

/// Prepares every unit in parallel. The returned ledger lists
/// failures in `units` order.
pub fn prepare_units<P>(
    provider: &P,
    land: &Land,
    units: &[WatershedId],
    config: &UnitConfig,
    out_dir: &Path,
) -> (Vec<PreparedUnit>, Ledger)
where
    P: GeometryProvider + ?Sized,
{
    let results: Vec<(Option<PreparedUnit>, Ledger)> = units
        .par_iter()
        .map(|unit| {
            let mut ledger = Ledger::new();
            let prepared = prepare_unit(provider, land, unit, config, out_dir, &mut ledger);
            (prepared, ledger)
        })
        .collect();
    let mut ledger = Ledger::new();
    let mut prepared = Vec::with_capacity(results.len());
    for (unit, unit_ledger) in results {
        prepared.extend(unit);
        ledger.extend(unit_ledger);
    }
    (prepared, ledger)
}

/// Runs the valley floor engine on a prepared unit and writes
/// `{unit}-floors.geojson` to `out_dir`.
pub fn run_valley_floor<E>(
    engine: &E,
    prepared: &PreparedUnit,
    config: &Path,
    work_dir: &Path,
    out_dir: &Path,
    ledger: &mut Ledger,
) -> Option<PathBuf>
where
    E: ValleyFloorEngine + ?Sized,
{
    let unit = prepared.unit.as_str();
    let (Some(dem), Some(flowlines)) = (&prepared.dem, &prepared.flowlines) else {
        ledger.record(
            unit,
            Stage::ValleyFloor,
            UnitError::Skipped("missing dem or flowlines".to_owned()),
        );
        return None;
    };
    let out_path = out_dir.join(format!("{unit}-floors.geojson"));
    let result = engine
        .compute(dem, flowlines, config, work_dir)
        .map_err(UnitError::from)
        .and_then(|floors| {
            write_atomic(&out_path, |tmp| features::write_polygons(&floors, tmp))?;
            info!("{unit}; {} valley floor polygons", floors.len());
            Ok(out_path)
        });
    match result {
        Ok(path) => Some(path),
        Err(e) => {
            ledger.record(unit, Stage::ValleyFloor, e);
            None
        }
    }
}

/// Fetches the unit boundary and removes everything outside of land.
fn land_boundary<P>(provider: &P, land: &Land, unit: &WatershedId) -> Result<PolygonSet, UnitError>
where
    P: GeometryProvider + ?Sized,
{
    let boundary = provider.fetch_boundary(unit)?;
    let crs = boundary.polygons.crs();
    let land = if boundary.touches_mexico() {
        &land.north_america
    } else {
        &land.united_states
    };
    let outline = boundary.polygons.union();
    let Some(extent) = outline.bounding_rect() else {
        return Err(UnitError::Geometry("boundary is empty".to_owned()));
    };

    let nearby: Vec<Polygon> = land
        .reproject(crs)?
        .parts()
        .filter(|p| p.bounding_rect().map_or(false, |r| r.intersects(&extent)))
        .cloned()
        .collect();
    let nearby = PolygonSet::from_shapes(crs, nearby).union();
    let on_land: MultiPolygon = outline.intersection(&nearby);
    if on_land.0.is_empty() || on_land.unsigned_area() == 0.0 {
        return Err(UnitError::Geometry(format!(
            "{unit} boundary is empty after removing ocean"
        )));
    }
    Ok(PolygonSet::from_shapes(crs, [on_land]))
}
