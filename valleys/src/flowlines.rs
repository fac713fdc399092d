//! Flowline selection for valley floor delineation.

use crate::provider::{FlowNetwork, FlowType, Flowline};
use geo::{geometry::MultiLineString, MapCoords};
use geogrid::{features, Crs, GridError, Properties, Reprojector};
use log::debug;
use std::path::Path;

/// Headwater segments shorter than this are dropped.
pub const MIN_HEADWATER_KM: f64 = 1.0;

/// Keeps stream/river flowlines, minus short headwater segments.
pub fn filter(network: FlowNetwork) -> FlowNetwork {
    let total = network.flowlines.len();
    let flowlines: Vec<Flowline> = network
        .flowlines
        .into_iter()
        .filter(|f| f.ftype == FlowType::StreamRiver)
        .filter(|f| !(f.start_flag && f.length_km < MIN_HEADWATER_KM))
        .collect();
    debug!("kept {} of {total} flowlines", flowlines.len());
    FlowNetwork {
        crs: network.crs,
        flowlines,
    }
}

/// Writes `network` in `crs` as GeoJSON.
pub fn write(network: &FlowNetwork, crs: Crs, path: &Path) -> Result<(), GridError> {
    let reprojector = Reprojector::new(network.crs, crs)?;
    let lines = network
        .flowlines
        .iter()
        .map(|f| -> Result<_, GridError> {
            let geometry = if reprojector.is_identity() {
                f.geometry.clone()
            } else {
                f.geometry.try_map_coords(|c| reprojector.transform(c))?
            };
            let mut props = Properties::new();
            props.insert("FTYPE".to_owned(), f.ftype.name().to_owned());
            props.insert("StartFlag".to_owned(), u8::from(f.start_flag).to_string());
            props.insert("LENGTHKM".to_owned(), f.length_km.to_string());
            Ok((MultiLineString::new(vec![geometry]), props))
        })
        .collect::<Result<Vec<_>, _>>()?;
    features::write_lines(&lines, crs, path)
}
