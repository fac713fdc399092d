//! GeoJSON polygon and line collections.

use crate::{Crs, GridError, PolygonSet, Properties, Shape};
use geo::geometry::{Geometry, MultiLineString};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use log::debug;
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Reads every polygonal feature of the GeoJSON file at `path`.
///
/// String, number and boolean properties are kept as strings. The CRS
/// is taken from a legacy `crs` member when present, otherwise it is
/// WGS 84 as RFC 7946 requires.
pub fn read_polygons<P: AsRef<Path>>(path: P) -> Result<PolygonSet, GridError> {
    let path = path.as_ref();
    let geojson = GeoJson::from_reader(BufReader::new(File::open(path)?))?;
    let (features, foreign) = match geojson {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(feature) => (vec![feature], None),
        GeoJson::Geometry(geometry) => (vec![Feature::from(geometry)], None),
    };
    let crs = match foreign.as_ref().and_then(named_crs) {
        Some(name) => name.parse()?,
        None => Crs::WGS84,
    };

    let mut set = PolygonSet::new(crs);
    for feature in features {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry = Geometry::<f64>::try_from(geometry)?;
        let shape = Shape::try_from(geometry)
            .map_err(|_| GridError::NotPolygonal(path.display().to_string()))?;
        let properties = feature
            .properties
            .as_ref()
            .map(string_properties)
            .unwrap_or_default();
        set.push(shape, properties);
    }
    debug!("read {} shapes from {path:?} in {crs}", set.len());
    Ok(set)
}

/// Writes `set` as a FeatureCollection, one feature per shape.
pub fn write_polygons<P: AsRef<Path>>(set: &PolygonSet, path: P) -> Result<(), GridError> {
    let features = set
        .iter()
        .map(|(shape, props)| {
            let value = match shape {
                Shape::Single(polygon) => geojson::Value::from(polygon),
                Shape::Multi(multi) => geojson::Value::from(multi),
            };
            feature(value, props)
        })
        .collect();
    write_collection(features, set.crs(), path.as_ref())
}

/// Writes lines as a FeatureCollection, one feature per entry.
pub fn write_lines<P: AsRef<Path>>(
    lines: &[(MultiLineString, Properties)],
    crs: Crs,
    path: P,
) -> Result<(), GridError> {
    let features = lines
        .iter()
        .map(|(line, props)| feature(geojson::Value::from(line), props))
        .collect();
    write_collection(features, crs, path.as_ref())
}

fn feature(value: geojson::Value, props: &Properties) -> Feature {
    let properties: JsonObject = props
        .iter()
        .map(|(k, v)| {
            let v = v
                .parse::<i64>()
                .map_or_else(|_| JsonValue::String(v.clone()), JsonValue::from);
            (k.clone(), v)
        })
        .collect();
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn write_collection(features: Vec<Feature>, crs: Crs, path: &Path) -> Result<(), GridError> {
    let mut foreign = JsonObject::new();
    foreign.insert(
        "crs".to_owned(),
        serde_json::json!({ "type": "name", "properties": { "name": crs.urn() } }),
    );
    let n_features = features.len();
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign),
    };
    let mut wtr = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut wtr, &collection)?;
    wtr.flush()?;
    debug!("wrote {n_features} features to {path:?}");
    Ok(())
}

fn named_crs(foreign: &JsonObject) -> Option<&str> {
    foreign
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
}

fn string_properties(object: &JsonObject) -> Properties {
    object
        .iter()
        .filter_map(|(k, v)| {
            let v = match v {
                JsonValue::String(s) => s.clone(),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.clone(), v))
        })
        .collect()
}
