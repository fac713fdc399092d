//! Writing floor artifacts to disk.

use geogrid::{features, geotiff, GridError, PolygonSet, RasterGrid};
use log::debug;
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

/// Paths of one group's exported floor mosaic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorArtifacts {
    /// `{group}-floors.tif`
    pub raster: PathBuf,
    /// `{group}-floors.geojson`
    pub polygons: PathBuf,
}

impl FloorArtifacts {
    pub fn new(out_dir: &Path, group: &str) -> Self {
        Self {
            raster: out_dir.join(format!("{group}-floors.tif")),
            polygons: out_dir.join(format!("{group}-floors.geojson")),
        }
    }
}

/// Writes the clipped binary mosaic and its polygons.
///
/// Both files are written even when `grid` holds no floor pixels.
pub fn export_floors(
    grid: &RasterGrid<u8>,
    polygons: &PolygonSet,
    out_dir: &Path,
    group: &str,
) -> Result<FloorArtifacts, GridError> {
    let artifacts = FloorArtifacts::new(out_dir, group);
    write_atomic(&artifacts.raster, |tmp| geotiff::write(grid, tmp))?;
    write_atomic(&artifacts.polygons, |tmp| {
        features::write_polygons(polygons, tmp)
    })?;
    debug!(
        "exported {group}; {} polygons, {} floor pixels",
        polygons.len(),
        grid.count(crate::merge::FLOOR)
    );
    Ok(artifacts)
}

/// Calls `write` with a temporary sibling of `path`, then moves the
/// result into place. The temporary is removed if `write` fails.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), GridError>
where
    F: FnOnce(&Path) -> Result<(), GridError>,
{
    let tmp_path = {
        let mut name = path.file_name().map(OsString::from).unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    };
    if let Err(e) = write(&tmp_path) {
        // Nothing to clean up if the temporary was never created.
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
