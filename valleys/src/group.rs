//! Partitioning of per-watershed floor tiles into mosaic groups.

use crate::{GroupLevel, GroupingError, WatershedId};
use log::debug;
use std::{
    collections::BTreeMap,
    ffi::OsStr,
    path::{Path, PathBuf},
};

/// Digits in the watershed id every tile name starts with.
pub const TILE_ID_DIGITS: usize = 10;

/// Group key to member tile paths, in key order.
pub type TileGroups = BTreeMap<String, Vec<PathBuf>>;

/// Returns the tile's watershed id, parsed from the file name up to
/// the first `-` (`1805000101-floors.tif`).
pub fn tile_id(path: &Path) -> Result<WatershedId, GroupingError> {
    let mk_err = || GroupingError::InvalidTileName(path.to_owned());
    let stem = path
        .file_stem()
        .and_then(OsStr::to_str)
        .ok_or_else(mk_err)?;
    let raw = stem.split('-').next().unwrap_or(stem);
    if raw.len() != TILE_ID_DIGITS {
        return Err(mk_err());
    }
    WatershedId::parse(raw).ok_or_else(mk_err)
}

/// Groups `tiles` at `level`.
///
/// Tiles whose id does not start with `region` (when given) are
/// dropped. A malformed tile name is an error for the whole call.
pub fn group_paths<I>(
    tiles: I,
    level: GroupLevel,
    region: Option<&str>,
) -> Result<TileGroups, GroupingError>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut groups = TileGroups::new();
    for path in tiles {
        let id = tile_id(&path)?;
        if region.map_or(false, |prefix| !id.starts_with(prefix)) {
            debug!("skipping {path:?}, outside region {region:?}");
            continue;
        }
        let key = level
            .key(&id)
            .ok_or_else(|| GroupingError::InvalidTileName(path.clone()))?;
        groups.entry(key).or_default().push(path);
    }
    for members in groups.values_mut() {
        members.sort();
    }
    Ok(groups)
}

/// Lists the GeoTIFF tiles in `dir` and groups them at `level`.
pub fn group_tiles(
    dir: &Path,
    level: GroupLevel,
    region: Option<&str>,
) -> Result<TileGroups, GroupingError> {
    let mut tiles = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_tiff = path
            .extension()
            .and_then(OsStr::to_str)
            .map_or(false, |ext| {
                ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff")
            });
        if is_tiff && path.is_file() {
            tiles.push(path);
        }
    }
    tiles.sort();
    let groups = group_paths(tiles, level, region)?;
    if groups.is_empty() {
        return Err(GroupingError::NoTiles(dir.to_owned()));
    }
    debug!(
        "grouped {} tiles into {} groups at {level}",
        groups.values().map(Vec::len).sum::<usize>(),
        groups.len()
    );
    Ok(groups)
}
