//! Batch mosaicking of floor tiles.

use crate::{
    clip::{clip_to_mask, TouchRule},
    export::{export_floors, FloorArtifacts},
    group::{group_tiles, TileGroups},
    ledger::{Ledger, Stage},
    mask::{build_mask, LandFiles, MaskCache, MaskPolicy},
    merge::{merge_floors, FLOOR},
    vectorize::{dissolve, vectorize, Connectivity},
    ConfigError, GroupLevel,
};
use geogrid::geotiff;
use log::info;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Everything a mosaic run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub land: LandFiles,
    pub level: GroupLevel,
    /// Only tiles whose id starts with this are mosaicked.
    pub region: Option<String>,
    pub policy: MaskPolicy,
    pub connectivity: Connectivity,
    /// Write each group's polygons as a single dissolved feature
    /// instead of one feature per region.
    pub dissolve: bool,
}

/// A validated run: tiles grouped and mask built.
#[derive(Debug)]
pub struct Mosaic {
    config: MosaicConfig,
    groups: TileGroups,
    masks: MaskCache,
}

impl Mosaic {
    /// Checks `config` and does the once-per-run work.
    ///
    /// Errors here are configuration errors; no group has been
    /// processed yet.
    pub fn new(config: MosaicConfig) -> Result<Self, ConfigError> {
        if !config.input_dir.is_dir() {
            return Err(ConfigError::MissingFile(config.input_dir));
        }
        if config.policy.needs_land() {
            if let Some(missing) = config.land.missing() {
                return Err(ConfigError::MissingFile(missing.to_owned()));
            }
        }
        let groups = group_tiles(&config.input_dir, config.level, config.region.as_deref())?;
        let mask = if config.policy.needs_land() {
            build_mask(&config.policy, &config.land.read()?)?
        } else {
            None
        };
        std::fs::create_dir_all(&config.output_dir)?;
        info!(
            "{} groups at {} from {:?}, policy {:?}",
            groups.len(),
            config.level,
            config.input_dir,
            config.policy
        );
        Ok(Self {
            config,
            groups,
            masks: MaskCache::new(mask),
        })
    }

    pub fn groups(&self) -> &TileGroups {
        &self.groups
    }

    /// Mosaics every group in parallel, calling `on_done` after each.
    ///
    /// Group failures are collected into the returned ledger, in group
    /// key order.
    pub fn run<F>(&self, on_done: F) -> Ledger
    where
        F: Fn(&str) + Sync,
    {
        let ledgers: Vec<Ledger> = self
            .groups
            .par_iter()
            .map(|(key, tiles)| {
                let mut ledger = Ledger::new();
                if let Err((stage, reason)) = self.mosaic_group(key, tiles) {
                    ledger.record(key, stage, reason);
                }
                on_done(key);
                ledger
            })
            .collect();
        let mut ledger = Ledger::new();
        for group_ledger in ledgers {
            ledger.extend(group_ledger);
        }
        ledger
    }

    fn mosaic_group(&self, key: &str, tiles: &[PathBuf]) -> Result<FloorArtifacts, (Stage, String)> {
        let grids = tiles
            .iter()
            .map(|path| geotiff::read(path).map_err(|e| read_error(path, &e)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| (Stage::Read, e))?;
        let merged = merge_floors(&grids).map_err(|e| (Stage::Merge, e.to_string()))?;
        drop(grids);

        let clipped = match self.masks.get(merged.crs()) {
            Ok(Some(mask)) => clip_to_mask(&merged, &mask, TouchRule::AllTouched)
                .map_err(|e| (Stage::Clip, e.to_string()))?,
            Ok(None) => merged,
            Err(e) => return Err((Stage::Clip, e.to_string())),
        };
        let mut polygons = vectorize(&clipped, FLOOR, self.config.connectivity);
        let regions = polygons.len();
        if self.config.dissolve {
            polygons = dissolve(&polygons);
        }
        let artifacts = export_floors(&clipped, &polygons, &self.config.output_dir, key)
            .map_err(|e| (Stage::Export, e.to_string()))?;
        info!(
            "{key}; {} tiles, {} floor pixels, {regions} polygons",
            tiles.len(),
            clipped.count(FLOOR),
        );
        Ok(artifacts)
    }
}

fn read_error(path: &Path, e: &geogrid::GridError) -> String {
    format!("{}: {e}", path.display())
}

/// Validates `config`, then mosaics, clips and exports every group.
pub fn run_mosaic(config: MosaicConfig) -> Result<Ledger, ConfigError> {
    Ok(Mosaic::new(config)?.run(|_| ()))
}
