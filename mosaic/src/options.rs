use clap::Parser;
use std::path::PathBuf;
use valleys::{Connectivity, GroupLevel, LandFiles, MaskPolicy, MosaicConfig};

/// Mosaic per-watershed valley floor rasters, clip them to land and
/// vectorize the result.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory of `{huc10}-*.tif` floor rasters.
    pub input_dir: PathBuf,

    /// Where mosaics are written.
    pub output_dir: PathBuf,

    /// GeoJSON country polygons of North America.
    pub na_land_file: PathBuf,

    /// GeoJSON US state polygons.
    pub us_land_file: PathBuf,

    /// Hydrologic unit level to group tiles at; `none` puts every tile
    /// in one `all` group.
    #[arg(short, long, default_value_t = GroupLevel::All)]
    pub level: GroupLevel,

    /// Clip to the boundary of `--state` only.
    #[arg(long, conflicts_with = "no_land_clip")]
    pub state_boundary_clip: bool,

    /// Only mosaic tiles inside `--region-prefix`.
    #[arg(long)]
    pub watershed_boundary_clip: bool,

    #[arg(long, default_value = "18")]
    pub region_prefix: String,

    #[arg(long, default_value = "CA")]
    pub state: String,

    /// Skip land clipping entirely.
    #[arg(long)]
    pub no_land_clip: bool,

    /// Pixel connectivity used when tracing polygons, 4 or 8.
    #[arg(short, long, default_value_t = Connectivity::Four)]
    pub connectivity: Connectivity,

    /// Write each group's polygons as one dissolved feature.
    #[arg(long)]
    pub dissolve: bool,

    /// Failure ledger path. Defaults to `failures.csv` in the output
    /// directory.
    #[arg(long)]
    pub ledger: Option<PathBuf>,
}

impl Cli {
    pub fn policy(&self) -> MaskPolicy {
        if self.no_land_clip {
            MaskPolicy::Unclipped
        } else if self.state_boundary_clip {
            MaskPolicy::state_boundary(&self.state)
        } else {
            MaskPolicy::default()
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger
            .clone()
            .unwrap_or_else(|| self.output_dir.join("failures.csv"))
    }

    pub fn config(&self) -> MosaicConfig {
        MosaicConfig {
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            land: LandFiles {
                north_america: self.na_land_file.clone(),
                united_states: self.us_land_file.clone(),
            },
            level: self.level,
            region: self
                .watershed_boundary_clip
                .then(|| self.region_prefix.clone()),
            policy: self.policy(),
            connectivity: self.connectivity,
            dissolve: self.dissolve,
        }
    }
}
