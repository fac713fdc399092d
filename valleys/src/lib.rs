//! Valley floor mosaics and the data that feeds them.
//!
//! Per-watershed floor rasters are grouped by hydrologic unit prefix,
//! merged into one mosaic per group, clipped to a land mask and
//! vectorized ([`mosaic`]). Upstream of that, [`unit`] gathers the
//! boundary, filtered flowlines and DEM for each watershed, falling back
//! to quadrant requests when a DEM is too large to fetch in one go
//! ([`acquire`]).

pub mod acquire;
pub mod clip;
mod error;
pub mod export;
pub mod flowlines;
pub mod group;
mod huc;
pub mod ledger;
pub mod mask;
pub mod merge;
pub mod mosaic;
mod provider;
pub mod unit;
pub mod vectorize;

pub use crate::{
    acquire::{AcquisitionConfig, AdaptiveAcquisition, Quadrant},
    error::{AcquireError, ClipError, ConfigError, GroupingError, MaskError, MergeError, UnitError},
    huc::{GroupLevel, WatershedId},
    ledger::{FailureRecord, Ledger, Stage},
    mask::{LandFiles, MaskPolicy},
    mosaic::{run_mosaic, Mosaic, MosaicConfig},
    provider::{
        Boundary, FlowNetwork, FlowType, Flowline, GeometryProvider, ProviderError, Region,
        ValleyFloorEngine,
    },
    vectorize::Connectivity,
};
