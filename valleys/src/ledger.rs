//! Per-run record of failed units.

use log::warn;
use serde::Serialize;
use std::{fmt, path::Path};

/// Processing step a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Boundary,
    Flowlines,
    Dem,
    ValleyFloor,
    Read,
    Merge,
    Clip,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boundary => "boundary",
            Self::Flowlines => "flowlines",
            Self::Dem => "dem",
            Self::ValleyFloor => "valley_floor",
            Self::Read => "read",
            Self::Merge => "merge",
            Self::Clip => "clip",
            Self::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// Watershed id or mosaic group key.
    pub unit: String,
    pub stage: Stage,
    pub reason: String,
}

/// Append-only list of failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: Vec<FailureRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a failure and logs it.
    pub fn record(&mut self, unit: &str, stage: Stage, reason: impl fmt::Display) {
        let reason = reason.to_string();
        warn!("{unit} {stage} failed: {reason}");
        self.records.push(FailureRecord {
            unit: unit.to_owned(),
            stage,
            reason,
        });
    }

    /// Appends every record of `other`, keeping its order.
    pub fn extend(&mut self, other: Ledger) {
        self.records.extend(other.records);
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// One `unit stage: reason` line per record.
    pub fn summary(&self) -> String {
        self.records
            .iter()
            .map(|r| format!("{} {}: {}", r.unit, r.stage, r.reason))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Writes the records as CSV with a `unit,stage,reason` header.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_path(path)?;
        for record in &self.records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
