//! Hydrologic unit codes.

use crate::ConfigError;
use std::{fmt, str::FromStr};

/// A hierarchical watershed identifier.
///
/// Every prefix of even length is the id of an ancestor unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatershedId(String);

impl WatershedId {
    /// Returns `Some` if `id` is 2 to 12 ASCII digits of even length.
    pub fn parse(id: &str) -> Option<Self> {
        let valid = (2..=12).contains(&id.len())
            && id.len() % 2 == 0
            && id.bytes().all(|b| b.is_ascii_digit());
        valid.then(|| Self(id.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of digits, i.e. 10 for a HUC10.
    pub fn level(&self) -> usize {
        self.0.len()
    }

    /// Returns the ancestor at `digits`, or `None` if this id is not
    /// deeper than that.
    pub fn ancestor(&self, digits: usize) -> Option<Self> {
        (digits >= 2 && digits % 2 == 0 && digits <= self.0.len())
            .then(|| Self(self.0[..digits].to_owned()))
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for WatershedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hierarchy level tiles are grouped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GroupLevel {
    /// Everything in one group named `all`.
    #[default]
    All,
    Huc2,
    Huc4,
    Huc6,
    Huc8,
}

impl GroupLevel {
    /// Key of the single group produced by [`GroupLevel::All`].
    pub const ALL_KEY: &'static str = "all";

    /// Prefix length, or `None` for [`GroupLevel::All`].
    pub fn digits(self) -> Option<usize> {
        match self {
            Self::All => None,
            Self::Huc2 => Some(2),
            Self::Huc4 => Some(4),
            Self::Huc6 => Some(6),
            Self::Huc8 => Some(8),
        }
    }

    /// Returns the group key for `id`.
    pub fn key(self, id: &WatershedId) -> Option<String> {
        match self.digits() {
            None => Some(Self::ALL_KEY.to_owned()),
            Some(digits) => id.ancestor(digits).map(|a| a.0),
        }
    }
}

impl FromStr for GroupLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "all" => Ok(Self::All),
            "huc2" => Ok(Self::Huc2),
            "huc4" => Ok(Self::Huc4),
            "huc6" => Ok(Self::Huc6),
            "huc8" => Ok(Self::Huc8),
            _ => Err(ConfigError::Level(s.to_owned())),
        }
    }
}

impl fmt::Display for GroupLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.digits() {
            None => f.write_str("none"),
            Some(d) => write!(f, "huc{d}"),
        }
    }
}
