//! Identifier types.
//!
//! Regions are identified by the opaque names the War API hands out
//! (e.g. `TheFingersHex`). Sync cycles get a UUID v7 so log lines and the
//! status surface can correlate a cycle with the render it triggered.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Unique identifier for one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CycleId(pub Uuid);

impl CycleId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for CycleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque region (hex map) identifier as reported by the War API.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct RegionId(pub String);

impl RegionId {
    /// Create a region identifier from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the region name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RegionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for RegionId {
    fn from(name: String) -> Self {
        Self(name)
    }
}
