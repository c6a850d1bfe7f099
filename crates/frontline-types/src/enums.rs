//! Enumeration types.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// The faction controlling a territory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Team {
    /// The Warden faction.
    Wardens,
    /// The Colonial faction.
    Colonials,
    /// Nobody holds the territory.
    Neutral,
}

impl Team {
    /// Resolve the raw `teamId` string the War API attaches to map items.
    ///
    /// Returns `None` for identifiers this build does not know; callers
    /// decide how to treat them.
    pub fn from_raw(raw: &str) -> Option<Self> {
        match raw {
            "WARDENS" => Some(Self::Wardens),
            "COLONIALS" => Some(Self::Colonials),
            "NONE" | "" => Some(Self::Neutral),
            _ => None,
        }
    }

    /// Stable name used for persistence and display.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wardens => "Wardens",
            Self::Colonials => "Colonials",
            Self::Neutral => "Neutral",
        }
    }

    /// Parse the persisted name written by [`Team::as_str`].
    pub fn from_stored(name: &str) -> Option<Self> {
        match name {
            "Wardens" => Some(Self::Wardens),
            "Colonials" => Some(Self::Colonials),
            "Neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

impl core::fmt::Display for Team {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
