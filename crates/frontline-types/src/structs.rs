//! Core data structs: the war, raw map items, persisted territory records,
//! and the [`ConquerStatus`] snapshot consumed by the renderer.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::Team;
use crate::ids::RegionId;

// ---------------------------------------------------------------------------
// War
// ---------------------------------------------------------------------------

/// The current war (simulation epoch).
///
/// Only `war_number` matters to reconciliation; a change between cycles
/// means every stored territory belongs to a finished war.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct War {
    /// Sequential war number.
    pub war_number: u32,
    /// Opaque war id assigned by the API.
    pub war_id: Option<String>,
    /// Winning faction name once the war has ended.
    pub winner: Option<String>,
    /// Conquest start as Unix epoch milliseconds.
    pub conquest_start_time: Option<i64>,
    /// Number of victory towns required to win.
    pub required_victory_towns: Option<u32>,
}

impl War {
    /// Build a war record that only carries its number.
    pub const fn numbered(war_number: u32) -> Self {
        Self {
            war_number,
            war_id: None,
            winner: None,
            conquest_start_time: None,
            required_victory_towns: None,
        }
    }

    /// Conquest start as a timestamp, if the API reported one.
    pub fn conquest_started_at(&self) -> Option<DateTime<Utc>> {
        self.conquest_start_time
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

/// The part of a [`War`] a territory store persists next to its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WarState {
    /// Sequential war number.
    pub war_number: u32,
    /// When the conquest phase began, once the API reports it.
    pub conquest_started_at: Option<DateTime<Utc>>,
}

impl WarState {
    /// A war whose conquest has not started.
    pub const fn new(war_number: u32) -> Self {
        Self {
            war_number,
            conquest_started_at: None,
        }
    }

    /// Set the conquest start.
    #[must_use]
    pub const fn with_conquest_start(mut self, at: DateTime<Utc>) -> Self {
        self.conquest_started_at = Some(at);
        self
    }
}

impl From<&War> for WarState {
    fn from(war: &War) -> Self {
        Self {
            war_number: war.war_number,
            conquest_started_at: war.conquest_started_at(),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw map data
// ---------------------------------------------------------------------------

/// A map item as delivered by the remote source, before filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    /// Icon type id, looked up in the icon catalog.
    pub type_id: u32,
    /// Normalized horizontal position within the region (0.0 to 1.0).
    pub x: f64,
    /// Normalized vertical position within the region (0.0 to 1.0).
    pub y: f64,
    /// Raw team identifier (`WARDENS`, `COLONIALS`, `NONE`).
    pub team_id: String,
    /// Bit flags attached by the API (victory base, scorched, ...).
    pub flags: u32,
}

/// The dynamic state of one region at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    /// The region these entities belong to.
    pub region_id: RegionId,
    /// Every map item in the region.
    pub entities: Vec<RawEntity>,
    /// Monotonic data version reported by the API.
    pub version: Option<u64>,
    /// Last update as Unix epoch milliseconds.
    pub last_updated: Option<i64>,
}

impl RegionSnapshot {
    /// Create a snapshot without version metadata.
    pub const fn new(region_id: RegionId, entities: Vec<RawEntity>) -> Self {
        Self {
            region_id,
            entities,
            version: None,
            last_updated: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Territory identity and records
// ---------------------------------------------------------------------------

/// Identity of a territory across cycles.
///
/// Type and position together identify a marker for the life of a war.
/// Coordinates compare by exact bit pattern: the same marker is always
/// reported with the same coordinates, so no tolerance is applied.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TerritoryKey {
    /// Icon type id.
    pub type_id: u32,
    /// Normalized horizontal position.
    pub x: f64,
    /// Normalized vertical position.
    pub y: f64,
    /// Owning region.
    pub region_id: RegionId,
}

impl TerritoryKey {
    /// Create a key.
    pub const fn new(type_id: u32, x: f64, y: f64, region_id: RegionId) -> Self {
        Self {
            type_id,
            x,
            y,
            region_id,
        }
    }

    /// Flat string form used as a hash field in key-value stores.
    ///
    /// `f64` formatting in Rust round-trips exactly, so distinct keys never
    /// collide.
    pub fn storage_key(&self) -> String {
        format!("{}:{}:{}:{}", self.region_id, self.type_id, self.x, self.y)
    }
}

impl PartialEq for TerritoryKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
            && self.x.to_bits() == other.x.to_bits()
            && self.y.to_bits() == other.y.to_bits()
            && self.region_id == other.region_id
    }
}

impl Eq for TerritoryKey {}

impl Ord for TerritoryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.region_id
            .cmp(&other.region_id)
            .then(self.type_id.cmp(&other.type_id))
            .then(self.x.total_cmp(&other.x))
            .then(self.y.total_cmp(&other.y))
    }
}

impl PartialOrd for TerritoryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for TerritoryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.x.to_bits().hash(state);
        self.y.to_bits().hash(state);
        self.region_id.hash(state);
    }
}

impl core::fmt::Display for TerritoryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}@({}, {})", self.region_id, self.type_id, self.x, self.y)
    }
}

/// Persisted controller of one territory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TerritoryRecord {
    /// Identity of the territory.
    pub key: TerritoryKey,
    /// Team that held it at the last successful reconciliation.
    pub controlling_team: Team,
    /// Descriptive label (icon type name). Not part of change detection.
    pub label: String,
    /// When `controlling_team` last changed (or the record was created).
    pub changed_at: DateTime<Utc>,
    /// When the territory was last reconciled.
    pub observed_at: DateTime<Utc>,
}

/// Result of a single reconciliation upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    /// `true` if no record existed or the stored team differed.
    pub changed: bool,
    /// The team stored before this upsert, if any.
    pub previous_team: Option<Team>,
}

impl UpsertOutcome {
    /// Derive the outcome from the previously stored team.
    pub fn from_previous(previous_team: Option<Team>, new_team: Team) -> Self {
        Self {
            changed: previous_team != Some(new_team),
            previous_team,
        }
    }
}

// ---------------------------------------------------------------------------
// ConquerStatus
// ---------------------------------------------------------------------------

/// Immutable point-in-time projection of every territory record.
///
/// Records are kept sorted by [`TerritoryKey`]. The renderer and the
/// observer consume this copy so that reconciliation may continue while
/// a render is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ConquerStatus {
    /// War number the records belong to, if one has been observed.
    pub war_number: Option<u32>,
    /// Conquest start of that war, if known.
    pub conquest_started_at: Option<DateTime<Utc>>,
    /// When the projection was taken.
    pub taken_at: DateTime<Utc>,
    /// Every territory record, sorted by key.
    pub territories: Vec<TerritoryRecord>,
}

impl ConquerStatus {
    /// Build a snapshot from records in any order.
    pub fn from_records(
        war_number: Option<u32>,
        records: impl IntoIterator<Item = TerritoryRecord>,
    ) -> Self {
        let mut territories: Vec<TerritoryRecord> = records.into_iter().collect();
        territories.sort_by(|a, b| a.key.cmp(&b.key));
        Self {
            war_number,
            conquest_started_at: None,
            taken_at: Utc::now(),
            territories,
        }
    }

    /// Build a snapshot of the records stored for `war`.
    pub fn for_war(
        war: Option<WarState>,
        records: impl IntoIterator<Item = TerritoryRecord>,
    ) -> Self {
        let mut status = Self::from_records(war.map(|w| w.war_number), records);
        status.conquest_started_at = war.and_then(|w| w.conquest_started_at);
        status
    }

    /// An empty snapshot.
    pub fn empty() -> Self {
        Self::from_records(None, Vec::new())
    }

    /// Time from the conquest start to `taken_at`. Never negative.
    pub fn war_elapsed(&self) -> Option<TimeDelta> {
        self.conquest_started_at
            .map(|start| self.taken_at.signed_duration_since(start).max(TimeDelta::zero()))
    }

    /// Look up a territory by key.
    pub fn get(&self, key: &TerritoryKey) -> Option<&TerritoryRecord> {
        self.territories
            .binary_search_by(|record| record.key.cmp(key))
            .ok()
            .and_then(|idx| self.territories.get(idx))
    }

    /// Number of territories held by each team.
    pub fn team_counts(&self) -> BTreeMap<Team, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.territories {
            let entry = counts.entry(record.controlling_team).or_insert(0usize);
            *entry = entry.saturating_add(1);
        }
        counts
    }

    /// Every region that has at least one territory.
    pub fn regions(&self) -> BTreeSet<RegionId> {
        self.territories
            .iter()
            .map(|record| record.key.region_id.clone())
            .collect()
    }

    /// Territories inside one region, in key order.
    pub fn in_region<'a>(
        &'a self,
        region: &'a RegionId,
    ) -> impl Iterator<Item = &'a TerritoryRecord> + 'a {
        self.territories
            .iter()
            .filter(move |record| &record.key.region_id == region)
    }

    /// Most recent team change across all territories.
    pub fn last_change(&self) -> Option<DateTime<Utc>> {
        self.territories.iter().map(|record| record.changed_at).max()
    }

    /// Number of territories.
    pub fn len(&self) -> usize {
        self.territories.len()
    }

    /// Whether no territory has been recorded.
    pub fn is_empty(&self) -> bool {
        self.territories.is_empty()
    }
}
