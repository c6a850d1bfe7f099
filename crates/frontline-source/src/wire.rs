//! War API response shapes and their conversion into domain types.
//!
//! Field names follow the API's camelCase JSON. Unknown fields are
//! ignored so new API additions never break decoding.

use serde::Deserialize;

use frontline_types::{RawEntity, RegionId, RegionSnapshot, War};

/// Body of `GET /worldconquest/war`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarResponse {
    /// Opaque war id.
    #[serde(default)]
    pub war_id: Option<String>,
    /// Sequential war number.
    pub war_number: u32,
    /// Winning faction, `NONE` while the war runs.
    #[serde(default)]
    pub winner: Option<String>,
    /// Conquest start, epoch milliseconds.
    #[serde(default)]
    pub conquest_start_time: Option<i64>,
    /// Victory towns needed to win.
    #[serde(default)]
    pub required_victory_towns: Option<u32>,
}

impl From<WarResponse> for War {
    fn from(response: WarResponse) -> Self {
        Self {
            war_number: response.war_number,
            war_id: response.war_id,
            winner: response.winner.filter(|w| w != "NONE"),
            conquest_start_time: response.conquest_start_time,
            required_victory_towns: response.required_victory_towns,
        }
    }
}

/// One entry of `mapItems`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapItem {
    /// Raw team identifier.
    #[serde(default)]
    pub team_id: String,
    /// Icon type id.
    pub icon_type: u32,
    /// Normalized x.
    pub x: f64,
    /// Normalized y.
    pub y: f64,
    /// Bit flags.
    #[serde(default)]
    pub flags: u32,
}

impl From<MapItem> for RawEntity {
    fn from(item: MapItem) -> Self {
        Self {
            type_id: item.icon_type,
            x: item.x,
            y: item.y,
            team_id: item.team_id,
            flags: item.flags,
        }
    }
}

/// Body of `GET /worldconquest/maps/{region}/dynamic/public`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicMapResponse {
    /// Numeric region id assigned by the API.
    #[serde(default)]
    pub region_id: Option<u32>,
    /// Every dynamic map item.
    #[serde(default)]
    pub map_items: Vec<MapItem>,
    /// Data version, bumped on every change.
    #[serde(default)]
    pub version: Option<u64>,
    /// Last update, epoch milliseconds.
    #[serde(default)]
    pub last_updated: Option<i64>,
}

/// Decode a war body.
pub fn parse_war(body: &[u8]) -> Result<War, serde_json::Error> {
    serde_json::from_slice::<WarResponse>(body).map(War::from)
}

/// Decode a region-list body.
pub fn parse_regions(body: &[u8]) -> Result<Vec<RegionId>, serde_json::Error> {
    serde_json::from_slice::<Vec<String>>(body)
        .map(|names| names.into_iter().map(RegionId::new).collect())
}

/// Decode a dynamic map body for `region`.
pub fn parse_region(region: &RegionId, body: &[u8]) -> Result<RegionSnapshot, serde_json::Error> {
    let response: DynamicMapResponse = serde_json::from_slice(body)?;
    let mut snapshot = RegionSnapshot::new(
        region.clone(),
        response.map_items.into_iter().map(RawEntity::from).collect(),
    );
    snapshot.version = response.version;
    snapshot.last_updated = response.last_updated;
    Ok(snapshot)
}
