//! REST API endpoint handlers for the Observer server.
//!
//! Status comes from the scheduler's counters; territory data comes from
//! a [`ConquerStatus`] snapshot read through the shared [`AppState`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/status` | Scheduler status and counters |
//! | `GET` | `/api/territories` | Territory records (by region or team) |
//! | `GET` | `/api/regions` | Per-region team counts |

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse};
use frontline_types::{ConquerStatus, RegionId, Team, TerritoryRecord};

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for the `GET /api/territories` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct TerritoriesQuery {
    /// Only territories in this region (API region id, e.g. `TheFingersHex`).
    pub region: Option<String>,
    /// Only territories held by this team: `Wardens`, `Colonials`, or `Neutral`.
    pub team: Option<String>,
}

/// Team totals for one region.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RegionCounts {
    /// Region id.
    pub region: String,
    /// Territories tracked in the region.
    pub total: usize,
    /// Held by the Wardens.
    pub wardens: usize,
    /// Held by the Colonials.
    pub colonials: usize,
    /// Held by nobody.
    pub neutral: usize,
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing scheduler status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.control.status().await;
    let snapshot = state.control.conquer_status().await.ok();

    let running = if status.running { "RUNNING" } else { "STOPPED" };
    let war = snapshot
        .as_ref()
        .and_then(|s| s.war_number)
        .map_or_else(|| String::from("-"), |n| n.to_string());
    let counts = snapshot
        .as_ref()
        .map(ConquerStatus::team_counts)
        .unwrap_or_default();
    let wardens = counts.get(&Team::Wardens).copied().unwrap_or(0);
    let colonials = counts.get(&Team::Colonials).copied().unwrap_or(0);
    let neutral = counts.get(&Team::Neutral).copied().unwrap_or(0);
    let cycles = status.cycles_completed;
    let renders = status.renders_completed;
    let last_render = status
        .last_render
        .as_ref()
        .map_or_else(|| String::from("never"), |r| r.at.format("%Y-%m-%d %H:%M:%S UTC").to_string());

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Frontline Observer</title>
    <style>
        body {{
            background: #f6f6f2;
            color: #1c1c1c;
            font-family: 'DejaVu Sans Mono', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ margin-bottom: 0.25rem; }}
        .subtitle {{ color: #666; margin-top: 0; }}
        .metric {{
            display: inline-block;
            border: 1px solid #1c1c1c;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #666; font-size: 0.85rem; }}
        .metric .value {{ font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #1c1c1c; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        hr {{ border: none; border-top: 1px solid #1c1c1c; margin: 1.5rem 0; }}
    </style>
</head>
<body>
    <h1>Frontline Observer</h1>
    <p class="subtitle">Territory sync and e-paper render scheduler</p>

    <p>Scheduler: <strong>{running}</strong></p>

    <div>
        <div class="metric"><div class="label">War</div><div class="value">{war}</div></div>
        <div class="metric"><div class="label">Wardens</div><div class="value">{wardens}</div></div>
        <div class="metric"><div class="label">Colonials</div><div class="value">{colonials}</div></div>
        <div class="metric"><div class="label">Neutral</div><div class="value">{neutral}</div></div>
        <div class="metric"><div class="label">Cycles</div><div class="value">{cycles}</div></div>
        <div class="metric"><div class="label">Renders</div><div class="value">{renders}</div></div>
    </div>
    <p>Last render: {last_render}</p>

    <hr>

    <h2>API Endpoints</h2>
    <ul>
        <li>GET <a href="/api/status">/api/status</a> -- Scheduler status</li>
        <li>GET <a href="/api/territories">/api/territories</a> -- Territories (?region=X or ?team=Wardens)</li>
        <li>GET <a href="/api/regions">/api/regions</a> -- Per-region counts</li>
        <li>POST /api/operator/start -- Start the scheduler</li>
        <li>POST /api/operator/stop -- Stop the scheduler</li>
        <li>POST /api/operator/render -- Render now</li>
    </ul>

    <h2>WebSocket</h2>
    <ul>
        <li><code>ws://host:port/ws/cycles</code> -- Live cycle and render stream</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Return the scheduler's flags, counters, and latest cycle and render.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.control.status().await)
}

// ---------------------------------------------------------------------------
// GET /api/territories
// ---------------------------------------------------------------------------

/// List territory records, optionally filtered.
///
/// # Query Parameters
///
/// - `region`: API region id.
/// - `team`: `Wardens` | `Colonials` | `Neutral`.
pub async fn list_territories(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TerritoriesQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let team = params.team.as_deref().map(parse_team).transpose()?;
    let region = params.region.map(RegionId::new);
    let snapshot = state.control.conquer_status().await?;

    let territories: Vec<&TerritoryRecord> = snapshot
        .territories
        .iter()
        .filter(|record| region.as_ref().is_none_or(|r| &record.key.region_id == r))
        .filter(|record| team.is_none_or(|t| record.controlling_team == t))
        .collect();

    Ok(Json(serde_json::json!({
        "war_number": snapshot.war_number,
        "conquest_started_at": snapshot.conquest_started_at,
        "taken_at": snapshot.taken_at,
        "count": territories.len(),
        "territories": territories,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/regions
// ---------------------------------------------------------------------------

/// Per-region team counts, in region order.
pub async fn list_regions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let snapshot = state.control.conquer_status().await?;
    let regions = region_counts(&snapshot);

    Ok(Json(serde_json::json!({
        "war_number": snapshot.war_number,
        "count": regions.len(),
        "regions": regions,
    })))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a team name as accepted by the query string.
fn parse_team(name: &str) -> Result<Team, ObserverError> {
    [Team::Wardens, Team::Colonials, Team::Neutral]
        .into_iter()
        .find(|team| team.as_str().eq_ignore_ascii_case(name))
        .ok_or_else(|| ObserverError::InvalidQuery(format!("unknown team: {name}")))
}

fn region_counts(snapshot: &ConquerStatus) -> Vec<RegionCounts> {
    let mut by_region: BTreeMap<&RegionId, RegionCounts> = BTreeMap::new();
    for record in &snapshot.territories {
        let entry = by_region
            .entry(&record.key.region_id)
            .or_insert_with(|| RegionCounts {
                region: record.key.region_id.to_string(),
                ..RegionCounts::default()
            });
        entry.total = entry.total.saturating_add(1);
        let slot = match record.controlling_team {
            Team::Wardens => &mut entry.wardens,
            Team::Colonials => &mut entry.colonials,
            Team::Neutral => &mut entry.neutral,
        };
        *slot = slot.saturating_add(1);
    }
    by_region.into_values().collect()
}
