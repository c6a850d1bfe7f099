//! SVG composition via `minijinja`.
//!
//! The template receives a flat context built from a [`ConquerStatus`]:
//! team totals, a proportional control bar, per-region counts, and the
//! time elapsed since the conquest started. All
//! layout arithmetic that depends on the data happens here so the
//! template only places precomputed numbers.

use chrono::TimeDelta;
use minijinja::{AutoEscape, Environment};
use serde::Serialize;

use frontline_core::config::RenderConfig;
use frontline_core::render::RenderError;
use frontline_types::{ConquerStatus, Team};

/// The built-in e-paper template.
const DEFAULT_TEMPLATE: &str = include_str!("../templates/epaper.svg.j2");

const TEMPLATE_NAME: &str = "epaper";

/// Horizontal margin around the control bar, in pixels.
const MARGIN: u32 = 20;

/// Vertical space reserved for header, bar, and footer.
const CHROME_HEIGHT: u32 = 180;

/// Height of one region row.
const ROW_HEIGHT: u32 = 22;

/// Number of region columns.
const COLUMNS: u32 = 3;

const MINUTES_PER_DAY: i64 = 1_440;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
struct TeamTotals {
    wardens: usize,
    colonials: usize,
    neutral: usize,
}

impl TeamTotals {
    fn add(&mut self, team: Team) {
        let slot = match team {
            Team::Wardens => &mut self.wardens,
            Team::Colonials => &mut self.colonials,
            Team::Neutral => &mut self.neutral,
        };
        *slot = slot.saturating_add(1);
    }

    const fn total(&self) -> usize {
        self.wardens
            .saturating_add(self.colonials)
            .saturating_add(self.neutral)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct BarSegment {
    team: &'static str,
    x: u32,
    width: u32,
    fill: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct RegionView {
    name: String,
    wardens: usize,
    colonials: usize,
    neutral: usize,
}

#[derive(Debug, Clone, Serialize)]
struct EpaperContext<'a> {
    width: u32,
    height: u32,
    war_number: Option<u32>,
    war_elapsed: Option<String>,
    generated_at: String,
    reason: &'a str,
    last_change: Option<String>,
    totals: TeamTotals,
    bar: Vec<BarSegment>,
    regions: Vec<RegionView>,
    rows_per_column: u32,
    column_width: u32,
}

/// Turn an API region id into a display name.
///
/// `TheFingersHex` becomes `The Fingers`.
pub fn display_region_name(region_id: &str) -> String {
    let trimmed = region_id.strip_suffix("Hex").unwrap_or(region_id);
    let mut name = String::with_capacity(trimmed.len().saturating_add(4));
    let mut previous_lower = false;
    for ch in trimmed.chars() {
        if ch.is_uppercase() && previous_lower {
            name.push(' ');
        }
        previous_lower = ch.is_lowercase();
        name.push(ch);
    }
    name
}

/// Format time since the conquest start the way the game counts it:
/// `Day 1` is the first 24 hours.
///
/// Ninety minutes in renders as `Day 1, 1h 30m`.
pub fn format_war_elapsed(elapsed: TimeDelta) -> String {
    let minutes = elapsed.num_minutes().max(0);
    let day = minutes
        .checked_div(MINUTES_PER_DAY)
        .unwrap_or(0)
        .saturating_add(1);
    let minute_of_day = minutes.checked_rem(MINUTES_PER_DAY).unwrap_or(0);
    let hours = minute_of_day.checked_div(60).unwrap_or(0);
    let mins = minute_of_day.checked_rem(60).unwrap_or(0);
    format!("Day {day}, {hours}h {mins:02}m")
}

fn team_fill(team: Team) -> &'static str {
    match team {
        Team::Wardens => "#000000",
        Team::Colonials => "#777777",
        Team::Neutral => "#ffffff",
    }
}

/// Split `bar_width` pixels between teams in proportion to their counts.
/// The last non-empty segment absorbs rounding so the bar stays full.
fn control_bar(totals: &TeamTotals, bar_width: u32) -> Vec<BarSegment> {
    let total = u64::try_from(totals.total()).unwrap_or(u64::MAX);
    if total == 0 {
        return vec![BarSegment {
            team: Team::Neutral.as_str(),
            x: MARGIN,
            width: bar_width,
            fill: team_fill(Team::Neutral),
        }];
    }

    let order = [
        (Team::Wardens, totals.wardens),
        (Team::Neutral, totals.neutral),
        (Team::Colonials, totals.colonials),
    ];
    let last_non_empty = order.iter().rposition(|&(_, count)| count > 0);

    let mut segments = Vec::with_capacity(order.len());
    let mut x = MARGIN;
    let end = MARGIN.saturating_add(bar_width);
    for (idx, &(team, count)) in order.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let width = if Some(idx) == last_non_empty {
            end.saturating_sub(x)
        } else {
            let share = u64::try_from(count)
                .unwrap_or(u64::MAX)
                .saturating_mul(u64::from(bar_width))
                .checked_div(total)
                .unwrap_or(0);
            u32::try_from(share).unwrap_or(bar_width)
        };
        segments.push(BarSegment {
            team: team.as_str(),
            x,
            width,
            fill: team_fill(team),
        });
        x = x.saturating_add(width);
    }
    segments
}

fn region_views(status: &ConquerStatus) -> (TeamTotals, Vec<RegionView>) {
    let mut totals = TeamTotals::default();
    let mut regions = Vec::new();
    for region in status.regions() {
        let mut counts = TeamTotals::default();
        for record in status.in_region(&region) {
            counts.add(record.controlling_team);
            totals.add(record.controlling_team);
        }
        regions.push(RegionView {
            name: display_region_name(region.as_str()),
            wardens: counts.wardens,
            colonials: counts.colonials,
            neutral: counts.neutral,
        });
    }
    (totals, regions)
}

/// Renders a [`ConquerStatus`] into SVG markup.
pub struct SvgComposer {
    env: Environment<'static>,
    width: u32,
    height: u32,
}

impl SvgComposer {
    /// Build a composer from configuration, loading `template_path` when
    /// set and the built-in template otherwise.
    pub fn new(config: &RenderConfig) -> Result<Self, RenderError> {
        let source = match &config.template_path {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| RenderError::Template(format!("failed to read {path}: {e}")))?,
            None => DEFAULT_TEMPLATE.to_owned(),
        };
        Self::from_source(source, config.width, config.height)
    }

    /// Build a composer from template source.
    pub fn from_source(source: String, width: u32, height: u32) -> Result<Self, RenderError> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.add_template_owned(TEMPLATE_NAME, source)
            .map_err(|e| RenderError::Template(format!("failed to add template: {e}")))?;
        Ok(Self { env, width, height })
    }

    /// Render the SVG for `status`.
    pub fn compose(&self, status: &ConquerStatus, reason: &str) -> Result<String, RenderError> {
        let (totals, regions) = region_views(status);
        let rows_per_column = self
            .height
            .saturating_sub(CHROME_HEIGHT)
            .checked_div(ROW_HEIGHT)
            .unwrap_or(1)
            .max(1);
        let bar_width = self.width.saturating_sub(MARGIN.saturating_mul(2));

        let context = EpaperContext {
            width: self.width,
            height: self.height,
            war_number: status.war_number,
            war_elapsed: status.war_elapsed().map(format_war_elapsed),
            generated_at: status.taken_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            reason,
            last_change: status
                .last_change()
                .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string()),
            totals,
            bar: control_bar(&totals, bar_width),
            regions,
            rows_per_column,
            column_width: bar_width.checked_div(COLUMNS).unwrap_or(bar_width),
        };

        self.env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| RenderError::Template(format!("missing template: {e}")))?
            .render(&context)
            .map_err(|e| RenderError::Template(format!("render failed: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, Utc};
    use frontline_types::{RegionId, TerritoryKey, TerritoryRecord, WarState};

    use super::*;

    fn record(region: &str, x: f64, team: Team) -> TerritoryRecord {
        let now = Utc::now();
        TerritoryRecord {
            key: TerritoryKey::new(56, x, 0.5, RegionId::new(region)),
            controlling_team: team,
            label: String::from("Town Base 1"),
            changed_at: now,
            observed_at: now,
        }
    }

    fn composer() -> SvgComposer {
        SvgComposer::new(&RenderConfig::default()).unwrap()
    }

    #[test]
    fn region_names_are_humanized() {
        assert_eq!(display_region_name("TheFingersHex"), "The Fingers");
        assert_eq!(display_region_name("DeadLandsHex"), "Dead Lands");
        assert_eq!(display_region_name("Oarbreaker"), "Oarbreaker");
    }

    #[test]
    fn control_bar_fills_the_full_width() {
        let totals = TeamTotals {
            wardens: 1,
            colonials: 1,
            neutral: 1,
        };
        let bar = control_bar(&totals, 760);
        assert_eq!(bar.len(), 3);
        let width: u32 = bar.iter().map(|s| s.width).sum();
        assert_eq!(width, 760);
        assert_eq!(bar.first().map(|s| s.team), Some("Wardens"));
        assert_eq!(bar.last().map(|s| s.team), Some("Colonials"));
    }

    #[test]
    fn empty_bar_is_all_neutral() {
        let bar = control_bar(&TeamTotals::default(), 760);
        assert_eq!(bar.len(), 1);
        assert_eq!(bar.first().map(|s| s.width), Some(760));
    }

    #[test]
    fn svg_contains_war_counts_and_regions() {
        let status = ConquerStatus::from_records(
            Some(118),
            vec![
                record("TheFingersHex", 0.1, Team::Wardens),
                record("TheFingersHex", 0.2, Team::Colonials),
                record("DeadLandsHex", 0.3, Team::Wardens),
            ],
        );
        let svg = composer().compose(&status, "2 town changes").unwrap();

        assert!(svg.starts_with("<?xml"));
        assert!(svg.contains("War 118"));
        assert!(svg.contains("Wardens 2"));
        assert!(svg.contains("Colonials 1"));
        assert!(svg.contains("The Fingers"));
        assert!(svg.contains("Dead Lands"));
        assert!(svg.contains("2 town changes"));
        assert!(svg.contains(r#"width="800""#));
    }

    #[test]
    fn war_elapsed_counts_days_from_one() {
        assert_eq!(format_war_elapsed(TimeDelta::minutes(90)), "Day 1, 1h 30m");
        assert_eq!(
            format_war_elapsed(TimeDelta::minutes(17_587)),
            "Day 13, 5h 07m"
        );
        assert_eq!(format_war_elapsed(TimeDelta::seconds(-30)), "Day 1, 0h 00m");
    }

    #[test]
    fn svg_shows_war_duration_once_conquest_started() {
        let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let war = WarState::new(118).with_conquest_start(start);
        let mut status =
            ConquerStatus::for_war(Some(war), vec![record("TheFingersHex", 0.1, Team::Wardens)]);
        status.taken_at = DateTime::<Utc>::from_timestamp(1_700_180_240, 0).unwrap();

        let svg = composer().compose(&status, "1 town changes").unwrap();
        assert!(svg.contains("War 118"));
        assert!(svg.contains("Day 3, 2h 04m"));

        status.conquest_started_at = None;
        let svg = composer().compose(&status, "1 town changes").unwrap();
        assert!(!svg.contains("Day "));
    }

    #[test]
    fn empty_status_renders_placeholder() {
        let svg = composer()
            .compose(&ConquerStatus::empty(), "Initial generation")
            .unwrap();
        assert!(svg.contains("No territory data yet"));
        assert!(svg.contains("No captures recorded"));
    }

    #[test]
    fn reason_text_is_escaped() {
        let svg = composer()
            .compose(&ConquerStatus::empty(), "<script>")
            .unwrap();
        assert!(!svg.contains("<script>"));
        assert!(svg.contains("&lt;script&gt;"));
    }

    #[test]
    fn broken_template_is_a_template_error() {
        let result = SvgComposer::from_source(String::from("{% for %}"), 800, 480);
        assert!(matches!(result, Err(RenderError::Template(_))));
    }
}
