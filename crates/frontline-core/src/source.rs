//! Remote state source trait and a scripted in-memory implementation.
//!
//! The sync engine reads the war through three capabilities: the current
//! war, the active region list, and a per-region entity snapshot. The
//! [`WarSource`] trait abstracts how those are obtained. Production uses
//! the HTTP War API client; tests use [`ScriptedWarSource`].

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use frontline_types::{RawEntity, RegionId, RegionSnapshot, War};

/// Errors raised while talking to the remote source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// Transport error description.
        message: String,
    },

    /// The source answered with an unexpected HTTP status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response body did not match the expected shape.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Decoder error description.
        message: String,
    },

    /// The request exceeded its deadline.
    #[error("request to {url} timed out")]
    Timeout {
        /// Requested URL.
        url: String,
    },
}

/// A source of live war state.
///
/// Every call must complete in bounded time; implementations enforce
/// their own request timeout.
pub trait WarSource: Send + Sync {
    /// Fetch the current war.
    fn war(&self) -> impl Future<Output = Result<War, SourceError>> + Send;

    /// List the regions active in the current war.
    fn regions(&self) -> impl Future<Output = Result<Vec<RegionId>, SourceError>> + Send;

    /// Fetch the dynamic entity snapshot of one region.
    ///
    /// Returns `Ok(None)` when the region has no dynamic data.
    fn region_snapshot(
        &self,
        region: &RegionId,
    ) -> impl Future<Output = Result<Option<RegionSnapshot>, SourceError>> + Send;
}

// ---------------------------------------------------------------------------
// ScriptedWarSource
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Script {
    war: Option<War>,
    fail_region_list: bool,
    snapshots: BTreeMap<RegionId, Option<Vec<RawEntity>>>,
    failing: BTreeSet<RegionId>,
    delay: Duration,
}

/// An in-memory source whose answers are scripted by the caller.
///
/// Used to drive the sync engine and scheduler without a network. The
/// region list is derived from the scripted snapshots unless overridden.
/// A configurable delay on [`WarSource::regions`] simulates a slow remote,
/// and the source records how many region-list calls overlapped.
#[derive(Debug, Default)]
pub struct ScriptedWarSource {
    script: Mutex<Script>,
    region_list_in_flight: AtomicUsize,
    max_region_list_in_flight: AtomicUsize,
    region_list_calls: AtomicUsize,
}

impl ScriptedWarSource {
    /// Create a source reporting the given war number and no regions.
    pub fn new(war_number: u32) -> Self {
        let source = Self::default();
        source.script().war = Some(War::numbered(war_number));
        source
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report a different war number from now on.
    pub fn set_war_number(&self, war_number: u32) {
        self.script().war = Some(War::numbered(war_number));
    }

    /// Report `war` verbatim from now on.
    pub fn set_war(&self, war: War) {
        self.script().war = Some(war);
    }

    /// Make [`WarSource::war`] fail until a war number is set again.
    pub fn fail_war(&self) {
        self.script().war = None;
    }

    /// Make [`WarSource::regions`] fail (`true`) or derive the list from
    /// the scripted snapshots (`false`).
    pub fn fail_region_list(&self, fail: bool) {
        self.script().fail_region_list = fail;
    }

    /// Script the entities a region reports.
    pub fn set_region(&self, region: impl Into<RegionId>, entities: Vec<RawEntity>) {
        let region = region.into();
        let mut script = self.script();
        script.failing.remove(&region);
        script.snapshots.insert(region, Some(entities));
    }

    /// Script a region that reports no dynamic data at all.
    pub fn set_region_without_data(&self, region: impl Into<RegionId>) {
        let region = region.into();
        let mut script = self.script();
        script.failing.remove(&region);
        script.snapshots.insert(region, None);
    }

    /// Make snapshot fetches for a region fail.
    pub fn fail_region(&self, region: impl Into<RegionId>) {
        let region = region.into();
        let mut script = self.script();
        script.snapshots.entry(region.clone()).or_insert(None);
        script.failing.insert(region);
    }

    /// Remove a region from the active list.
    pub fn remove_region(&self, region: &RegionId) {
        let mut script = self.script();
        script.snapshots.remove(region);
        script.failing.remove(region);
    }

    /// Delay every region-list fetch by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.script().delay = delay;
    }

    /// Largest number of region-list fetches that were in flight at once.
    pub fn max_concurrent_region_lists(&self) -> usize {
        self.max_region_list_in_flight.load(Ordering::Acquire)
    }

    /// Total number of region-list fetches.
    pub fn region_list_calls(&self) -> usize {
        self.region_list_calls.load(Ordering::Acquire)
    }
}

fn scripted_url(path: &str) -> String {
    format!("scripted://{path}")
}

impl WarSource for ScriptedWarSource {
    async fn war(&self) -> Result<War, SourceError> {
        self.script().war.clone().ok_or_else(|| SourceError::Status {
            url: scripted_url("war"),
            status: 503,
        })
    }

    async fn regions(&self) -> Result<Vec<RegionId>, SourceError> {
        self.region_list_calls.fetch_add(1, Ordering::AcqRel);
        let in_flight = self
            .region_list_in_flight
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1);
        self.max_region_list_in_flight
            .fetch_max(in_flight, Ordering::AcqRel);

        let delay = self.script().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let script = self.script();
            if script.fail_region_list {
                Err(SourceError::Timeout {
                    url: scripted_url("maps"),
                })
            } else {
                Ok(script.snapshots.keys().cloned().collect())
            }
        };

        self.region_list_in_flight.fetch_sub(1, Ordering::AcqRel);
        result
    }

    async fn region_snapshot(
        &self,
        region: &RegionId,
    ) -> Result<Option<RegionSnapshot>, SourceError> {
        let script = self.script();
        if script.failing.contains(region) {
            return Err(SourceError::Http {
                url: scripted_url(&format!("maps/{region}")),
                message: String::from("connection reset"),
            });
        }
        Ok(script
            .snapshots
            .get(region)
            .cloned()
            .flatten()
            .map(|entities| RegionSnapshot::new(region.clone(), entities)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn town(team: &str) -> RawEntity {
        RawEntity {
            type_id: 56,
            x: 0.5,
            y: 0.5,
            team_id: team.to_owned(),
            flags: 0,
        }
    }

    #[tokio::test]
    async fn scripted_regions_follow_snapshots() {
        let source = ScriptedWarSource::new(100);
        source.set_region("A", vec![town("WARDENS")]);
        source.set_region_without_data("B");

        let regions = source.regions().await.unwrap();
        assert_eq!(regions, vec![RegionId::new("A"), RegionId::new("B")]);

        let a = source.region_snapshot(&RegionId::new("A")).await.unwrap();
        assert_eq!(a.map(|s| s.entities.len()), Some(1));
        let b = source.region_snapshot(&RegionId::new("B")).await.unwrap();
        assert!(b.is_none());
    }

    #[tokio::test]
    async fn scripted_failures_surface_as_errors() {
        let source = ScriptedWarSource::new(100);
        source.fail_region("A");
        assert!(source.region_snapshot(&RegionId::new("A")).await.is_err());

        source.fail_region_list(true);
        assert!(source.regions().await.is_err());
        source.fail_region_list(false);
        assert!(source.regions().await.is_ok());

        source.fail_war();
        assert!(source.war().await.is_err());
        source.set_war_number(101);
        assert_eq!(source.war().await.unwrap().war_number, 101);
    }
}
