//! One reconciliation cycle: fetch, filter, upsert, aggregate.
//!
//! [`SyncEngine::run_cycle`] reads the current war and the region list,
//! then visits every region concurrently (bounded). Each region produces
//! either a [`RegionOutcome`] or a [`RegionFailure`]; a failing region
//! never aborts the others. Only a failure to read the war or the region
//! list fails the cycle, and in that case the store is left untouched.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use frontline_types::{
    CycleId, IconCatalog, RawEntity, RegionId, Team, TerritoryKey, War, WarState,
};

use crate::source::{SourceError, WarSource};
use crate::store::{StoreError, TerritoryStore};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Errors that abort a whole cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleError {
    /// The current war could not be fetched.
    #[error("failed to fetch war: {0}")]
    War(SourceError),

    /// The region list could not be fetched.
    #[error("failed to fetch region list: {0}")]
    Regions(SourceError),

    /// The stored war state could not be read or updated.
    #[error("failed to update war state: {0}")]
    Store(StoreError),
}

/// Why a single region could not be fully reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionFailureKind {
    /// The region snapshot could not be fetched.
    Fetch {
        /// Source error description.
        message: String,
    },
    /// An upsert failed part-way through the region.
    Store {
        /// Store error description.
        message: String,
    },
}

/// A region-scoped failure. Counts cover the work done before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("region {region} failed: {kind:?}")]
pub struct RegionFailure {
    /// The region that failed.
    pub region: RegionId,
    /// What went wrong.
    pub kind: RegionFailureKind,
    /// Territories reconciled before the failure.
    pub reconciled: u32,
    /// Changes recorded before the failure.
    pub changed: u32,
}

/// Counts for one successfully reconciled region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionOutcome {
    /// The region.
    pub region: RegionId,
    /// Conquerable territories reconciled.
    pub reconciled: u32,
    /// Territories whose controller changed.
    pub changed: u32,
}

/// Aggregate result of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    /// Identifier used to correlate log lines.
    pub cycle_id: CycleId,
    /// War the cycle reconciled against.
    pub war_number: u32,
    /// Whether a new war number was observed in this cycle.
    pub war_changed: bool,
    /// Regions in the authoritative list.
    pub regions_polled: u32,
    /// Regions that failed.
    pub regions_failed: u32,
    /// Conquerable territories reconciled across all regions.
    pub total_reconciled: u32,
    /// Territories whose controller changed.
    pub changed: u32,
    /// Per-region failures, sorted by region.
    pub failures: Vec<RegionFailure>,
    /// When the cycle began.
    pub started_at: DateTime<Utc>,
    /// Wall time of the cycle.
    pub duration_ms: u64,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Totals {
    reconciled: u32,
    changed: u32,
    failures: Vec<RegionFailure>,
}

/// Fold per-region results into totals. Partial counts of failed regions
/// are included.
fn aggregate(results: Vec<Result<RegionOutcome, RegionFailure>>) -> Totals {
    let mut totals = Totals::default();
    for result in results {
        match result {
            Ok(outcome) => {
                totals.reconciled = totals.reconciled.saturating_add(outcome.reconciled);
                totals.changed = totals.changed.saturating_add(outcome.changed);
            }
            Err(failure) => {
                totals.reconciled = totals.reconciled.saturating_add(failure.reconciled);
                totals.changed = totals.changed.saturating_add(failure.changed);
                totals.failures.push(failure);
            }
        }
    }
    totals.failures.sort_by(|a, b| a.region.cmp(&b.region));
    totals
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Tunables for [`SyncEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Upper bound on regions fetched at once.
    pub max_concurrent_regions: usize,
    /// Clear every record when the war number changes.
    pub reset_on_new_war: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_concurrent_regions: 4,
            reset_on_new_war: true,
        }
    }
}

/// Reconciles remote war state into a [`TerritoryStore`].
#[derive(Debug)]
pub struct SyncEngine<S, T> {
    source: Arc<S>,
    store: Arc<T>,
    catalog: IconCatalog,
    options: SyncOptions,
}

impl<S: WarSource, T: TerritoryStore> SyncEngine<S, T> {
    /// Create an engine over a source and a store.
    pub const fn new(
        source: Arc<S>,
        store: Arc<T>,
        catalog: IconCatalog,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            store,
            catalog,
            options,
        }
    }

    /// The store this engine writes to.
    pub const fn store(&self) -> &Arc<T> {
        &self.store
    }

    /// Run one full cycle.
    pub async fn run_cycle(&self) -> Result<CycleSummary, CycleError> {
        let cycle_id = CycleId::new();
        let started_at = Utc::now();
        let clock = Instant::now();

        let war = self.source.war().await.map_err(CycleError::War)?;
        let regions = self.source.regions().await.map_err(CycleError::Regions)?;
        let war_changed = self.observe_war(&war).await?;

        let regions_polled = u32::try_from(regions.len()).unwrap_or(u32::MAX);
        let results: Vec<Result<RegionOutcome, RegionFailure>> = stream::iter(regions)
            .map(|region| self.sync_region(region))
            .buffer_unordered(self.options.max_concurrent_regions.max(1))
            .collect()
            .await;
        let totals = aggregate(results);

        if totals.changed > 0 {
            info!(
                %cycle_id,
                changed = totals.changed,
                tracked = totals.reconciled,
                "Town control update: {} towns changed ({} total tracked)",
                totals.changed,
                totals.reconciled,
            );
        } else {
            debug!(%cycle_id, tracked = totals.reconciled, "No changes in town control");
        }

        Ok(CycleSummary {
            cycle_id,
            war_number: war.war_number,
            war_changed,
            regions_polled,
            regions_failed: u32::try_from(totals.failures.len()).unwrap_or(u32::MAX),
            total_reconciled: totals.reconciled,
            changed: totals.changed,
            failures: totals.failures,
            started_at,
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Compare the fetched war with the stored one. Returns `true` when a
    /// new war number replaced a previously stored one.
    ///
    /// The stored state is only written when it differs, which also covers
    /// a conquest start that appears part-way through a war.
    async fn observe_war(&self, war: &War) -> Result<bool, CycleError> {
        let current = WarState::from(war);
        let stored = self.store.war_state().await.map_err(CycleError::Store)?;
        match stored {
            Some(previous) if previous == current => Ok(false),
            Some(previous) if previous.war_number == current.war_number => {
                info!(
                    war_number = current.war_number,
                    conquest_started_at = ?current.conquest_started_at,
                    "Conquest start updated"
                );
                self.store
                    .record_war(&current)
                    .await
                    .map_err(CycleError::Store)?;
                Ok(false)
            }
            Some(previous) => {
                if self.options.reset_on_new_war {
                    warn!(
                        previous = previous.war_number,
                        current = current.war_number,
                        "New war detected, clearing territory records"
                    );
                    self.store
                        .begin_war(&current)
                        .await
                        .map_err(CycleError::Store)?;
                } else {
                    warn!(
                        previous = previous.war_number,
                        current = current.war_number,
                        "New war detected, keeping territory records"
                    );
                    self.store
                        .record_war(&current)
                        .await
                        .map_err(CycleError::Store)?;
                }
                Ok(true)
            }
            None => {
                info!(war_number = current.war_number, "Tracking war");
                self.store
                    .record_war(&current)
                    .await
                    .map_err(CycleError::Store)?;
                Ok(false)
            }
        }
    }

    async fn sync_region(&self, region: RegionId) -> Result<RegionOutcome, RegionFailure> {
        let snapshot = match self.source.region_snapshot(&region).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%region, error = %err, "Failed to fetch region");
                return Err(RegionFailure {
                    region,
                    kind: RegionFailureKind::Fetch {
                        message: err.to_string(),
                    },
                    reconciled: 0,
                    changed: 0,
                });
            }
        };

        let mut reconciled = 0u32;
        let mut changed = 0u32;
        let entities = snapshot.map(|s| s.entities).unwrap_or_default();

        for entity in &entities {
            let Some(label) = self.catalog.conquerable_label(entity.type_id) else {
                continue;
            };
            let team = resolve_team(&region, entity);
            let key = TerritoryKey::new(entity.type_id, entity.x, entity.y, region.clone());

            match self.store.upsert(&key, team, label).await {
                Ok(outcome) => {
                    reconciled = reconciled.saturating_add(1);
                    if outcome.changed {
                        changed = changed.saturating_add(1);
                        debug!(
                            %region,
                            label,
                            x = entity.x,
                            y = entity.y,
                            previous = ?outcome.previous_team,
                            team = %team,
                            "Town captured"
                        );
                    }
                }
                Err(err) => {
                    error!(%region, %key, error = %err, "Failed to store territory");
                    return Err(RegionFailure {
                        region,
                        kind: RegionFailureKind::Store {
                            message: err.to_string(),
                        },
                        reconciled,
                        changed,
                    });
                }
            }
        }

        Ok(RegionOutcome {
            region,
            reconciled,
            changed,
        })
    }
}

fn resolve_team(region: &RegionId, entity: &RawEntity) -> Team {
    Team::from_raw(&entity.team_id).unwrap_or_else(|| {
        warn!(%region, team_id = %entity.team_id, "Unknown team id, treating as neutral");
        Team::Neutral
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use frontline_types::{ConquerStatus, UpsertOutcome};

    use super::*;
    use crate::source::ScriptedWarSource;
    use crate::store::MemoryTerritoryStore;

    fn entity(type_id: u32, x: f64, team: &str) -> RawEntity {
        RawEntity {
            type_id,
            x,
            y: 0.5,
            team_id: team.to_owned(),
            flags: 0,
        }
    }

    fn engine<T: TerritoryStore>(
        source: &Arc<ScriptedWarSource>,
        store: &Arc<T>,
        reset_on_new_war: bool,
    ) -> SyncEngine<ScriptedWarSource, T> {
        SyncEngine::new(
            Arc::clone(source),
            Arc::clone(store),
            IconCatalog::war_api(),
            SyncOptions {
                max_concurrent_regions: 2,
                reset_on_new_war,
            },
        )
    }

    #[tokio::test]
    async fn empty_region_list_reconciles_nothing() {
        let source = Arc::new(ScriptedWarSource::new(110));
        let store = Arc::new(MemoryTerritoryStore::new());
        let summary = engine(&source, &store, true).run_cycle().await.unwrap();

        assert_eq!(summary.total_reconciled, 0);
        assert_eq!(summary.changed, 0);
        assert_eq!(summary.regions_polled, 0);
    }

    #[tokio::test]
    async fn only_conquerable_entities_are_reconciled() {
        let source = Arc::new(ScriptedWarSource::new(110));
        source.set_region(
            "TheFingersHex",
            vec![
                entity(56, 0.1, "WARDENS"),
                entity(45, 0.2, "COLONIALS"),
                entity(11, 0.3, "WARDENS"),
                entity(20, 0.4, "NONE"),
            ],
        );
        let store = Arc::new(MemoryTerritoryStore::new());
        let summary = engine(&source, &store, true).run_cycle().await.unwrap();

        assert_eq!(summary.total_reconciled, 2);
        assert_eq!(summary.changed, 2);
        assert_eq!(store.read_snapshot().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn repeat_cycle_without_changes_reports_zero() {
        let source = Arc::new(ScriptedWarSource::new(110));
        source.set_region("A", vec![entity(56, 0.1, "WARDENS")]);
        let store = Arc::new(MemoryTerritoryStore::new());
        let engine = engine(&source, &store, true);

        assert_eq!(engine.run_cycle().await.unwrap().changed, 1);
        let second = engine.run_cycle().await.unwrap();
        assert_eq!(second.changed, 0);
        assert_eq!(second.total_reconciled, 1);

        source.set_region("A", vec![entity(56, 0.1, "COLONIALS")]);
        let third = engine.run_cycle().await.unwrap();
        assert_eq!(third.changed, 1);

        let snapshot = store.read_snapshot().await.unwrap();
        assert_eq!(
            snapshot.territories.first().map(|r| r.controlling_team),
            Some(Team::Colonials)
        );
    }

    #[tokio::test]
    async fn failing_region_does_not_stop_the_others() {
        let source = Arc::new(ScriptedWarSource::new(110));
        source.set_region("A", vec![entity(56, 0.1, "WARDENS")]);
        source.fail_region("B");
        source.set_region("C", vec![entity(57, 0.1, "COLONIALS")]);
        let store = Arc::new(MemoryTerritoryStore::new());

        let summary = engine(&source, &store, true).run_cycle().await.unwrap();
        assert_eq!(summary.regions_polled, 3);
        assert_eq!(summary.regions_failed, 1);
        assert_eq!(summary.total_reconciled, 2);
        assert_eq!(summary.changed, 2);
        assert_eq!(summary.failures.first().map(|f| f.region.as_str()), Some("B"));
    }

    #[tokio::test]
    async fn failing_region_keeps_its_previous_records() {
        let source = Arc::new(ScriptedWarSource::new(110));
        source.set_region("A", vec![entity(56, 0.1, "WARDENS")]);
        source.set_region("B", vec![entity(57, 0.2, "COLONIALS")]);
        let store = Arc::new(MemoryTerritoryStore::new());
        let engine = engine(&source, &store, true);
        engine.run_cycle().await.unwrap();
        let before = store.read_snapshot().await.unwrap();

        source.fail_region("B");
        source.set_region("A", vec![entity(56, 0.1, "COLONIALS")]);
        let summary = engine.run_cycle().await.unwrap();
        assert_eq!(summary.regions_failed, 1);
        assert_eq!(summary.changed, 1);

        let after = store.read_snapshot().await.unwrap();
        let key = TerritoryKey::new(57, 0.2, 0.5, RegionId::new("B"));
        let kept = after.get(&key).unwrap();
        let original = before.get(&key).unwrap();
        assert_eq!(kept.controlling_team, Team::Colonials);
        assert_eq!(kept.changed_at, original.changed_at);
        assert_eq!(kept.observed_at, original.observed_at);
    }

    #[tokio::test]
    async fn region_leaving_the_list_keeps_its_records() {
        let source = Arc::new(ScriptedWarSource::new(110));
        source.set_region("A", vec![entity(56, 0.1, "WARDENS")]);
        source.set_region("B", vec![entity(57, 0.2, "COLONIALS")]);
        let store = Arc::new(MemoryTerritoryStore::new());
        let engine = engine(&source, &store, true);
        assert_eq!(engine.run_cycle().await.unwrap().regions_polled, 2);

        source.remove_region(&RegionId::new("B"));
        let summary = engine.run_cycle().await.unwrap();
        assert_eq!(summary.regions_polled, 1);
        assert_eq!(summary.regions_failed, 0);
        assert_eq!(summary.total_reconciled, 1);

        let snapshot = store.read_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        let key = TerritoryKey::new(57, 0.2, 0.5, RegionId::new("B"));
        assert_eq!(
            snapshot.get(&key).map(|r| r.controlling_team),
            Some(Team::Colonials)
        );
    }

    #[tokio::test]
    async fn region_without_data_is_not_a_failure() {
        let source = Arc::new(ScriptedWarSource::new(110));
        source.set_region_without_data("A");
        source.set_region("B", Vec::new());
        let store = Arc::new(MemoryTerritoryStore::new());

        let summary = engine(&source, &store, true).run_cycle().await.unwrap();
        assert_eq!(summary.regions_failed, 0);
        assert_eq!(summary.total_reconciled, 0);
    }

    #[tokio::test]
    async fn war_failure_leaves_store_untouched() {
        let source = Arc::new(ScriptedWarSource::new(110));
        source.set_region("A", vec![entity(56, 0.1, "WARDENS")]);
        source.fail_war();
        let store = Arc::new(MemoryTerritoryStore::new());

        let err = engine(&source, &store, true).run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::War(_)));
        assert_eq!(store.writes(), 0);
        assert_eq!(store.war_state().await.unwrap(), None);
    }

    #[tokio::test]
    async fn region_list_failure_leaves_store_untouched() {
        let source = Arc::new(ScriptedWarSource::new(110));
        source.set_region("A", vec![entity(56, 0.1, "WARDENS")]);
        source.fail_region_list(true);
        let store = Arc::new(MemoryTerritoryStore::new());

        let err = engine(&source, &store, true).run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Regions(_)));
        assert_eq!(store.writes(), 0);
        assert_eq!(store.war_state().await.unwrap(), None);
    }

    #[tokio::test]
    async fn new_war_clears_records_when_enabled() {
        let source = Arc::new(ScriptedWarSource::new(110));
        source.set_region("A", vec![entity(56, 0.1, "WARDENS")]);
        let store = Arc::new(MemoryTerritoryStore::new());
        let engine = engine(&source, &store, true);
        engine.run_cycle().await.unwrap();

        source.set_war_number(111);
        source.set_region("A", vec![entity(57, 0.7, "COLONIALS")]);
        let summary = engine.run_cycle().await.unwrap();

        assert!(summary.war_changed);
        assert_eq!(summary.changed, 1);
        let snapshot = store.read_snapshot().await.unwrap();
        assert_eq!(snapshot.war_number, Some(111));
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn new_war_keeps_records_when_disabled() {
        let source = Arc::new(ScriptedWarSource::new(110));
        source.set_region("A", vec![entity(56, 0.1, "WARDENS")]);
        let store = Arc::new(MemoryTerritoryStore::new());
        let engine = engine(&source, &store, false);
        engine.run_cycle().await.unwrap();

        source.set_war_number(111);
        let summary = engine.run_cycle().await.unwrap();
        assert!(summary.war_changed);
        assert_eq!(summary.changed, 0);
        assert_eq!(store.war_state().await.unwrap(), Some(WarState::new(111)));
    }

    #[tokio::test]
    async fn conquest_start_is_persisted_when_it_appears() {
        let source = Arc::new(ScriptedWarSource::new(118));
        source.set_region("A", vec![entity(56, 0.1, "WARDENS")]);
        let store = Arc::new(MemoryTerritoryStore::new());
        let engine = engine(&source, &store, true);
        engine.run_cycle().await.unwrap();
        assert_eq!(store.read_snapshot().await.unwrap().conquest_started_at, None);

        let mut war = War::numbered(118);
        war.conquest_start_time = Some(1_700_000_000_000);
        source.set_war(war.clone());
        let summary = engine.run_cycle().await.unwrap();

        assert!(!summary.war_changed);
        let snapshot = store.read_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.conquest_started_at, war.conquest_started_at());
    }

    #[tokio::test]
    async fn unknown_team_is_stored_as_neutral() {
        let source = Arc::new(ScriptedWarSource::new(110));
        source.set_region("A", vec![entity(56, 0.1, "PIRATES")]);
        let store = Arc::new(MemoryTerritoryStore::new());
        engine(&source, &store, true).run_cycle().await.unwrap();

        let snapshot = store.read_snapshot().await.unwrap();
        assert_eq!(
            snapshot.territories.first().map(|r| r.controlling_team),
            Some(Team::Neutral)
        );
    }

    /// Store that fails every upsert after a fixed number of successes.
    struct FlakyStore {
        inner: MemoryTerritoryStore,
        remaining: AtomicU32,
    }

    impl TerritoryStore for FlakyStore {
        async fn upsert(
            &self,
            key: &TerritoryKey,
            team: Team,
            label: &str,
        ) -> Result<UpsertOutcome, StoreError> {
            let left = self.remaining.load(Ordering::Acquire);
            if left == 0 {
                return Err(StoreError::Backend(String::from("disk full")));
            }
            self.remaining.store(left.saturating_sub(1), Ordering::Release);
            self.inner.upsert(key, team, label).await
        }

        async fn read_snapshot(&self) -> Result<ConquerStatus, StoreError> {
            self.inner.read_snapshot().await
        }

        async fn war_state(&self) -> Result<Option<WarState>, StoreError> {
            self.inner.war_state().await
        }

        async fn begin_war(&self, war: &WarState) -> Result<(), StoreError> {
            self.inner.begin_war(war).await
        }

        async fn record_war(&self, war: &WarState) -> Result<(), StoreError> {
            self.inner.record_war(war).await
        }

        async fn close(&self) -> Result<(), StoreError> {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn store_failure_keeps_partial_region_counts() {
        let source = Arc::new(ScriptedWarSource::new(110));
        source.set_region(
            "A",
            vec![
                entity(56, 0.1, "WARDENS"),
                entity(56, 0.2, "WARDENS"),
                entity(56, 0.3, "WARDENS"),
            ],
        );
        let store = Arc::new(FlakyStore {
            inner: MemoryTerritoryStore::new(),
            remaining: AtomicU32::new(2),
        });

        let summary = engine(&source, &store, true).run_cycle().await.unwrap();
        assert_eq!(summary.regions_failed, 1);
        assert_eq!(summary.total_reconciled, 2);
        assert_eq!(summary.changed, 2);
        let failure = summary.failures.first().unwrap();
        assert!(matches!(failure.kind, RegionFailureKind::Store { .. }));
        assert_eq!(failure.reconciled, 2);
    }

    #[test]
    fn aggregate_sums_successes_and_partials() {
        let totals = aggregate(vec![
            Ok(RegionOutcome {
                region: RegionId::new("A"),
                reconciled: 3,
                changed: 1,
            }),
            Err(RegionFailure {
                region: RegionId::new("C"),
                kind: RegionFailureKind::Fetch {
                    message: String::from("timeout"),
                },
                reconciled: 0,
                changed: 0,
            }),
            Err(RegionFailure {
                region: RegionId::new("B"),
                kind: RegionFailureKind::Store {
                    message: String::from("closed"),
                },
                reconciled: 2,
                changed: 2,
            }),
        ]);

        assert_eq!(totals.reconciled, 5);
        assert_eq!(totals.changed, 3);
        let order: Vec<_> = totals.failures.iter().map(|f| f.region.as_str()).collect();
        assert_eq!(order, vec!["B", "C"]);
    }
}
