//! Territory persistence trait and the in-memory store.
//!
//! A [`TerritoryStore`] holds the last reconciled controller of every
//! territory plus the war those records belong to. Backends in
//! `frontline-db` implement the same contract on Postgres and Dragonfly.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use frontline_types::{
    ConquerStatus, Team, TerritoryKey, TerritoryRecord, UpsertOutcome, WarState,
};

/// Errors raised by a territory store backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing service rejected or failed the operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(String),

    /// The store handle has been closed.
    #[error("store is closed")]
    Closed,
}

/// Persistent mapping from [`TerritoryKey`] to its controlling team.
///
/// `upsert` must be safe under concurrent callers: two regions never share
/// a key, but a backend must not lose or tear a record when many upserts
/// run at once.
pub trait TerritoryStore: Send + Sync {
    /// Insert or update one territory.
    ///
    /// `changed` is `true` iff no record existed or the stored team differs
    /// from `team`. The label is always overwritten.
    fn upsert(
        &self,
        key: &TerritoryKey,
        team: Team,
        label: &str,
    ) -> impl Future<Output = Result<UpsertOutcome, StoreError>> + Send;

    /// Take an immutable copy of every record.
    fn read_snapshot(&self) -> impl Future<Output = Result<ConquerStatus, StoreError>> + Send;

    /// The war the stored records belong to.
    fn war_state(&self) -> impl Future<Output = Result<Option<WarState>, StoreError>> + Send;

    /// Drop every record and start tracking `war`.
    fn begin_war(&self, war: &WarState) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Record `war` without touching the territory records.
    fn record_war(&self, war: &WarState) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Release the backend connection. Later calls fail with
    /// [`StoreError::Closed`].
    fn close(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryTerritoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<TerritoryKey, TerritoryRecord>,
    war: Option<WarState>,
}

/// Process-local store backed by a `BTreeMap` behind an async `RwLock`.
///
/// Used by tests and by deployments that do not need records to survive a
/// restart. Every upsert runs inside one write section.
#[derive(Debug, Default)]
pub struct MemoryTerritoryStore {
    state: RwLock<MemoryState>,
    closed: AtomicBool,
    writes: AtomicU64,
}

impl MemoryTerritoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upserts applied since creation.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl TerritoryStore for MemoryTerritoryStore {
    async fn upsert(
        &self,
        key: &TerritoryKey,
        team: Team,
        label: &str,
    ) -> Result<UpsertOutcome, StoreError> {
        self.ensure_open()?;
        let now = Utc::now();
        let mut state = self.state.write().await;

        let previous_team = state.records.get(key).map(|r| r.controlling_team);
        let outcome = UpsertOutcome::from_previous(previous_team, team);

        match state.records.get_mut(key) {
            Some(record) => {
                if outcome.changed {
                    record.controlling_team = team;
                    record.changed_at = now;
                }
                label.clone_into(&mut record.label);
                record.observed_at = now;
            }
            None => {
                state.records.insert(
                    key.clone(),
                    TerritoryRecord {
                        key: key.clone(),
                        controlling_team: team,
                        label: label.to_owned(),
                        changed_at: now,
                        observed_at: now,
                    },
                );
            }
        }

        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(outcome)
    }

    async fn read_snapshot(&self) -> Result<ConquerStatus, StoreError> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(ConquerStatus::for_war(
            state.war,
            state.records.values().cloned(),
        ))
    }

    async fn war_state(&self) -> Result<Option<WarState>, StoreError> {
        self.ensure_open()?;
        Ok(self.state.read().await.war)
    }

    async fn begin_war(&self, war: &WarState) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        state.records.clear();
        state.war = Some(*war);
        Ok(())
    }

    async fn record_war(&self, war: &WarState) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.state.write().await.war = Some(*war);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
