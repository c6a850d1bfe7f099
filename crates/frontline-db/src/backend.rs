//! Backend selection.
//!
//! [`TerritoryBackend`] dispatches over the concrete stores with an enum
//! instead of a trait object, so the async trait methods keep their
//! static futures.

use frontline_core::config::{StorageBackendKind, StorageConfig};
use frontline_core::store::{MemoryTerritoryStore, StoreError, TerritoryStore};
use frontline_types::{ConquerStatus, Team, TerritoryKey, UpsertOutcome, WarState};

use crate::dragonfly::{DragonflyPool, DragonflyTerritoryStore};
use crate::error::DbError;
use crate::postgres::PostgresPool;
use crate::territory_store::PostgresTerritoryStore;

/// The territory store selected by configuration.
pub enum TerritoryBackend {
    /// `PostgreSQL` tables.
    Postgres(PostgresTerritoryStore),
    /// A `Dragonfly` hash.
    Dragonfly(DragonflyTerritoryStore),
    /// Process memory.
    Memory(MemoryTerritoryStore),
}

impl TerritoryBackend {
    /// Connect to the configured backend. `PostgreSQL` migrations run
    /// before the store is returned.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or migrations fail.
    pub async fn connect(config: &StorageConfig) -> Result<Self, DbError> {
        match config.backend {
            StorageBackendKind::Postgres => {
                let pool = PostgresPool::connect(config).await?;
                pool.run_migrations().await?;
                Ok(Self::Postgres(PostgresTerritoryStore::new(pool)))
            }
            StorageBackendKind::Dragonfly => {
                let pool = DragonflyPool::connect(&config.dragonfly_url).await?;
                Ok(Self::Dragonfly(DragonflyTerritoryStore::new(pool)))
            }
            StorageBackendKind::Memory => {
                tracing::warn!("Using in-memory territory store; records are lost on restart");
                Ok(Self::Memory(MemoryTerritoryStore::new()))
            }
        }
    }

    /// Short backend name for logs and status output.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Dragonfly(_) => "dragonfly",
            Self::Memory(_) => "memory",
        }
    }
}

impl TerritoryStore for TerritoryBackend {
    async fn upsert(
        &self,
        key: &TerritoryKey,
        team: Team,
        label: &str,
    ) -> Result<UpsertOutcome, StoreError> {
        match self {
            Self::Postgres(store) => store.upsert(key, team, label).await,
            Self::Dragonfly(store) => store.upsert(key, team, label).await,
            Self::Memory(store) => store.upsert(key, team, label).await,
        }
    }

    async fn read_snapshot(&self) -> Result<ConquerStatus, StoreError> {
        match self {
            Self::Postgres(store) => store.read_snapshot().await,
            Self::Dragonfly(store) => store.read_snapshot().await,
            Self::Memory(store) => store.read_snapshot().await,
        }
    }

    async fn war_state(&self) -> Result<Option<WarState>, StoreError> {
        match self {
            Self::Postgres(store) => store.war_state().await,
            Self::Dragonfly(store) => store.war_state().await,
            Self::Memory(store) => store.war_state().await,
        }
    }

    async fn begin_war(&self, war: &WarState) -> Result<(), StoreError> {
        match self {
            Self::Postgres(store) => store.begin_war(war).await,
            Self::Dragonfly(store) => store.begin_war(war).await,
            Self::Memory(store) => store.begin_war(war).await,
        }
    }

    async fn record_war(&self, war: &WarState) -> Result<(), StoreError> {
        match self {
            Self::Postgres(store) => store.record_war(war).await,
            Self::Dragonfly(store) => store.record_war(war).await,
            Self::Memory(store) => store.record_war(war).await,
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        match self {
            Self::Postgres(store) => store.close().await,
            Self::Dragonfly(store) => store.close().await,
            Self::Memory(store) => store.close().await,
        }
    }
}
