//! `PostgreSQL` territory store.
//!
//! Records live in the `territories` table keyed by
//! `(region_id, type_id, x, y)`; the tracked war and its conquest start
//! live in the single-row `war_state` table. Each upsert is one statement:
//! the `ON CONFLICT` clause and `RETURNING old.*` (`PostgreSQL` 18) report
//! the previous controller atomically, so concurrent upserts never race a
//! separate read. Snapshots read both tables inside one `REPEATABLE READ`
//! transaction.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};

use frontline_core::store::{StoreError, TerritoryStore};
use frontline_types::{
    ConquerStatus, RegionId, Team, TerritoryKey, TerritoryRecord, UpsertOutcome, WarState,
};

use crate::error::DbError;
use crate::postgres::PostgresPool;

const UPSERT_TERRITORY: &str = r"
    INSERT INTO territories
        (region_id, type_id, x, y, controlling_team, label, changed_at, observed_at)
    VALUES ($1, $2, $3, $4, $5, $6, now(), now())
    ON CONFLICT (region_id, type_id, x, y) DO UPDATE SET
        controlling_team = EXCLUDED.controlling_team,
        label = EXCLUDED.label,
        changed_at = CASE
            WHEN territories.controlling_team IS DISTINCT FROM EXCLUDED.controlling_team
            THEN EXCLUDED.changed_at
            ELSE territories.changed_at
        END,
        observed_at = EXCLUDED.observed_at
    RETURNING old.controlling_team AS previous_team";

const UPSERT_WAR: &str = r"
    INSERT INTO war_state (id, war_number, conquest_started_at, updated_at)
    VALUES (1, $1, $2, now())
    ON CONFLICT (id) DO UPDATE SET
        war_number = EXCLUDED.war_number,
        conquest_started_at = EXCLUDED.conquest_started_at,
        updated_at = EXCLUDED.updated_at";

const SELECT_TERRITORIES: &str = r"
    SELECT region_id, type_id, x, y, controlling_team, label, changed_at, observed_at
    FROM territories";

const SELECT_WAR: &str = r"SELECT war_number, conquest_started_at FROM war_state WHERE id = 1";

/// One row of the `territories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TerritoryRow {
    /// Owning region.
    pub region_id: String,
    /// Icon type id.
    pub type_id: i64,
    /// Normalized horizontal position.
    pub x: f64,
    /// Normalized vertical position.
    pub y: f64,
    /// Persisted team name.
    pub controlling_team: String,
    /// Icon label.
    pub label: String,
    /// Last controller change.
    pub changed_at: DateTime<Utc>,
    /// Last reconciliation.
    pub observed_at: DateTime<Utc>,
}

impl TryFrom<TerritoryRow> for TerritoryRecord {
    type Error = DbError;

    fn try_from(row: TerritoryRow) -> Result<Self, Self::Error> {
        let type_id = u32::try_from(row.type_id)
            .map_err(|e| DbError::InvalidValue(format!("type_id {}: {e}", row.type_id)))?;
        let controlling_team = Team::from_stored(&row.controlling_team)
            .ok_or_else(|| DbError::InvalidValue(format!("team {}", row.controlling_team)))?;
        Ok(Self {
            key: TerritoryKey::new(type_id, row.x, row.y, RegionId::new(row.region_id)),
            controlling_team,
            label: row.label,
            changed_at: row.changed_at,
            observed_at: row.observed_at,
        })
    }
}

/// The `war_state` row.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct WarRow {
    /// Tracked war number.
    pub war_number: i64,
    /// Conquest start, once known.
    pub conquest_started_at: Option<DateTime<Utc>>,
}

impl TryFrom<WarRow> for WarState {
    type Error = DbError;

    fn try_from(row: WarRow) -> Result<Self, Self::Error> {
        let war_number = u32::try_from(row.war_number)
            .map_err(|e| DbError::InvalidValue(format!("war_number {}: {e}", row.war_number)))?;
        Ok(Self {
            war_number,
            conquest_started_at: row.conquest_started_at,
        })
    }
}

async fn fetch_war(conn: &mut PgConnection) -> Result<Option<WarState>, DbError> {
    sqlx::query_as::<_, WarRow>(SELECT_WAR)
        .fetch_optional(conn)
        .await?
        .map(WarState::try_from)
        .transpose()
}

/// [`TerritoryStore`] backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PostgresTerritoryStore {
    pool: PostgresPool,
}

impl PostgresTerritoryStore {
    /// Wrap a connected pool. Call [`PostgresPool::run_migrations`] first.
    pub const fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.pool.is_closed() {
            Err(DbError::Closed)
        } else {
            Ok(())
        }
    }

    async fn upsert_row(
        &self,
        key: &TerritoryKey,
        team: Team,
        label: &str,
    ) -> Result<UpsertOutcome, DbError> {
        self.ensure_open()?;
        let row = sqlx::query(UPSERT_TERRITORY)
            .bind(key.region_id.as_str())
            .bind(i64::from(key.type_id))
            .bind(key.x)
            .bind(key.y)
            .bind(team.as_str())
            .bind(label)
            .fetch_one(self.pool.pool())
            .await?;

        let previous: Option<String> = row.try_get("previous_team")?;
        let previous_team = previous
            .map(|name| {
                Team::from_stored(&name).ok_or_else(|| DbError::InvalidValue(format!("team {name}")))
            })
            .transpose()?;

        Ok(UpsertOutcome::from_previous(previous_team, team))
    }

    async fn load_snapshot(&self) -> Result<ConquerStatus, DbError> {
        self.ensure_open()?;
        let mut tx = self.pool.pool().begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query_as::<_, TerritoryRow>(SELECT_TERRITORIES)
            .fetch_all(&mut *tx)
            .await?;
        let war = fetch_war(&mut tx).await?;
        tx.commit().await?;

        let records = rows
            .into_iter()
            .map(TerritoryRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ConquerStatus::for_war(war, records))
    }

    async fn load_war(&self) -> Result<Option<WarState>, DbError> {
        self.ensure_open()?;
        let mut conn = self.pool.pool().acquire().await?;
        fetch_war(&mut conn).await
    }

    async fn store_war(&self, war: &WarState, clear: bool) -> Result<(), DbError> {
        self.ensure_open()?;
        let mut tx = self.pool.pool().begin().await?;
        if clear {
            let cleared = sqlx::query(r"DELETE FROM territories")
                .execute(&mut *tx)
                .await?
                .rows_affected();
            tracing::info!(
                war_number = war.war_number,
                cleared,
                "Cleared territory records for new war"
            );
        }
        sqlx::query(UPSERT_WAR)
            .bind(i64::from(war.war_number))
            .bind(war.conquest_started_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

impl TerritoryStore for PostgresTerritoryStore {
    async fn upsert(
        &self,
        key: &TerritoryKey,
        team: Team,
        label: &str,
    ) -> Result<UpsertOutcome, StoreError> {
        Ok(self.upsert_row(key, team, label).await?)
    }

    async fn read_snapshot(&self) -> Result<ConquerStatus, StoreError> {
        Ok(self.load_snapshot().await?)
    }

    async fn war_state(&self) -> Result<Option<WarState>, StoreError> {
        Ok(self.load_war().await?)
    }

    async fn begin_war(&self, war: &WarState) -> Result<(), StoreError> {
        Ok(self.store_war(war, true).await?)
    }

    async fn record_war(&self, war: &WarState) -> Result<(), StoreError> {
        Ok(self.store_war(war, false).await?)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}
