//! `Dragonfly` (Redis-compatible) territory store.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `territory:records` | Hash | Field per territory ([`TerritoryKey::storage_key`]), JSON record |
//! | `territory:war_state` | String | JSON war number and conquest start the records belong to |
//!
//! Hashes have no compare-and-set on a field, so each upsert reads,
//! compares, and writes under a process-wide mutex. Only one engine
//! process may write a given `Dragonfly` database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use fred::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use frontline_core::store::{StoreError, TerritoryStore};
use frontline_types::{
    ConquerStatus, Team, TerritoryKey, TerritoryRecord, UpsertOutcome, WarState,
};

use crate::error::DbError;

/// Hash holding one JSON territory record per field.
pub const RECORDS_KEY: &str = "territory:records";

/// Key holding the tracked [`WarState`] as JSON.
pub const WAR_KEY: &str = "territory:war_state";

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    // =========================================================================
    // Hash fields as JSON
    // =========================================================================

    /// Read one hash field and deserialize it from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read or deserialization fails.
    pub async fn hget_json<T: DeserializeOwned>(
        &self,
        key: &str,
        field: &str,
    ) -> Result<Option<T>, DbError> {
        let value: Option<String> = self.client.hget(key, field).await?;
        value
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(DbError::Serialization)
    }

    /// Serialize `value` as JSON and store it in a hash field.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the write fails.
    pub async fn hset_json<T: Serialize>(
        &self,
        key: &str,
        field: &str,
        value: &T,
    ) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let _: () = self.client.hset(key, (field, json.as_str())).await?;
        Ok(())
    }

    /// Read and deserialize every field of a hash.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read or any deserialization fails.
    pub async fn hgetall_json<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, DbError> {
        let fields: HashMap<String, String> = self.client.hgetall(key).await?;
        fields
            .values()
            .map(|s| serde_json::from_str(s).map_err(DbError::Serialization))
            .collect()
    }

    // =========================================================================
    // Plain keys
    // =========================================================================

    /// Read a key and deserialize it from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read or deserialization fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(DbError::Serialization)
    }

    /// Serialize `value` as JSON and store it under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the write fails.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let _: () = self
            .client
            .set(key, json.as_str(), None, None, false)
            .await?;
        Ok(())
    }

    /// Delete a key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the quit command fails.
    pub async fn quit(&self) -> Result<(), DbError> {
        self.client.quit().await?;
        tracing::info!("Dragonfly connection closed");
        Ok(())
    }
}

/// [`TerritoryStore`] backed by `Dragonfly`.
pub struct DragonflyTerritoryStore {
    pool: DragonflyPool,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl DragonflyTerritoryStore {
    /// Wrap a connected pool.
    pub const fn new(pool: DragonflyPool) -> Self {
        Self {
            pool,
            write_lock: Mutex::const_new(()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed.load(Ordering::Acquire) {
            Err(DbError::Closed)
        } else {
            Ok(())
        }
    }

    async fn upsert_field(
        &self,
        key: &TerritoryKey,
        team: Team,
        label: &str,
    ) -> Result<UpsertOutcome, DbError> {
        self.ensure_open()?;
        let field = key.storage_key();
        let now = Utc::now();

        let _write = self.write_lock.lock().await;
        let existing: Option<TerritoryRecord> = self.pool.hget_json(RECORDS_KEY, &field).await?;
        let outcome =
            UpsertOutcome::from_previous(existing.as_ref().map(|r| r.controlling_team), team);

        let record = existing.map_or_else(
            || TerritoryRecord {
                key: key.clone(),
                controlling_team: team,
                label: label.to_owned(),
                changed_at: now,
                observed_at: now,
            },
            |previous| TerritoryRecord {
                key: key.clone(),
                controlling_team: team,
                label: label.to_owned(),
                changed_at: if outcome.changed {
                    now
                } else {
                    previous.changed_at
                },
                observed_at: now,
            },
        );
        self.pool.hset_json(RECORDS_KEY, &field, &record).await?;
        Ok(outcome)
    }

    async fn load_snapshot(&self) -> Result<ConquerStatus, DbError> {
        self.ensure_open()?;
        let records: Vec<TerritoryRecord> = self.pool.hgetall_json(RECORDS_KEY).await?;
        let war: Option<WarState> = self.pool.get_json(WAR_KEY).await?;
        Ok(ConquerStatus::for_war(war, records))
    }

    async fn store_war(&self, war: &WarState, clear: bool) -> Result<(), DbError> {
        self.ensure_open()?;
        let _write = self.write_lock.lock().await;
        if clear {
            self.pool.delete(RECORDS_KEY).await?;
            tracing::info!(
                war_number = war.war_number,
                "Cleared territory records for new war"
            );
        }
        self.pool.set_json(WAR_KEY, war).await
    }
}

impl TerritoryStore for DragonflyTerritoryStore {
    async fn upsert(
        &self,
        key: &TerritoryKey,
        team: Team,
        label: &str,
    ) -> Result<UpsertOutcome, StoreError> {
        Ok(self.upsert_field(key, team, label).await?)
    }

    async fn read_snapshot(&self) -> Result<ConquerStatus, StoreError> {
        Ok(self.load_snapshot().await?)
    }

    async fn war_state(&self) -> Result<Option<WarState>, StoreError> {
        self.ensure_open()?;
        Ok(self.pool.get_json(WAR_KEY).await?)
    }

    async fn begin_war(&self, war: &WarState) -> Result<(), StoreError> {
        Ok(self.store_war(war, true).await?)
    }

    async fn record_war(&self, war: &WarState) -> Result<(), StoreError> {
        Ok(self.store_war(war, false).await?)
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        Ok(self.pool.quit().await?)
    }
}
