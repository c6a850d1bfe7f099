//! Territory store backends for the Frontline tracker.
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool
//! - [`territory_store`] -- `PostgreSQL` territory store
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) territory store
//! - [`backend`] -- configuration-driven backend selection
//! - [`error`] -- Shared error types

pub mod backend;
pub mod dragonfly;
pub mod error;
pub mod postgres;
pub mod territory_store;

pub use backend::TerritoryBackend;
pub use dragonfly::{DragonflyPool, DragonflyTerritoryStore};
pub use error::DbError;
pub use postgres::PostgresPool;
pub use territory_store::{PostgresTerritoryStore, TerritoryRow, WarRow};
