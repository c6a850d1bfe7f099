//! Shared type definitions for the Frontline territory tracker.
//!
//! This crate is the single source of truth for the data model shared by
//! the War API client, the territory stores, the sync engine, and the
//! observer. Types flow downstream to `TypeScript` via `ts-rs` for the
//! status dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Region and cycle identifiers
//! - [`enums`] -- The [`Team`] enumeration and raw team resolution
//! - [`icons`] -- Map icon metadata ([`IconCatalog`]) deciding which
//!   markers are conquerable
//! - [`structs`] -- War, raw entities, territory records, and the
//!   [`ConquerStatus`] snapshot

pub mod enums;
pub mod icons;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::Team;
pub use icons::{IconCatalog, IconType};
pub use ids::{CycleId, RegionId};
pub use structs::{
    ConquerStatus, RawEntity, RegionSnapshot, TerritoryKey, TerritoryRecord, UpsertOutcome, War,
    WarState,
};
