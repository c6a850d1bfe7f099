//! Core engine for the Frontline territory tracker.
//!
//! - [`config`]: YAML configuration with environment overrides.
//! - [`source`]: the [`WarSource`](source::WarSource) trait the engine
//!   reads remote war state through.
//! - [`store`]: the [`TerritoryStore`](store::TerritoryStore) trait and an
//!   in-memory store.
//! - [`render`]: the [`Renderer`](render::Renderer) trait.
//! - [`sync`]: one fetch-reconcile-aggregate cycle.
//! - [`scheduler`]: the poll and fallback timers that decide when to
//!   render.
//!
//! Concrete backends live in sibling crates: `frontline-source` (HTTP),
//! `frontline-db` (Postgres, Dragonfly), and `frontline-render`
//! (SVG + `ImageMagick`).

pub mod config;
pub mod render;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod sync;
