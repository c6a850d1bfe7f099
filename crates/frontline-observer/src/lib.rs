//! Observer API server for the Frontline territory tracker.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws/cycles`) streaming every completed
//!   cycle, failed cycle, and render attempt via
//!   [`tokio::sync::broadcast`]
//! - **REST endpoints** for the scheduler status and the current
//!   territory snapshot
//! - **Operator REST endpoints** for starting and stopping the scheduler
//!   and forcing a render
//! - **Minimal HTML status page** (`GET /`)
//!
//! # Architecture
//!
//! Handlers talk to the scheduler only through the object-safe
//! [`Control`](frontline_core::scheduler::Control) handle held in
//! [`AppState`]. Territory reads go through the store's read-only
//! snapshot, so the observer never blocks a cycle. The scheduler pushes
//! activity into the broadcast channel through [`BroadcastCallback`].

pub mod error;
pub mod handlers;
pub mod operator;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError};
pub use startup::{ObserverHandle, spawn_observer};
pub use state::{AppState, BroadcastCallback, CycleBroadcast};
