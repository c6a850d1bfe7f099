//! Shared application state for the Observer API server.
//!
//! [`AppState`] holds the scheduler control handle and the broadcast
//! channel that feeds `WebSocket` clients. [`BroadcastCallback`] is the
//! scheduler-side half of that channel: it is handed to the scheduler at
//! construction and publishes every cycle and render it reports.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use frontline_core::scheduler::{Control, CycleCallback, RenderEvent};
use frontline_core::sync::{CycleError, CycleSummary};
use tokio::sync::broadcast;

/// Capacity of the broadcast channel for cycle messages.
///
/// If a subscriber falls behind by more than this many messages it will
/// receive a [`broadcast::error::RecvError::Lagged`] and skip to the
/// newest message.
const BROADCAST_CAPACITY: usize = 256;

/// JSON message pushed over the `WebSocket`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CycleBroadcast {
    /// A cycle completed.
    Cycle {
        /// The cycle's aggregate result.
        summary: CycleSummary,
    },
    /// A cycle failed before reconciling any region.
    CycleFailed {
        /// Error description.
        error: String,
        /// When the failure was reported.
        at: DateTime<Utc>,
    },
    /// A render attempt finished.
    Render {
        /// The attempt's outcome.
        event: RenderEvent,
    },
}

/// [`CycleCallback`] that republishes scheduler activity to observers.
#[derive(Clone)]
pub struct BroadcastCallback {
    tx: broadcast::Sender<CycleBroadcast>,
}

impl BroadcastCallback {
    /// Create a callback with a fresh channel.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    fn publish(&self, message: CycleBroadcast) {
        // send fails only when nobody is subscribed.
        if self.tx.send(message).is_err() {
            tracing::trace!("No cycle subscribers");
        }
    }
}

impl Default for BroadcastCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleCallback for BroadcastCallback {
    fn on_cycle(&self, summary: &CycleSummary) {
        self.publish(CycleBroadcast::Cycle {
            summary: summary.clone(),
        });
    }

    fn on_cycle_error(&self, error: &CycleError) {
        self.publish(CycleBroadcast::CycleFailed {
            error: error.to_string(),
            at: Utc::now(),
        });
    }

    fn on_render(&self, event: &RenderEvent) {
        self.publish(CycleBroadcast::Render {
            event: event.clone(),
        });
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the running scheduler.
    pub control: Arc<dyn Control>,
    /// Broadcast sender shared with the scheduler's [`BroadcastCallback`].
    pub tx: broadcast::Sender<CycleBroadcast>,
}

impl AppState {
    /// Create application state that serves `control` and streams
    /// whatever `callback` publishes.
    pub fn new(control: Arc<dyn Control>, callback: &BroadcastCallback) -> Self {
        Self {
            control,
            tx: callback.tx.clone(),
        }
    }

    /// Subscribe to the cycle broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<CycleBroadcast> {
        self.tx.subscribe()
    }
}
