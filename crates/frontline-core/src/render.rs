//! Renderer trait and a recording implementation.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use frontline_types::ConquerStatus;

/// Errors raised while producing an image.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The SVG template failed to load or evaluate.
    #[error("template error: {0}")]
    Template(String),

    /// Reading or writing an output file failed.
    #[error("render I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The rasterizer exited unsuccessfully.
    #[error("rasterizer failed: {0}")]
    Command(String),

    /// The rasterizer did not finish in time.
    #[error("rasterizer timed out after {timeout_ms} ms")]
    Timeout {
        /// The configured limit.
        timeout_ms: u64,
    },

    /// The territory snapshot to render could not be read.
    #[error("could not read territory snapshot: {0}")]
    Snapshot(String),
}

/// A finished image on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderArtifact {
    /// Location of the written image.
    pub path: PathBuf,
    /// When the image was completed.
    pub rendered_at: DateTime<Utc>,
    /// Wall time spent rendering.
    pub duration_ms: u64,
}

/// Produces an image from a territory snapshot.
pub trait Renderer: Send + Sync {
    /// Render `status`. `reason` is informational and ends up in logs.
    fn render(
        &self,
        status: &ConquerStatus,
        reason: &str,
    ) -> impl Future<Output = Result<RenderArtifact, RenderError>> + Send;
}

// ---------------------------------------------------------------------------
// RecordingRenderer
// ---------------------------------------------------------------------------

/// One call received by a [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderCall {
    /// Reason passed by the caller.
    pub reason: String,
    /// Number of territories in the rendered snapshot.
    pub territories: usize,
}

/// A renderer that records its calls instead of drawing anything.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    calls: Mutex<Vec<RenderCall>>,
    fail: AtomicBool,
    delay: Mutex<Duration>,
}

impl RecordingRenderer {
    /// Create a renderer with no recorded calls.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<RenderCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<RenderCall> {
        self.lock_calls().clone()
    }

    /// Reasons of every call so far, in order.
    pub fn reasons(&self) -> Vec<String> {
        self.lock_calls().iter().map(|c| c.reason.clone()).collect()
    }

    /// Make subsequent renders fail (`true`) or succeed (`false`).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Release);
    }

    /// Sleep for `delay` inside every render.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }
}

impl Renderer for RecordingRenderer {
    async fn render(
        &self,
        status: &ConquerStatus,
        reason: &str,
    ) -> Result<RenderArtifact, RenderError> {
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.lock_calls().push(RenderCall {
            reason: reason.to_owned(),
            territories: status.len(),
        });

        if self.fail.load(Ordering::Acquire) {
            return Err(RenderError::Command(String::from("scripted failure")));
        }

        Ok(RenderArtifact {
            path: PathBuf::from("recorded.png"),
            rendered_at: Utc::now(),
            duration_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        })
    }
}
