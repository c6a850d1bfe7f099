//! Operator REST API handlers for runtime scheduler control.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/operator/start` | Run the initial cycle and arm the timers |
//! | `POST` | `/api/operator/stop` | Cancel the timers and drain in-flight work |
//! | `POST` | `/api/operator/render` | Render the current snapshot now |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use crate::error::ObserverError;
use crate::state::AppState;

/// Render reason used when the request does not supply one.
pub const MANUAL_RENDER_REASON: &str = "Manual trigger";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Optional request body for `POST /api/operator/render`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct RenderRequest {
    /// Text shown in the image footer.
    pub reason: Option<String>,
}

/// Generic success response.
#[derive(Debug, serde::Serialize)]
struct OperatorResponse {
    /// Whether the command changed anything.
    ok: bool,
    /// Human-readable message.
    message: String,
}

// ---------------------------------------------------------------------------
// POST /api/operator/start
// ---------------------------------------------------------------------------

/// Start the scheduler. Answers once the initial cycle and render are done.
pub async fn start(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let started = state.control.start().await;
    Json(OperatorResponse {
        ok: started,
        message: if started {
            "Scheduler started".to_owned()
        } else {
            "Scheduler already running".to_owned()
        },
    })
}

// ---------------------------------------------------------------------------
// POST /api/operator/stop
// ---------------------------------------------------------------------------

/// Stop the scheduler. The store stays open so reads keep working.
pub async fn stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stopped = state.control.stop().await;
    Json(OperatorResponse {
        ok: stopped,
        message: if stopped {
            "Scheduler stopped".to_owned()
        } else {
            "Scheduler was not running".to_owned()
        },
    })
}

// ---------------------------------------------------------------------------
// POST /api/operator/render
// ---------------------------------------------------------------------------

/// Render immediately and return the attempt's outcome.
///
/// Works whether or not the scheduler is running. A failed render is
/// reported as an error response carrying the renderer's message.
pub async fn render(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RenderRequest>>,
) -> Result<impl IntoResponse, ObserverError> {
    let reason = body
        .and_then(|Json(request)| request.reason)
        .map(|reason| reason.trim().to_owned())
        .filter(|reason| !reason.is_empty())
        .unwrap_or_else(|| MANUAL_RENDER_REASON.to_owned());

    let event = state.control.trigger_render(reason).await;
    if event.success {
        Ok(Json(event))
    } else {
        Err(ObserverError::Render(
            event
                .error
                .unwrap_or_else(|| String::from("renderer reported failure")),
        ))
    }
}
