//! Axum router construction for the Observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, operator, ws};

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws/cycles` -- `WebSocket` cycle and render stream
/// - `GET /api/status` -- scheduler status
/// - `GET /api/territories` -- territory records
/// - `GET /api/regions` -- per-region counts
/// - `POST /api/operator/start`, `/stop`, `/render` -- operator control
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // WebSocket
        .route("/ws/cycles", get(ws::ws_cycles))
        // REST API
        .route("/api/status", get(handlers::get_status))
        .route("/api/territories", get(handlers::list_territories))
        .route("/api/regions", get(handlers::list_regions))
        // Operator
        .route("/api/operator/start", post(operator::start))
        .route("/api/operator/stop", post(operator::stop))
        .route("/api/operator/render", post(operator::render))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
