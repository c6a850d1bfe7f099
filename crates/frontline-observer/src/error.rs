//! Error types for the Observer API server.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use frontline_core::store::StoreError;

/// Errors that can occur in the Observer API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// An invalid query parameter or request body was provided.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The territory store could not produce a snapshot.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A requested render did not produce an image.
    #[error("render failed: {0}")]
    Render(String),
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::InvalidQuery(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Store(StoreError::Closed) => {
                (StatusCode::SERVICE_UNAVAILABLE, StoreError::Closed.to_string())
            }
            Self::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Self::Render(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_store_is_service_unavailable() {
        let response = ObserverError::Store(StoreError::Closed).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn invalid_query_is_bad_request() {
        let response = ObserverError::InvalidQuery(String::from("team")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
