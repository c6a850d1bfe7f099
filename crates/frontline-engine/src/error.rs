//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and shutdown.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: frontline_core::config::ConfigError,
    },

    /// The territory store could not be opened.
    #[error("storage error: {source}")]
    Storage {
        /// The underlying database error.
        #[from]
        source: frontline_db::DbError,
    },

    /// The War API client could not be built.
    #[error("source error: {source}")]
    Source {
        /// The underlying source error.
        #[from]
        source: frontline_core::source::SourceError,
    },

    /// The renderer could not be built.
    #[error("render error: {source}")]
    Render {
        /// The underlying render error.
        #[from]
        source: frontline_core::render::RenderError,
    },

    /// Observer API server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying server error.
        #[from]
        source: frontline_observer::ServerError,
    },

    /// The store failed to close during shutdown.
    #[error("shutdown error: {source}")]
    Shutdown {
        /// The underlying store error.
        #[from]
        source: frontline_core::store::StoreError,
    },

    /// Installing a signal handler failed.
    #[error("signal error: {message}")]
    Signal {
        /// Description of the failure.
        message: String,
    },
}
