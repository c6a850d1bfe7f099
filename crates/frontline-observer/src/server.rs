//! Observer HTTP server lifecycle management.
//!
//! [`serve`] runs the router until its shutdown future resolves, then
//! stops accepting and drains open requests before returning.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use frontline_core::config::ObserverConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Configuration for the Observer server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The host address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// The TCP port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ObserverConfig::default())
    }
}

impl From<&ObserverConfig> for ServerConfig {
    fn from(config: &ObserverConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

/// Bind the listener for `config`.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address is invalid or the port
/// cannot be bound.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ServerError::Bind(format!("invalid address: {e}")))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))
}

/// Serve the observer router on an already bound listener until
/// `shutdown` resolves and in-flight requests have finished.
///
/// # Errors
///
/// Returns [`ServerError::Serve`] if the server hits a fatal I/O error.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Observer server listening");
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    info!("Observer server stopped");
    Ok(())
}

/// Errors that can occur when starting or running the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bad_host_is_a_bind_error() {
        let config = ServerConfig {
            host: String::from("not a host"),
            port: 0,
        };
        assert!(matches!(bind(&config).await, Err(ServerError::Bind(_))));
    }

    #[tokio::test]
    async fn ephemeral_port_binds() {
        let config = ServerConfig {
            host: String::from("127.0.0.1"),
            port: 0,
        };
        let listener = bind(&config).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
