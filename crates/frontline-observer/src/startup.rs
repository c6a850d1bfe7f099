//! Observer server startup helper for embedding in the engine binary.
//!
//! [`spawn_observer`] binds before spawning, so bind errors reach the
//! caller; serving then continues on a background Tokio task until
//! [`ObserverHandle::shutdown`] is called.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// How long [`ObserverHandle::shutdown`] waits for open requests to drain.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// A running observer server.
#[derive(Debug)]
pub struct ObserverHandle {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ObserverHandle {
    /// The address the server is listening on.
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight requests.
    ///
    /// The server task is aborted if it has not finished after
    /// [`SHUTDOWN_GRACE`].
    pub async fn shutdown(self) {
        let Self { stop, mut task, .. } = self;
        if stop.send(()).is_err() {
            tracing::debug!("Observer server already stopped");
        }
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Observer server task failed"),
            Err(_elapsed) => {
                tracing::warn!(
                    grace_ms = u64::try_from(SHUTDOWN_GRACE.as_millis()).unwrap_or(u64::MAX),
                    "Observer server did not drain in time, aborting"
                );
                task.abort();
            }
        }
    }
}

/// Bind the observer and serve it on a background task.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address cannot be bound.
pub async fn spawn_observer(
    config: &ServerConfig,
    state: Arc<AppState>,
) -> Result<ObserverHandle, ServerError> {
    let listener = server::bind(config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address: {e}")))?;
    let (stop, stopped) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown = async {
            // A dropped sender also stops the server.
            stopped.await.unwrap_or_default();
        };
        if let Err(e) = server::serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(%addr, "Observer server spawned on background task");

    Ok(ObserverHandle { addr, stop, task })
}
