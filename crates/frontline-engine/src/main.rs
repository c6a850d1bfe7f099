//! Engine binary for the Frontline territory tracker.
//!
//! Wires the War API client, the territory store, the e-paper renderer,
//! and the observer around one scheduler, then runs until `Ctrl-C` or
//! `SIGTERM`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `frontline-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Open the configured territory store
//! 4. Build the War API client and the renderer
//! 5. Assemble the sync engine and scheduler
//! 6. Start the Observer API server
//! 7. Start the scheduler (initial cycle and render)
//! 8. Wait for a shutdown signal, drain the observer, then stop the
//!    scheduler and close the store

mod error;

use std::path::Path;
use std::sync::Arc;

use frontline_core::config::{FrontlineConfig, LogFormat, LoggingConfig};
use frontline_core::scheduler::{Scheduler, SchedulerConfig};
use frontline_core::sync::{SyncEngine, SyncOptions};
use frontline_db::TerritoryBackend;
use frontline_observer::{AppState, BroadcastCallback, ServerConfig};
use frontline_render::EpaperRenderer;
use frontline_source::WarApiClient;
use frontline_types::IconCatalog;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Configuration file looked up in the working directory.
const CONFIG_FILE: &str = "frontline-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step fails or the store cannot
/// be closed cleanly.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        war_api = config.source.base_url,
        poll_interval_ms = config.schedule.poll_interval_ms,
        fallback_render_interval_ms = config.schedule.fallback_render_interval_ms,
        "frontline-engine starting"
    );

    // 3. Open the territory store.
    let store = Arc::new(
        TerritoryBackend::connect(&config.storage)
            .await
            .map_err(EngineError::from)?,
    );
    info!(backend = store.name(), "Territory store ready");

    // 4. War API client and renderer.
    let source = Arc::new(WarApiClient::new(&config.source).map_err(EngineError::from)?);
    let renderer = Arc::new(EpaperRenderer::new(config.render.clone()).map_err(EngineError::from)?);
    info!(output = %renderer.output_path().display(), "Renderer ready");

    // 5. Sync engine and scheduler.
    let engine = SyncEngine::new(
        source,
        store,
        IconCatalog::war_api(),
        SyncOptions {
            max_concurrent_regions: config.source.max_concurrent_regions,
            reset_on_new_war: config.war.reset_on_new_war,
        },
    );
    let callback = BroadcastCallback::new();
    let scheduler = Scheduler::new(
        engine,
        renderer,
        SchedulerConfig::from(&config.schedule),
        Arc::new(callback.clone()),
    );

    // 6. Observer API server.
    let observer = if config.observer.enabled {
        let state = Arc::new(AppState::new(Arc::new(scheduler.clone()), &callback));
        let handle =
            frontline_observer::spawn_observer(&ServerConfig::from(&config.observer), state)
                .await
                .map_err(EngineError::from)?;
        info!(addr = %handle.local_addr(), "Observer ready");
        Some(handle)
    } else {
        info!("Observer disabled");
        None
    };

    // 7. Run.
    scheduler.start().await;

    // 8. Shut down.
    let signal = shutdown_signal().await;
    info!("Shutdown requested");
    if let Some(handle) = observer {
        handle.shutdown().await;
    }
    scheduler.shutdown().await.map_err(EngineError::from)?;
    signal?;

    info!("frontline-engine shutdown complete");
    Ok(())
}

/// Load configuration from [`CONFIG_FILE`].
///
/// Looks for the file relative to the current working directory. When it
/// is missing, defaults are used and environment overrides still apply.
fn load_config() -> Result<FrontlineConfig, EngineError> {
    let config_path = Path::new(CONFIG_FILE);
    if config_path.exists() {
        Ok(FrontlineConfig::from_file(config_path)?)
    } else {
        let mut config = FrontlineConfig::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Resolve on `Ctrl-C` or, on Unix, `SIGTERM`.
///
/// A handler that cannot be installed is reported after shutdown has run,
/// so the process still stops cleanly.
async fn shutdown_signal() -> Result<(), EngineError> {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.map_err(|e| EngineError::Signal {
            message: format!("failed to listen for Ctrl-C: {e}"),
        })
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<Result<(), EngineError>>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<(), EngineError>>();

    tokio::select! {
        result = ctrl_c => result,
        result = terminate => result,
    }
}
