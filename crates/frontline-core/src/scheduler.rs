//! Render-trigger scheduler.
//!
//! Two timers drive the system. The primary timer runs a sync cycle every
//! poll interval and requests a render whenever the cycle changed at least
//! one territory. The fallback timer requests a render every fallback
//! interval regardless of changes, so the display never goes stale.
//!
//! # Concurrency
//!
//! - At most one cycle runs at a time. A primary tick that finds the
//!   previous cycle still in flight is skipped, not queued.
//! - Renders are spawned as tasks and serialized among themselves by a
//!   render lock. A render never blocks a timer, and a failed render
//!   never stops one.
//! - [`Scheduler::stop`] cancels both timers together and waits for every
//!   in-flight cycle and render task.
//!
//! All mutable scheduler state lives in one [`SchedulerState`] held in an
//! [`Arc`]; nothing is process-global, so independent schedulers can run
//! side by side in tests.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use frontline_types::ConquerStatus;

use crate::config::ScheduleConfig;
use crate::render::{RenderError, Renderer};
use crate::source::WarSource;
use crate::store::{StoreError, TerritoryStore};
use crate::sync::{CycleError, CycleSummary, SyncEngine};

/// Render reason used for the render that follows the first cycle.
pub const INITIAL_RENDER_REASON: &str = "Initial generation";

/// Render reason used by the fallback timer.
pub const FALLBACK_RENDER_REASON: &str = "Scheduled fallback";

/// Render reason for a cycle that changed `changed` territories.
pub fn change_render_reason(changed: u32) -> String {
    format!("{changed} town changes")
}

// ---------------------------------------------------------------------------
// Events and callbacks
// ---------------------------------------------------------------------------

/// Outcome of one render attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderEvent {
    /// Why the render was requested.
    pub reason: String,
    /// Whether an image was written.
    pub success: bool,
    /// Location of the image on success.
    pub artifact_path: Option<String>,
    /// Error description on failure.
    pub error: Option<String>,
    /// When the attempt finished.
    pub at: DateTime<Utc>,
    /// Wall time of the attempt.
    pub duration_ms: u64,
}

/// Observer of scheduler activity.
///
/// Called from scheduler tasks; implementations must not block.
pub trait CycleCallback: Send + Sync {
    /// A cycle completed.
    fn on_cycle(&self, summary: &CycleSummary);

    /// A cycle failed before reconciling any region.
    fn on_cycle_error(&self, _error: &CycleError) {}

    /// A render attempt finished, successfully or not.
    fn on_render(&self, event: &RenderEvent);
}

/// A callback that ignores everything.
pub struct NoOpCallback;

impl CycleCallback for NoOpCallback {
    fn on_cycle(&self, _summary: &CycleSummary) {}

    fn on_render(&self, _event: &RenderEvent) {}
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Timer periods for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Period of the sync cycle timer.
    pub poll_interval: Duration,
    /// Period of the unconditional render timer.
    pub fallback_render_interval: Duration,
}

impl From<&ScheduleConfig> for SchedulerConfig {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            fallback_render_interval: config.fallback_render_interval(),
        }
    }
}

/// Shared mutable scheduler state.
#[derive(Debug, Default)]
pub struct SchedulerState {
    /// Whether the timers are armed.
    running: AtomicBool,

    /// Held while a cycle runs. See [`SchedulerState::try_begin_cycle`].
    cycle_in_progress: AtomicBool,

    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    ticks_skipped: AtomicU64,
    renders_completed: AtomicU64,
    renders_failed: AtomicU64,

    started_at: Mutex<Option<DateTime<Utc>>>,
    last_cycle: Mutex<Option<CycleSummary>>,
    last_cycle_error: Mutex<Option<String>>,
    last_render: Mutex<Option<RenderEvent>>,
}

/// Releases the cycle gate when dropped.
#[derive(Debug)]
pub struct CycleGuard {
    state: Arc<SchedulerState>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.state.cycle_in_progress.store(false, Ordering::Release);
    }
}

impl SchedulerState {
    // -----------------------------------------------------------------------
    // Cycle gate
    // -----------------------------------------------------------------------

    /// Take the cycle gate, or return `None` if a cycle is in flight.
    pub fn try_begin_cycle(self: &Arc<Self>) -> Option<CycleGuard> {
        self.cycle_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard {
                state: Arc::clone(self),
            })
    }

    /// Whether a cycle currently holds the gate.
    pub fn is_cycle_in_progress(&self) -> bool {
        self.cycle_in_progress.load(Ordering::Acquire)
    }

    /// Whether the timers are armed.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    async fn record_cycle(&self, summary: &CycleSummary) {
        self.cycles_completed.fetch_add(1, Ordering::AcqRel);
        *self.last_cycle.lock().await = Some(summary.clone());
        *self.last_cycle_error.lock().await = None;
    }

    async fn record_cycle_error(&self, err: &CycleError) {
        self.cycles_failed.fetch_add(1, Ordering::AcqRel);
        *self.last_cycle_error.lock().await = Some(err.to_string());
    }

    async fn record_render(&self, event: &RenderEvent) {
        if event.success {
            self.renders_completed.fetch_add(1, Ordering::AcqRel);
        } else {
            self.renders_failed.fetch_add(1, Ordering::AcqRel);
        }
        *self.last_render.lock().await = Some(event.clone());
    }
}

/// Serializable view of the scheduler for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Whether the timers are armed.
    pub running: bool,
    /// Whether a cycle is in flight.
    pub cycle_in_progress: bool,
    /// Primary timer period.
    pub poll_interval_ms: u64,
    /// Fallback timer period.
    pub fallback_render_interval_ms: u64,
    /// When the scheduler was last started.
    pub started_at: Option<DateTime<Utc>>,
    /// Cycles that completed.
    pub cycles_completed: u64,
    /// Cycles that failed.
    pub cycles_failed: u64,
    /// Primary ticks skipped because a cycle was in flight.
    pub ticks_skipped: u64,
    /// Renders that wrote an image.
    pub renders_completed: u64,
    /// Renders that failed.
    pub renders_failed: u64,
    /// Most recent completed cycle.
    pub last_cycle: Option<CycleSummary>,
    /// Error of the most recent cycle, cleared by the next success.
    pub last_cycle_error: Option<String>,
    /// Most recent render attempt.
    pub last_render: Option<RenderEvent>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Inner<S, T, R> {
    engine: SyncEngine<S, T>,
    renderer: Arc<R>,
    callback: Arc<dyn CycleCallback>,
    config: SchedulerConfig,
    state: Arc<SchedulerState>,
    render_lock: Mutex<()>,
    shutdown: watch::Sender<bool>,
    tasks: std::sync::Mutex<JoinSet<()>>,
    lifecycle: Mutex<()>,
}

/// Drives sync cycles and renders on two timers.
///
/// Cloning yields another handle to the same scheduler.
pub struct Scheduler<S, T, R> {
    inner: Arc<Inner<S, T, R>>,
}

impl<S, T, R> Clone for Scheduler<S, T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn first_fire(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period).unwrap_or(now)
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl<S, T, R> Scheduler<S, T, R>
where
    S: WarSource + 'static,
    T: TerritoryStore + 'static,
    R: Renderer + 'static,
{
    /// Create a stopped scheduler.
    pub fn new(
        engine: SyncEngine<S, T>,
        renderer: Arc<R>,
        config: SchedulerConfig,
        callback: Arc<dyn CycleCallback>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                engine,
                renderer,
                callback,
                config,
                state: Arc::new(SchedulerState::default()),
                render_lock: Mutex::new(()),
                shutdown,
                tasks: std::sync::Mutex::new(JoinSet::new()),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    /// The shared state record.
    pub fn state(&self) -> &Arc<SchedulerState> {
        &self.inner.state
    }

    /// Run the initial cycle and render, then arm both timers.
    ///
    /// Returns `false` (and does nothing) if already running.
    pub async fn start(&self) -> bool {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;
        if inner.state.running.swap(true, Ordering::AcqRel) {
            warn!("Scheduler already running");
            return false;
        }

        info!(
            poll_interval_ms = u64::try_from(inner.config.poll_interval.as_millis()).unwrap_or(u64::MAX),
            fallback_render_interval_ms =
                u64::try_from(inner.config.fallback_render_interval.as_millis()).unwrap_or(u64::MAX),
            "Starting scheduler"
        );
        *inner.state.started_at.lock().await = Some(Utc::now());
        inner.shutdown.send_replace(false);

        if let Some(guard) = inner.state.try_begin_cycle() {
            inner.run_and_record().await;
            drop(guard);
        }
        inner.render_now(INITIAL_RENDER_REASON).await;

        let primary = Arc::clone(inner);
        let primary_shutdown = inner.shutdown.subscribe();
        inner.spawn_tracked(async move { primary.primary_loop(primary_shutdown).await });

        let fallback = Arc::clone(inner);
        let fallback_shutdown = inner.shutdown.subscribe();
        inner.spawn_tracked(async move { fallback.fallback_loop(fallback_shutdown).await });

        true
    }

    /// Cancel both timers and wait for in-flight cycles and renders.
    ///
    /// Returns `false` if the scheduler was not running.
    pub async fn stop(&self) -> bool {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;
        let was_running = inner.state.running.swap(false, Ordering::AcqRel);
        inner.shutdown.send_replace(true);
        inner.drain_tasks().await;
        if was_running {
            info!("Scheduler stopped");
        }
        was_running
    }

    /// Stop, then release the store.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.stop().await;
        self.inner.engine.store().close().await
    }

    /// Render the current snapshot now and wait for the result.
    pub async fn trigger_render(&self, reason: &str) -> RenderEvent {
        self.inner.render_now(reason).await
    }

    /// Read-only copy of every territory record.
    pub async fn conquer_status(&self) -> Result<ConquerStatus, StoreError> {
        self.inner.engine.store().read_snapshot().await
    }

    /// Snapshot of counters and the latest cycle and render.
    pub async fn status(&self) -> SchedulerStatus {
        let state = &self.inner.state;
        let config = &self.inner.config;
        SchedulerStatus {
            running: state.is_running(),
            cycle_in_progress: state.is_cycle_in_progress(),
            poll_interval_ms: u64::try_from(config.poll_interval.as_millis()).unwrap_or(u64::MAX),
            fallback_render_interval_ms: u64::try_from(config.fallback_render_interval.as_millis())
                .unwrap_or(u64::MAX),
            started_at: *state.started_at.lock().await,
            cycles_completed: state.cycles_completed.load(Ordering::Acquire),
            cycles_failed: state.cycles_failed.load(Ordering::Acquire),
            ticks_skipped: state.ticks_skipped.load(Ordering::Acquire),
            renders_completed: state.renders_completed.load(Ordering::Acquire),
            renders_failed: state.renders_failed.load(Ordering::Acquire),
            last_cycle: state.last_cycle.lock().await.clone(),
            last_cycle_error: state.last_cycle_error.lock().await.clone(),
            last_render: state.last_render.lock().await.clone(),
        }
    }
}

impl<S, T, R> Inner<S, T, R>
where
    S: WarSource + 'static,
    T: TerritoryStore + 'static,
    R: Renderer + 'static,
{
    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    async fn primary_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.poll_interval;
        let mut ticker = interval_at(first_fire(period), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => self.on_poll_tick(),
            }
        }
        debug!("Poll timer stopped");
    }

    async fn fallback_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.fallback_render_interval;
        let mut ticker = interval_at(first_fire(period), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => self.dispatch_render(FALLBACK_RENDER_REASON.to_owned()),
            }
        }
        debug!("Fallback timer stopped");
    }

    fn on_poll_tick(self: &Arc<Self>) {
        let Some(guard) = self.state.try_begin_cycle() else {
            self.state.ticks_skipped.fetch_add(1, Ordering::AcqRel);
            debug!("Previous cycle still running, skipping tick");
            return;
        };

        let inner = Arc::clone(self);
        self.spawn_tracked(async move {
            let changed = inner.run_and_record().await;
            drop(guard);
            if let Some(changed) = changed.filter(|&n| n > 0) {
                inner.dispatch_render(change_render_reason(changed));
            }
        });
    }

    // -----------------------------------------------------------------------
    // Work
    // -----------------------------------------------------------------------

    /// Run one cycle and record its outcome. Returns the change count on
    /// success.
    async fn run_and_record(&self) -> Option<u32> {
        match self.engine.run_cycle().await {
            Ok(summary) => {
                self.state.record_cycle(&summary).await;
                self.callback.on_cycle(&summary);
                Some(summary.changed)
            }
            Err(err) => {
                error!(error = %err, "Sync cycle failed");
                self.state.record_cycle_error(&err).await;
                self.callback.on_cycle_error(&err);
                None
            }
        }
    }

    fn dispatch_render(self: &Arc<Self>, reason: String) {
        let inner = Arc::clone(self);
        self.spawn_tracked(async move {
            inner.render_now(&reason).await;
        });
    }

    async fn render_now(&self, reason: &str) -> RenderEvent {
        let _render = self.render_lock.lock().await;
        let clock = Instant::now();

        let result = match self.engine.store().read_snapshot().await {
            Ok(status) => self.renderer.render(&status, reason).await,
            Err(err) => Err(RenderError::Snapshot(err.to_string())),
        };

        let event = match result {
            Ok(artifact) => {
                info!(
                    reason,
                    path = %artifact.path.display(),
                    duration_ms = artifact.duration_ms,
                    "PNG generated"
                );
                RenderEvent {
                    reason: reason.to_owned(),
                    success: true,
                    artifact_path: Some(artifact.path.display().to_string()),
                    error: None,
                    at: artifact.rendered_at,
                    duration_ms: artifact.duration_ms,
                }
            }
            Err(err) => {
                error!(reason, error = %err, "PNG generation failed");
                RenderEvent {
                    reason: reason.to_owned(),
                    success: false,
                    artifact_path: None,
                    error: Some(err.to_string()),
                    at: Utc::now(),
                    duration_ms: elapsed_ms(clock),
                }
            }
        };

        self.state.record_render(&event).await;
        self.callback.on_render(&event);
        event
    }

    // -----------------------------------------------------------------------
    // Task tracking
    // -----------------------------------------------------------------------

    fn spawn_tracked<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Await every tracked task, including ones spawned while draining.
    async fn drain_tasks(&self) {
        loop {
            let mut batch = {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *tasks)
            };
            if batch.is_empty() {
                break;
            }
            while let Some(joined) = batch.join_next().await {
                if let Err(err) = joined {
                    error!(error = %err, "Scheduler task panicked");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// Object-safe handle to a running scheduler, used by the observer.
pub trait Control: Send + Sync {
    /// See [`Scheduler::start`].
    fn start(&self) -> BoxFuture<'_, bool>;

    /// See [`Scheduler::stop`].
    fn stop(&self) -> BoxFuture<'_, bool>;

    /// See [`Scheduler::trigger_render`].
    fn trigger_render(&self, reason: String) -> BoxFuture<'_, RenderEvent>;

    /// See [`Scheduler::status`].
    fn status(&self) -> BoxFuture<'_, SchedulerStatus>;

    /// See [`Scheduler::conquer_status`].
    fn conquer_status(&self) -> BoxFuture<'_, Result<ConquerStatus, StoreError>>;
}

impl<S, T, R> Control for Scheduler<S, T, R>
where
    S: WarSource + 'static,
    T: TerritoryStore + 'static,
    R: Renderer + 'static,
{
    fn start(&self) -> BoxFuture<'_, bool> {
        Self::start(self).boxed()
    }

    fn stop(&self) -> BoxFuture<'_, bool> {
        Self::stop(self).boxed()
    }

    fn trigger_render(&self, reason: String) -> BoxFuture<'_, RenderEvent> {
        async move { Self::trigger_render(self, &reason).await }.boxed()
    }

    fn status(&self) -> BoxFuture<'_, SchedulerStatus> {
        Self::status(self).boxed()
    }

    fn conquer_status(&self) -> BoxFuture<'_, Result<ConquerStatus, StoreError>> {
        Self::conquer_status(self).boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use frontline_types::{IconCatalog, RawEntity};

    use super::*;
    use crate::render::RecordingRenderer;
    use crate::source::ScriptedWarSource;
    use crate::store::MemoryTerritoryStore;
    use crate::sync::SyncOptions;

    type TestScheduler = Scheduler<ScriptedWarSource, MemoryTerritoryStore, RecordingRenderer>;

    struct Harness {
        source: Arc<ScriptedWarSource>,
        store: Arc<MemoryTerritoryStore>,
        renderer: Arc<RecordingRenderer>,
        scheduler: TestScheduler,
    }

    fn town(team: &str) -> RawEntity {
        RawEntity {
            type_id: 56,
            x: 0.25,
            y: 0.75,
            team_id: team.to_owned(),
            flags: 0,
        }
    }

    fn harness(poll: Duration, fallback: Duration) -> Harness {
        let source = Arc::new(ScriptedWarSource::new(110));
        let store = Arc::new(MemoryTerritoryStore::new());
        let renderer = Arc::new(RecordingRenderer::new());
        let engine = SyncEngine::new(
            Arc::clone(&source),
            Arc::clone(&store),
            IconCatalog::war_api(),
            SyncOptions::default(),
        );
        let scheduler = Scheduler::new(
            engine,
            Arc::clone(&renderer),
            SchedulerConfig {
                poll_interval: poll,
                fallback_render_interval: fallback,
            },
            Arc::new(NoOpCallback),
        );
        Harness {
            source,
            store,
            renderer,
            scheduler,
        }
    }

    fn default_harness() -> Harness {
        harness(Duration::from_secs(5), Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_initial_cycle_and_render() {
        let h = default_harness();
        h.source.set_region("A", vec![town("WARDENS")]);

        assert!(h.scheduler.start().await);
        assert_eq!(h.renderer.reasons(), vec![INITIAL_RENDER_REASON]);
        assert_eq!(h.renderer.calls().first().map(|c| c.territories), Some(1));

        let status = h.scheduler.status().await;
        assert!(status.running);
        assert_eq!(status.cycles_completed, 1);
        assert_eq!(status.renders_completed, 1);

        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_ignored() {
        let h = default_harness();
        assert!(h.scheduler.start().await);
        assert!(!h.scheduler.start().await);
        assert_eq!(h.renderer.reasons(), vec![INITIAL_RENDER_REASON]);
        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn change_triggers_render_and_quiet_cycle_does_not() {
        let h = default_harness();
        h.source.set_region("A", vec![town("WARDENS")]);
        h.scheduler.start().await;

        h.source.set_region("A", vec![town("COLONIALS")]);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(
            h.renderer.reasons(),
            vec![INITIAL_RENDER_REASON, "1 town changes"]
        );

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(h.renderer.reasons().len(), 2);
        assert!(h.scheduler.status().await.cycles_completed >= 5);

        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_renders_without_touching_the_store() {
        let h = harness(Duration::from_secs(3600), Duration::from_secs(300));
        h.source.set_region("A", vec![town("WARDENS")]);
        h.scheduler.start().await;
        let writes = h.store.writes();

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(
            h.renderer.reasons(),
            vec![INITIAL_RENDER_REASON, FALLBACK_RENDER_REASON]
        );
        assert_eq!(h.store.writes(), writes);

        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cycle_skips_ticks_instead_of_overlapping() {
        let h = harness(Duration::from_millis(50), Duration::from_secs(300));
        h.source.set_region("A", vec![town("WARDENS")]);
        h.source.set_delay(Duration::from_millis(300));
        h.scheduler.start().await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        h.scheduler.stop().await;

        let status = h.scheduler.status().await;
        assert!(status.ticks_skipped > 0);
        assert_eq!(h.source.max_concurrent_region_lists(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_render_does_not_hold_back_cycles() {
        let h = default_harness();
        h.source.set_region("A", vec![town("WARDENS")]);
        h.scheduler.start().await;

        h.renderer.set_delay(Duration::from_secs(30));
        h.source.set_region("A", vec![town("COLONIALS")]);
        tokio::time::sleep(Duration::from_secs(26)).await;

        let status = h.scheduler.status().await;
        assert!(status.cycles_completed >= 5);
        assert_eq!(status.ticks_skipped, 0);
        assert_eq!(status.renders_completed, 1);
        assert_eq!(h.renderer.reasons(), vec![INITIAL_RENDER_REASON]);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(
            h.renderer.reasons(),
            vec![INITIAL_RENDER_REASON, "1 town changes"]
        );
        assert_eq!(h.scheduler.status().await.renders_completed, 2);

        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_render_does_not_stop_cycles() {
        let h = default_harness();
        h.source.set_region("A", vec![town("WARDENS")]);
        h.renderer.set_failing(true);
        h.scheduler.start().await;
        assert_eq!(h.scheduler.status().await.renders_failed, 1);

        h.source.set_region("A", vec![town("COLONIALS")]);
        tokio::time::sleep(Duration::from_secs(6)).await;
        h.source.set_region("A", vec![town("WARDENS")]);
        tokio::time::sleep(Duration::from_secs(5)).await;

        let status = h.scheduler.status().await;
        assert_eq!(status.renders_failed, 3);
        assert_eq!(status.renders_completed, 0);
        assert!(status.cycles_completed >= 3);
        assert!(status.last_render.is_some_and(|r| r.error.is_some()));

        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_both_timers() {
        let h = default_harness();
        h.scheduler.start().await;
        assert!(h.scheduler.stop().await);
        assert!(!h.scheduler.status().await.running);

        let renders = h.renderer.calls().len();
        let cycles = h.source.region_list_calls();
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(h.renderer.calls().len(), renders);
        assert_eq!(h.source.region_list_calls(), cycles);
        assert!(!h.scheduler.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_is_counted_and_next_tick_retries() {
        let h = default_harness();
        h.source.fail_war();
        h.scheduler.start().await;

        let status = h.scheduler.status().await;
        assert_eq!(status.cycles_failed, 1);
        assert!(status.last_cycle_error.is_some());
        assert_eq!(h.renderer.reasons(), vec![INITIAL_RENDER_REASON]);

        h.source.set_war_number(110);
        tokio::time::sleep(Duration::from_secs(6)).await;
        let status = h.scheduler.status().await;
        assert_eq!(status.cycles_completed, 1);
        assert!(status.last_cycle_error.is_none());

        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn capture_sequence_renders_once_per_change() {
        let h = default_harness();
        h.scheduler.start().await;

        h.source.set_region("A", vec![town("WARDENS")]);
        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        h.source.set_region("A", vec![town("COLONIALS")]);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(
            h.renderer.reasons(),
            vec![INITIAL_RENDER_REASON, "1 town changes", "1 town changes"]
        );
        let status = h.scheduler.conquer_status().await.unwrap();
        assert_eq!(status.len(), 1);

        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_render_works_while_stopped() {
        let h = default_harness();
        let event = Control::trigger_render(&h.scheduler, String::from("Operator request")).await;
        assert!(event.success);
        assert_eq!(h.renderer.reasons(), vec!["Operator request"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_the_store() {
        let h = default_harness();
        h.scheduler.start().await;
        h.scheduler.shutdown().await.unwrap();
        assert!(h.store.read_snapshot().await.is_err());
    }

    #[test]
    fn change_reason_format() {
        assert_eq!(change_render_reason(3), "3 town changes");
    }
}
