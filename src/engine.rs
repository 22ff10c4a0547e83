//! Monitor engine: tails one file and turns pattern matches into alerts.
//!
//! # Architecture
//!
//! ```text
//!                 +--------------------- poll loop task ----------------------+
//!  log file  -->  | LineSource -> LogRecord -> patterns -> WindowCounter      |
//!                 |                                  \-> AlertStore (upsert)  |
//!                 +------------------------------------------|----------------+
//!                                                            | new alert
//!                                                            v
//!                                   AlertQueue -> DispatchWorker -> handlers
//! ```
//!
//! The poll loop is the only writer of the window counters and the only
//! producer of alert upserts. Queries, acknowledgements and resolutions go
//! straight to the shared [`AlertStore`] from any task.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tailwatch::engine::MonitorEngine;
//!
//! # async fn example() -> Result<(), tailwatch::error::EngineError> {
//! let engine = MonitorEngine::builder("/var/log/app.log")
//!     .poll_interval(Duration::from_millis(200))
//!     .build()?;
//!
//! engine.start()?;
//! // ...
//! for alert in engine.active_alerts() {
//!     println!("{} {}", alert.severity, alert.message);
//! }
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::alert::{Alert, AlertStore, Upsert};
use crate::config::{DEFAULT_POLL_INTERVAL, RuntimeConfig};
use crate::error::{EngineError, StateError};
use crate::handler::{AlertHandler, AlertQueue, DEFAULT_QUEUE_CAPACITY, DispatchWorker, Handlers};
use crate::pattern::{PatternSpec, default_patterns, ensure_unique_names};
use crate::record::LogRecord;
use crate::source::{LineSource, StartPosition};
use crate::summary::{LineStats, MetricsSummary};
use crate::window::WindowCounter;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State owned by the poll loop while it runs.
///
/// Handed back to the engine on stop, so a restarted engine resumes from the
/// same file offset with the same windows.
#[derive(Debug)]
pub(crate) struct Pipeline {
    source: LineSource,
    windows: WindowCounter,
    patterns: Arc<Vec<PatternSpec>>,
    alerts: AlertStore,
    stats: Arc<Mutex<LineStats>>,
    queue: Option<AlertQueue>,
    /// Whether the last poll succeeded; failures are logged on transition.
    source_healthy: bool,
}

impl Pipeline {
    fn new(
        source: LineSource,
        patterns: Arc<Vec<PatternSpec>>,
        alerts: AlertStore,
        stats: Arc<Mutex<LineStats>>,
    ) -> Self {
        Self {
            windows: WindowCounter::for_patterns(&patterns),
            source,
            patterns,
            alerts,
            stats,
            queue: None,
            source_healthy: true,
        }
    }

    /// Poll the source once and process every new line.
    async fn tick(&mut self) {
        match self.source.poll().await {
            Ok(lines) => {
                if !self.source_healthy {
                    info!(path = %self.source.path().display(), "Log file readable again");
                    self.source_healthy = true;
                }
                if lines.is_empty() {
                    return;
                }
                let now = Utc::now();
                for line in &lines {
                    self.process_line(line, now);
                }
                metrics::counter!("tailwatch_lines_processed_total").increment(lines.len() as u64);
                metrics::gauge!("tailwatch_active_alerts").set(self.alerts.active_count() as f64);
            }
            Err(e) => {
                metrics::counter!("tailwatch_source_errors_total").increment(1);
                if self.source_healthy {
                    warn!(error = %e, "Cannot read log file, retrying on next poll");
                    self.source_healthy = false;
                } else {
                    debug!(error = %e, "Log file still unreadable");
                }
            }
        }
    }

    /// Evaluate one line against every pattern, at time `now`.
    pub(crate) fn process_line(&mut self, line: &str, now: DateTime<Utc>) {
        if line.trim().is_empty() {
            return;
        }
        let record = LogRecord::parse(line);
        let mut stats = lock(&self.stats);
        stats.observe(record.level());

        for pattern in self.patterns.iter() {
            if !pattern.matches(&record) {
                continue;
            }
            stats.record_match(pattern.name());
            metrics::counter!(
                "tailwatch_pattern_matches_total",
                "pattern" => pattern.name().to_string()
            )
            .increment(1);

            self.windows.record(pattern.name(), now);
            let count = u32::try_from(self.windows.count(pattern.name(), now)).unwrap_or(u32::MAX);

            if count >= pattern.threshold() {
                if let Upsert::Created(alert) = self.alerts.upsert(pattern, count, now, line) {
                    info!(
                        alert_id = %alert.id,
                        pattern = %alert.pattern_name,
                        severity = %alert.severity,
                        count = count,
                        "Alert triggered"
                    );
                    metrics::counter!(
                        "tailwatch_alerts_created_total",
                        "pattern" => alert.pattern_name.clone(),
                        "severity" => alert.severity.as_str()
                    )
                    .increment(1);
                    self.dispatch(alert);
                }
            } else if let Some(resolved) = self.alerts.downgrade_if_clear(pattern.name(), count) {
                info!(
                    alert_id = %resolved.id,
                    pattern = %resolved.pattern_name,
                    count = count,
                    threshold = resolved.threshold,
                    "Alert cleared, count back under threshold"
                );
                metrics::counter!(
                    "tailwatch_alerts_resolved_total",
                    "pattern" => resolved.pattern_name.clone()
                )
                .increment(1);
            }
        }
    }

    fn dispatch(&self, alert: Alert) {
        let Some(queue) = &self.queue else {
            return;
        };
        if let Err(e) = queue.send(alert) {
            warn!(error = %e, "Alert not dispatched to handlers");
        }
    }
}

async fn run_loop(
    mut pipeline: Pipeline,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> Pipeline {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        pattern_count = pipeline.patterns.len(),
        poll_interval_ms = poll_interval.as_millis() as u64,
        "Monitor loop started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => pipeline.tick().await,
        }
    }

    info!("Monitor loop stopped");
    pipeline
}

struct Running {
    cancel: CancellationToken,
    loop_task: JoinHandle<Pipeline>,
    since: Instant,
}

/// Puts a `Running` state back if `stop()` is dropped before the loop joins.
struct StopGuard<'a> {
    lifecycle: &'a Mutex<Lifecycle>,
    running: Option<Running>,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            *lock(self.lifecycle) = Lifecycle::Running(running);
        }
    }
}

enum Lifecycle {
    Stopped(Box<Pipeline>),
    Running(Running),
    /// `stop()` is waiting for the loop task.
    Stopping,
}

/// Real-time log monitor.
///
/// Construct with [`MonitorEngine::builder`] or
/// [`MonitorEngine::from_config`], then [`start`](Self::start) and
/// [`stop`](Self::stop) it as often as needed. Share it behind an `Arc`.
pub struct MonitorEngine {
    path: PathBuf,
    start_at: StartPosition,
    poll_interval: Duration,
    patterns: Arc<Vec<PatternSpec>>,
    handlers: Handlers,
    queue_capacity: usize,
    alerts: AlertStore,
    stats: Arc<Mutex<LineStats>>,
    lifecycle: Mutex<Lifecycle>,
    /// Time spent running in earlier start/stop cycles.
    uptime: Mutex<Duration>,
}

/// Builder for [`MonitorEngine`].
#[derive(Debug)]
pub struct MonitorEngineBuilder {
    path: PathBuf,
    poll_interval: Duration,
    start_at: StartPosition,
    patterns: Option<Vec<PatternSpec>>,
    handlers: Vec<Arc<dyn AlertHandler>>,
    queue_capacity: usize,
}

impl MonitorEngineBuilder {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn start_at(mut self, start: StartPosition) -> Self {
        self.start_at = start;
        self
    }

    /// Replace the pattern set. Without this the built-in catalogue is used.
    pub fn patterns(mut self, patterns: Vec<PatternSpec>) -> Self {
        self.patterns = Some(patterns);
        self
    }

    /// Add one pattern to the set (starting from an empty set).
    pub fn pattern(mut self, pattern: PatternSpec) -> Self {
        self.patterns.get_or_insert_with(Vec::new).push(pattern);
        self
    }

    /// Register a handler. Handlers run in registration order.
    pub fn handler(mut self, handler: Arc<dyn AlertHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handlers(mut self, handlers: impl IntoIterator<Item = Arc<dyn AlertHandler>>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// # Errors
    ///
    /// Rejects duplicate pattern names, a zero poll interval and a zero
    /// queue capacity.
    pub fn build(self) -> Result<MonitorEngine, EngineError> {
        let patterns = self.patterns.unwrap_or_else(default_patterns);
        ensure_unique_names(&patterns)?;
        if self.poll_interval.is_zero() {
            return Err(EngineError::InvalidPollInterval);
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::InvalidQueueCapacity);
        }

        let patterns = Arc::new(patterns);
        let alerts = AlertStore::new();
        let stats = Arc::new(Mutex::new(LineStats::default()));
        let pipeline = Pipeline::new(
            LineSource::new(&self.path, self.start_at),
            Arc::clone(&patterns),
            alerts.clone(),
            Arc::clone(&stats),
        );

        Ok(MonitorEngine {
            path: self.path,
            start_at: self.start_at,
            poll_interval: self.poll_interval,
            patterns,
            handlers: Arc::new(self.handlers),
            queue_capacity: self.queue_capacity,
            alerts,
            stats,
            lifecycle: Mutex::new(Lifecycle::Stopped(Box::new(pipeline))),
            uptime: Mutex::new(Duration::ZERO),
        })
    }
}

impl MonitorEngine {
    pub fn builder(path: impl Into<PathBuf>) -> MonitorEngineBuilder {
        MonitorEngineBuilder {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            start_at: StartPosition::default(),
            patterns: None,
            handlers: Vec::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Build an engine from compiled configuration and ready handlers.
    pub fn from_config(
        config: &RuntimeConfig,
        handlers: Vec<Arc<dyn AlertHandler>>,
    ) -> Result<Self, EngineError> {
        Self::builder(&config.path)
            .poll_interval(config.poll_interval)
            .start_at(config.start_at)
            .patterns(config.patterns.clone())
            .handlers(handlers)
            .queue_capacity(config.handlers.queue_capacity)
            .build()
    }

    /// Spawn the poll loop (and the dispatch worker if handlers exist).
    ///
    /// # Errors
    ///
    /// - `EngineError::AlreadyRunning` if started twice
    /// - `EngineError::NoRuntime` outside a tokio runtime
    pub fn start(&self) -> Result<(), EngineError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let mut lifecycle = lock(&self.lifecycle);
        let mut pipeline = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
            Lifecycle::Stopped(pipeline) => pipeline,
            other => {
                *lifecycle = other;
                return Err(EngineError::AlreadyRunning);
            }
        };

        let cancel = CancellationToken::new();

        // The pipeline holds the only queue sender, so the worker exits once
        // the pipeline drops it and the backlog is handled.
        if self.handlers.is_empty() {
            pipeline.queue = None;
        } else {
            let queue = AlertQueue::new(self.queue_capacity);
            let mut worker = DispatchWorker::new(&queue, Arc::clone(&self.handlers));
            pipeline.queue = Some(queue);
            runtime.spawn(
                async move { worker.run().await }
                    .instrument(tracing::info_span!("dispatch", path = %self.path.display())),
            );
        }

        let span = tracing::info_span!("monitor", path = %self.path.display());
        let loop_task = runtime.spawn(
            run_loop(*pipeline, self.poll_interval, cancel.clone()).instrument(span),
        );

        *lifecycle = Lifecycle::Running(Running {
            cancel,
            loop_task,
            since: Instant::now(),
        });
        info!(
            path = %self.path.display(),
            handler_count = self.handlers.len(),
            "Monitor engine started"
        );
        Ok(())
    }

    /// Signal the loop to stop and wait for it. No-op when not running.
    ///
    /// Returns within about one poll interval. Alerts already queued are
    /// still handed to the handlers afterwards, without delaying this call.
    /// Dropping the returned future before it completes leaves the engine
    /// running (with the loop already told to exit); call `stop()` again.
    pub async fn stop(&self) {
        let running = {
            let mut lifecycle = lock(&self.lifecycle);
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
                Lifecycle::Running(running) => running,
                other => {
                    *lifecycle = other;
                    return;
                }
            }
        };
        running.cancel.cancel();

        let mut guard = StopGuard {
            lifecycle: &self.lifecycle,
            running: Some(running),
        };
        let Some(running) = guard.running.as_mut() else {
            return;
        };
        let joined = (&mut running.loop_task).await;
        let since = running.since;
        guard.running = None;

        let mut pipeline = match joined {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!(error = %e, "Monitor loop ended abnormally, resetting read position");
                metrics::counter!("tailwatch_loop_failures_total").increment(1);
                Pipeline::new(
                    LineSource::new(&self.path, self.start_at),
                    Arc::clone(&self.patterns),
                    self.alerts.clone(),
                    Arc::clone(&self.stats),
                )
            }
        };
        if pipeline.queue.take().is_some() {
            debug!("Alert queue closed, dispatch worker finishing backlog");
        }

        *lock(&self.uptime) += since.elapsed();
        *lock(&self.lifecycle) = Lifecycle::Stopped(Box::new(pipeline));
        info!(path = %self.path.display(), "Monitor engine stopped");
    }

    /// Run in the foreground until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), EngineError> {
        self.start()?;
        cancel.cancelled().await;
        self.stop().await;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !matches!(*lock(&self.lifecycle), Lifecycle::Stopped(_))
    }

    pub fn patterns(&self) -> &[PatternSpec] {
        &self.patterns
    }

    /// Non-resolved alerts, oldest first.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts.active_alerts()
    }

    pub fn alert(&self, alert_id: &str) -> Option<Alert> {
        self.alerts.get(alert_id)
    }

    /// Every retained alert, newest first.
    pub fn alert_history(&self) -> Vec<Alert> {
        self.alerts.history()
    }

    pub fn acknowledge(&self, alert_id: &str) -> Result<Alert, StateError> {
        let alert = self.alerts.acknowledge(alert_id)?;
        info!(alert_id = %alert_id, pattern = %alert.pattern_name, "Alert acknowledged");
        Ok(alert)
    }

    pub fn resolve(&self, alert_id: &str) -> Result<Alert, StateError> {
        let alert = self.alerts.resolve(alert_id)?;
        info!(alert_id = %alert_id, pattern = %alert.pattern_name, "Alert resolved");
        metrics::gauge!("tailwatch_active_alerts").set(self.alerts.active_count() as f64);
        Ok(alert)
    }

    /// Counters so far plus current alerts. Works in any state.
    ///
    /// The log rate covers the total time spent running.
    pub fn metrics_summary(&self) -> MetricsSummary {
        let observed_for = *lock(&self.uptime) + self.current_run_time();
        let stats = lock(&self.stats).clone();
        stats.summarize(
            self.alerts.active_alerts(),
            self.alerts.active_count_by_severity(),
            observed_for,
        )
    }

    fn current_run_time(&self) -> Duration {
        match &*lock(&self.lifecycle) {
            Lifecycle::Running(running) => running.since.elapsed(),
            _ => Duration::ZERO,
        }
    }
}

impl Drop for MonitorEngine {
    fn drop(&mut self) {
        if let Lifecycle::Running(running) = &*lock(&self.lifecycle) {
            running.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for MonitorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorEngine")
            .field("path", &self.path)
            .field("poll_interval", &self.poll_interval)
            .field("patterns", &self.patterns.len())
            .field("handlers", &self.handlers.len())
            .field("running", &self.is_running())
            .finish()
    }
}
