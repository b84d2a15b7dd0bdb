use crate::fetch::AttemptError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

const DEFAULT_LOG_DIRECTIVE: &str = "info";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    init_tracing_with_default(DEFAULT_LOG_DIRECTIVE);
}

/// Like [`init_tracing`], with `directive` used when `RUST_LOG` is unset or invalid.
pub fn init_tracing_with_default(directive: &str) {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let env_value = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(env_value.as_deref(), directive);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();

    let _ = TRACING_INIT.set(());
}

fn log_filter(env_value: Option<&str>, default_directive: &str) -> EnvFilter {
    env_value
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive))
}

/// Run-wide counters shared by the worker pool, the fetch strategy and the
/// orchestrator.
#[derive(Default, Debug)]
pub struct Telemetry {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    fallback_used: AtomicU64,
    connect_timeouts: AtomicU64,
    read_timeouts: AtomicU64,
    http_errors: AtomicU64,
    io_errors: AtomicU64,
    worker_faults: AtomicU64,
}

impl Telemetry {
    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, via_fallback: bool) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        if via_fallback {
            self.fallback_used.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt_failure(&self, err: &AttemptError) {
        let counter = match err {
            AttemptError::ConnectTimeout { .. } => &self.connect_timeouts,
            AttemptError::ReadTimeout { .. } => &self.read_timeouts,
            AttemptError::HttpStatus(_) => &self.http_errors,
            AttemptError::Connect(_)
            | AttemptError::UnsupportedScheme(_)
            | AttemptError::Incomplete { .. }
            | AttemptError::Io(_) => &self.io_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_fault(&self) {
        self.worker_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            fallback_used: self.fallback_used.load(Ordering::Relaxed),
            connect_timeouts: self.connect_timeouts.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            http_errors: self.http_errors.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
            worker_faults: self.worker_faults.load(Ordering::Relaxed),
        }
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn worker_faults(&self) -> u64 {
        self.worker_faults.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub fallback_used: u64,
    pub connect_timeouts: u64,
    pub read_timeouts: u64,
    pub http_errors: u64,
    pub io_errors: u64,
    pub worker_faults: u64,
}

impl TelemetrySnapshot {
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }

    pub fn in_flight(&self) -> u64 {
        self.dispatched.saturating_sub(self.completed())
    }
}

/// Spawns a background task that periodically logs throughput, progress and attempt failures.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    planned: usize,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; nothing useful to report yet.
        ticker.tick().await;

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(target: "fetchledger::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let completed_delta = current.completed().saturating_sub(last_snapshot.completed());
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        completed_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "fetchledger::metrics",
                        throughput = format!("{throughput:.2}"),
                        completed = current.completed(),
                        planned,
                        in_flight = current.in_flight(),
                        succeeded = current.succeeded,
                        failed = current.failed,
                        fallback_used = current.fallback_used,
                        connect_timeouts = current.connect_timeouts,
                        read_timeouts = current.read_timeouts,
                        http_errors = current.http_errors,
                        worker_faults = current.worker_faults,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
