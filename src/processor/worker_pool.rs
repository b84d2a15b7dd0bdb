//! Bounded worker pool for fetch jobs.
//!
//! Jobs go through a bounded queue so submission blocks once it is full.
//! Every job yields exactly one [`Completion`] on a shared channel, including
//! jobs whose strategy returned an error or panicked. Shutdown is staged:
//! wait for workers to finish, cancel and abort the stragglers, then give up
//! and report how many could not be stopped.

use crate::fetch::FetchStrategy;
use crate::runtime::telemetry::Telemetry;
use crate::work::{FetchOutcome, WorkItem, REASON_WORKER_FAULT};
use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;


/// A unit of work: fetch `item` into `destination`.
#[derive(Debug, Clone)]
pub struct Job {
    pub item: WorkItem,
    pub destination: PathBuf,
}

/// Who ran a job, attached to its completion and log span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub worker: usize,
    pub sequence: usize,
    pub id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub context: TaskContext,
    pub item: WorkItem,
    pub outcome: FetchOutcome,
    pub elapsed: Duration,
}

/// How the pool's workers stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ShutdownReport {
    /// Every worker exited within the grace period.
    Clean,
    /// Some workers had to be cancelled; all of them stopped.
    Forced,
    /// Workers still running after cancellation and the second grace period.
    Unclean { stuck: usize },
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        matches!(self, ShutdownReport::Clean)
    }
}

pub struct WorkerPoolParams {
    pub workers: usize,
    pub queue_capacity: usize,
    pub strategy: Arc<dyn FetchStrategy>,
    pub telemetry: Arc<Telemetry>,
}

pub struct WorkerPool {
    job_tx: Option<mpsc::Sender<Job>>,
    completion_rx: AsyncMutex<mpsc::UnboundedReceiver<Completion>>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    telemetry: Arc<Telemetry>,
    dispatched: AtomicU64,
}

/// Capacity reserved in the job queue; sending through it never waits.
pub struct SubmitPermit<'a> {
    permit: mpsc::Permit<'a, Job>,
    pool: &'a WorkerPool,
}

impl SubmitPermit<'_> {
    pub fn submit(self, job: Job) {
        self.permit.send(job);
        self.pool.record_dispatch();
    }
}

impl WorkerPool {
    /// Spawns the workers. Must be called from within a Tokio runtime.
    pub fn launch(params: WorkerPoolParams) -> Self {
        let WorkerPoolParams {
            workers,
            queue_capacity,
            strategy,
            telemetry,
        } = params;
        let workers = workers.max(1);

        let (job_tx, job_rx) = mpsc::channel(queue_capacity.max(1));
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let job_rx = Arc::new(AsyncMutex::new(job_rx));
        let cancel = CancellationToken::new();

        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    job_rx.clone(),
                    completion_tx.clone(),
                    strategy.clone(),
                    telemetry.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::debug!(workers, queue_capacity, "worker pool launched");

        Self {
            job_tx: Some(job_tx),
            completion_rx: AsyncMutex::new(completion_rx),
            workers: handles,
            cancel,
            telemetry,
            dispatched: AtomicU64::new(0),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Jobs accepted so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Queues a job, waiting while the queue is full.
    pub async fn submit(&self, job: Job) -> Result<()> {
        let tx = self.job_tx.as_ref().context("worker pool is shut down")?;
        tx.send(job)
            .await
            .map_err(|_| anyhow!("worker pool stopped accepting jobs"))?;
        self.record_dispatch();
        Ok(())
    }

    /// Waits for queue capacity without committing a job yet.
    ///
    /// Cancel-safe, so it can race other events in `select!`.
    pub async fn reserve(&self) -> Result<SubmitPermit<'_>> {
        let tx = self.job_tx.as_ref().context("worker pool is shut down")?;
        let permit = tx
            .reserve()
            .await
            .map_err(|_| anyhow!("worker pool stopped accepting jobs"))?;
        Ok(SubmitPermit { permit, pool: self })
    }

    /// Next finished job in completion order. `None` once every worker exited
    /// and all completions were taken.
    pub async fn next_completed(&self) -> Option<Completion> {
        self.completion_rx.lock().await.recv().await
    }

    pub async fn shutdown(mut self, grace: Duration, force_grace: Duration) -> ShutdownReport {
        // Closing the queue lets idle workers exit once it is drained.
        self.job_tx.take();
        let mut handles = std::mem::take(&mut self.workers);

        if timeout(grace, join_all(handles.iter_mut())).await.is_ok() {
            tracing::debug!("worker pool stopped");
            return ShutdownReport::Clean;
        }

        handles.retain(|handle| !handle.is_finished());
        tracing::warn!(
            remaining = handles.len(),
            grace_ms = grace.as_millis() as u64,
            "workers still running after grace period; cancelling"
        );
        self.cancel.cancel();
        for handle in &handles {
            handle.abort();
        }

        if timeout(force_grace, join_all(handles.iter_mut())).await.is_ok() {
            return ShutdownReport::Forced;
        }

        let stuck = handles.iter().filter(|handle| !handle.is_finished()).count();
        tracing::warn!(
            stuck,
            force_grace_ms = force_grace.as_millis() as u64,
            "worker pool did not shut down cleanly"
        );
        ShutdownReport::Unclean { stuck }
    }

    fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        self.telemetry.record_dispatched();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.cancel.cancel();
        for handle in &self.workers {
            handle.abort();
        }
    }
}

async fn run_worker(
    worker: usize,
    jobs: Arc<AsyncMutex<mpsc::Receiver<Job>>>,
    completions: mpsc::UnboundedSender<Completion>,
    strategy: Arc<dyn FetchStrategy>,
    telemetry: Arc<Telemetry>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            job = async { jobs.lock().await.recv().await } => job,
        };
        let Some(job) = job else {
            break;
        };

        let completion = execute(worker, job, strategy.as_ref(), &telemetry).await;
        if completions.send(completion).is_err() {
            tracing::debug!(worker, "completion receiver dropped; worker exiting");
            break;
        }
    }
}

async fn execute(
    worker: usize,
    job: Job,
    strategy: &dyn FetchStrategy,
    telemetry: &Telemetry,
) -> Completion {
    let Job { item, destination } = job;
    let context = TaskContext {
        worker,
        sequence: item.sequence(),
        id: item.id().map(str::to_owned),
    };
    let span = tracing::info_span!(
        "fetch",
        worker,
        seq = item.sequence(),
        id = item.display_id()
    );

    let started = Instant::now();
    let result = AssertUnwindSafe(strategy.fetch(&item, &destination))
        .catch_unwind()
        .instrument(span.clone())
        .await;

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            let detail = format!("{err:#}");
            span.in_scope(|| tracing::error!(error = %detail, "fetch strategy failed"));
            telemetry.record_worker_fault();
            FetchOutcome::failed(context.id.clone(), REASON_WORKER_FAULT, Some(detail))
        }
        Err(panic_payload) => {
            let panic_msg = panic_message(panic_payload.as_ref());
            span.in_scope(|| tracing::error!(panic = %panic_msg, "fetch task panicked"));
            telemetry.record_worker_fault();
            FetchOutcome::failed(
                context.id.clone(),
                REASON_WORKER_FAULT,
                Some(format!("panicked: {panic_msg}")),
            )
        }
    };

    Completion {
        context,
        item,
        outcome,
        elapsed: started.elapsed(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
