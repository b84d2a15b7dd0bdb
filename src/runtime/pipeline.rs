//! One end-to-end run: load the ledger snapshot, select work, fan it out to the
//! worker pool, drain every outcome and append them to the ledger in one go.

use crate::fetch::{FallbackFetcher, FetchStrategy, HttpFetcher};
use crate::ledger::{CsvLedgerStore, LedgerEntry, LedgerStore};
use crate::processor::{
    Completion, Job, ResultAggregator, ShutdownReport, WorkerPool, WorkerPoolParams,
};
use crate::runtime::config::RunConfig;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::source::{CsvRowSource, RowSource, SourceRow};
use crate::work::{select, DedupIndex, LocatorLabel, Selection};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Hooks for front-ends that want to follow a run as it progresses.
pub trait RunObserver: Send + Sync {
    /// Called once with the number of selected items, before dispatch starts.
    fn on_planned(&self, _total: usize) {}

    fn on_completion(&self, _completion: &Completion) {}
}

/// Counts reported at the end of every completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Items selected for this run.
    pub considered: usize,
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub fallback_used: usize,
    pub skipped_recorded: usize,
    pub skipped_without_locator: usize,
    pub missing_ids: usize,
    pub duplicate_ids: Vec<String>,
    /// Rows written to the ledger; zero when the store was left untouched.
    pub appended: usize,
    pub interrupted: bool,
    /// `None` when nothing was dispatched and no pool was started.
    pub shutdown: Option<ShutdownReport>,
    pub elapsed_ms: u64,
    pub ledger_path: PathBuf,
}

pub struct Pipeline {
    config: RunConfig,
    source: Arc<dyn RowSource>,
    ledger: Arc<dyn LedgerStore>,
    strategy: Arc<dyn FetchStrategy>,
    telemetry: Arc<Telemetry>,
    observer: Option<Arc<dyn RunObserver>>,
}

impl Pipeline {
    /// Wires the CSV source, CSV ledger and HTTP fetch strategy described by `config`.
    pub fn from_config(config: RunConfig) -> Result<Self> {
        let telemetry = Arc::new(Telemetry::default());
        let fetcher = HttpFetcher::new(config.fetch_options())?;
        let strategy = FallbackFetcher::new(Arc::new(fetcher)).with_telemetry(telemetry.clone());
        let source = CsvRowSource::new(config.source_path(), config.columns().clone());
        let ledger = CsvLedgerStore::new(config.ledger_path());

        Ok(Self {
            config,
            source: Arc::new(source),
            ledger: Arc::new(ledger),
            strategy: Arc::new(strategy),
            telemetry,
            observer: None,
        })
    }

    /// Builds a pipeline around caller-provided collaborators.
    pub fn with_components(
        config: RunConfig,
        source: Arc<dyn RowSource>,
        ledger: Arc<dyn LedgerStore>,
        strategy: Arc<dyn FetchStrategy>,
    ) -> Self {
        Self {
            config,
            source,
            ledger,
            strategy,
            telemetry: Arc::new(Telemetry::default()),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub async fn run(&self) -> Result<RunSummary> {
        self.run_with_cancellation(CancellationToken::new()).await
    }

    /// Runs to completion, or until `cancel` fires.
    ///
    /// Cancellation stops dispatching new items; items already handed to the
    /// pool are drained and still recorded so a later run resumes after them.
    pub async fn run_with_cancellation(&self, cancel: CancellationToken) -> Result<RunSummary> {
        let started = Instant::now();
        let ledger_path = self.ledger.location().to_path_buf();

        let ledger = self.ledger.clone();
        let recorded = blocking(move || {
            ledger.ensure()?;
            ledger.load_existing_ids()
        })
        .await
        .with_context(|| format!("failed to prepare ledger {}", ledger_path.display()))?;
        let index = DedupIndex::new(recorded);
        tracing::info!(
            ledger = %ledger_path.display(),
            recorded = index.len(),
            "loaded ledger snapshot"
        );

        let source = self.source.clone();
        let rows = blocking(move || source.read_rows())
            .await
            .with_context(|| {
                format!(
                    "failed to read row source {}",
                    self.config.source_path().display()
                )
            })?;
        report_row_anomalies(&rows);
        let total_rows = rows.len();

        let Selection {
            items,
            skipped_recorded,
            skipped_without_locator,
            missing_id_rows,
            duplicate_ids,
        } = select(rows, &index);
        report_selection(&missing_id_rows, &duplicate_ids, skipped_recorded);
        tracing::info!(
            rows = total_rows,
            selected = items.len(),
            skipped_recorded,
            skipped_without_locator,
            "work selected"
        );

        let download_dir = self.config.download_dir();
        tokio::fs::create_dir_all(download_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create download directory {}",
                    download_dir.display()
                )
            })?;
        let probe_dir = download_dir.to_path_buf();
        blocking(move || ensure_writable(&probe_dir)).await?;

        let mut summary = RunSummary {
            considered: items.len(),
            skipped_recorded,
            skipped_without_locator,
            missing_ids: missing_id_rows.len(),
            duplicate_ids,
            ledger_path,
            ..RunSummary::default()
        };

        if items.is_empty() {
            tracing::info!("No new entries to append; ledger left untouched");
            summary.elapsed_ms = started.elapsed().as_millis() as u64;
            log_summary(&summary);
            return Ok(summary);
        }

        if let Some(observer) = &self.observer {
            observer.on_planned(items.len());
        }

        let pool = WorkerPool::launch(WorkerPoolParams {
            workers: self.config.concurrency(),
            queue_capacity: self.config.queue_capacity(),
            strategy: self.strategy.clone(),
            telemetry: self.telemetry.clone(),
        });
        let reporter_stop = CancellationToken::new();
        let reporter = spawn_metrics_reporter(
            self.telemetry.clone(),
            items.len(),
            reporter_stop.clone(),
            self.config.metrics_interval(),
        );

        let mut aggregator = ResultAggregator::with_capacity(items.len());
        let mut pending = items.into_iter();
        let mut next_item = pending.next();
        let mut pool_error = None;

        loop {
            let dispatched = pool.dispatched() as usize;
            if next_item.is_none() && aggregator.len() >= dispatched {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled(), if next_item.is_some() => {
                    summary.interrupted = true;
                    tracing::warn!(
                        not_dispatched = 1 + pending.len(),
                        in_flight = dispatched - aggregator.len(),
                        "cancellation requested; draining dispatched work"
                    );
                    next_item = None;
                }
                completion = pool.next_completed(), if aggregator.len() < dispatched => {
                    match completion {
                        Some(completion) => self.record_completion(&mut aggregator, completion),
                        None => {
                            pool_error = Some(anyhow!(
                                "worker pool closed with {} outcomes outstanding",
                                dispatched - aggregator.len()
                            ));
                            break;
                        }
                    }
                }
                permit = pool.reserve(), if next_item.is_some() => {
                    let permit = match permit {
                        Ok(permit) => permit,
                        Err(err) => {
                            pool_error = Some(err);
                            break;
                        }
                    };
                    if let Some(item) = next_item.take() {
                        let destination = self.config.destination_for(item.sequence());
                        permit.submit(Job { item, destination });
                    }
                    next_item = pending.next();
                }
                else => break,
            }
        }

        summary.dispatched = pool.dispatched() as usize;
        let shutdown = pool
            .shutdown(self.config.shutdown_grace(), self.config.force_grace())
            .await;
        summary.shutdown = Some(shutdown);
        reporter_stop.cancel();
        let _ = reporter.await;

        summary.succeeded = aggregator.succeeded();
        summary.failed = aggregator.failed();
        summary.fallback_used = aggregator.fallback_used();
        summary.appended = self.append(aggregator.into_batch()).await?;
        summary.elapsed_ms = started.elapsed().as_millis() as u64;

        if let Some(err) = pool_error {
            return Err(err.context("run aborted before every outcome was collected"));
        }

        log_summary(&summary);
        Ok(summary)
    }

    fn record_completion(&self, aggregator: &mut ResultAggregator, completion: Completion) {
        let Completion {
            context,
            item,
            outcome,
            elapsed,
        } = &completion;

        if outcome.is_success() {
            let via_fallback = LocatorLabel::derive(outcome.locator_used(), item.primary())
                == Some(LocatorLabel::Fallback);
            self.telemetry.record_success(via_fallback);
        } else {
            self.telemetry.record_failure();
        }
        tracing::debug!(
            worker = context.worker,
            seq = context.sequence,
            id = item.display_id(),
            success = outcome.is_success(),
            elapsed_ms = elapsed.as_millis() as u64,
            "item completed"
        );

        aggregator.record(item, outcome);
        if let Some(observer) = &self.observer {
            observer.on_completion(&completion);
        }
    }

    async fn append(&self, batch: Vec<LedgerEntry>) -> Result<usize> {
        if batch.is_empty() {
            tracing::info!("No new entries to append; ledger left untouched");
            return Ok(0);
        }

        let rows = batch.len();
        let ledger = self.ledger.clone();
        blocking(move || ledger.append(&batch))
            .await
            .with_context(|| {
                format!(
                    "failed to append {rows} entries to ledger {}",
                    self.ledger.location().display()
                )
            })?;
        tracing::info!(
            rows,
            ledger = %self.ledger.location().display(),
            "appended entries to ledger"
        );
        Ok(rows)
    }
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .context("blocking task did not complete")?
}

/// Fails unless `dir` accepts new files.
fn ensure_writable(dir: &Path) -> Result<()> {
    tempfile::Builder::new()
        .prefix(".fetchledger-")
        .tempfile_in(dir)
        .map(drop)
        .with_context(|| format!("download directory {} is not writable", dir.display()))
}

fn report_row_anomalies(rows: &[SourceRow]) {
    for row in rows {
        for anomaly in &row.anomalies {
            tracing::warn!(
                row = row.row_index,
                id = row.id.as_deref().unwrap_or_default(),
                anomaly = %anomaly,
                "[INPUT] unusable locator value treated as absent"
            );
        }
    }
}

fn report_selection(missing_id_rows: &[usize], duplicate_ids: &[String], skipped: usize) {
    for row in missing_id_rows {
        tracing::warn!(
            row,
            "[INPUT] row has no identifier; it is fetched but cannot be deduplicated later"
        );
    }
    if !duplicate_ids.is_empty() {
        tracing::warn!(
            count = duplicate_ids.len(),
            ids = ?duplicate_ids,
            "[INPUT] identifiers repeated within the source; every occurrence is processed"
        );
    }
    if skipped > 0 {
        tracing::info!(skipped, "[DUPLICATE] skipped ids already recorded in the ledger");
    }
}

fn log_summary(summary: &RunSummary) {
    tracing::info!(
        considered = summary.considered,
        succeeded = summary.succeeded,
        failed = summary.failed,
        fallback_used = summary.fallback_used,
        appended = summary.appended,
        interrupted = summary.interrupted,
        elapsed_ms = summary.elapsed_ms,
        ledger = %summary.ledger_path.display(),
        "run finished"
    );
}
