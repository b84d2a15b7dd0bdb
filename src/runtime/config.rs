use crate::fetch::options::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS};
use crate::fetch::FetchOptions;
use crate::runtime::telemetry;
use crate::source::ColumnNames;
use anyhow::{bail, Context, Result};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIN_DEFAULT_CONCURRENCY: usize = 4;
const MAX_DEFAULT_CONCURRENCY: usize = 6;
const QUEUE_CAPACITY_PER_WORKER: usize = 2;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
const DEFAULT_FORCE_GRACE_SECS: u64 = 5;
const DEFAULT_FILE_EXTENSION: &str = "pdf";

/// Worker count used when none is configured: the machine's parallelism,
/// clamped to between 4 and 6.
pub fn default_concurrency() -> usize {
    let available = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    available.clamp(MIN_DEFAULT_CONCURRENCY, MAX_DEFAULT_CONCURRENCY)
}

/// Configuration for one fetch run.
///
/// All instances must be constructed via [`RunConfig::builder`] or [`RunConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    source_path: PathBuf,
    ledger_path: PathBuf,
    download_dir: PathBuf,
    concurrency: usize,
    queue_capacity: usize,
    connect_timeout: Duration,
    read_timeout: Duration,
    shutdown_grace: Duration,
    force_grace: Duration,
    metrics_interval: Duration,
    file_extension: String,
    columns: ColumnNames,
}

pub struct RunConfigParams {
    pub source_path: PathBuf,
    pub ledger_path: PathBuf,
    pub download_dir: PathBuf,
    pub concurrency: usize,
    pub queue_capacity: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub shutdown_grace: Duration,
    pub force_grace: Duration,
    pub metrics_interval: Duration,
    pub file_extension: String,
    pub columns: ColumnNames,
}

impl RunConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: RunConfigParams) -> Result<Self> {
        let RunConfigParams {
            source_path,
            ledger_path,
            download_dir,
            concurrency,
            queue_capacity,
            connect_timeout,
            read_timeout,
            shutdown_grace,
            force_grace,
            metrics_interval,
            file_extension,
            columns,
        } = params;

        let config = Self {
            source_path,
            ledger_path,
            download_dir,
            concurrency,
            queue_capacity,
            connect_timeout,
            read_timeout,
            shutdown_grace,
            force_grace,
            metrics_interval,
            file_extension: file_extension.trim().to_owned(),
            columns: ColumnNames {
                id: columns.id.trim().to_owned(),
                primary: columns.primary.trim().to_owned(),
                fallback: columns.fallback.trim().to_owned(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Tabular input listing the work items.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Append-only status ledger.
    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Number of concurrent fetch workers.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Jobs that may wait in the dispatch queue before submission blocks.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// How long shutdown waits for in-flight work before cancelling it.
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    /// How long shutdown waits after cancelling before reporting unclean.
    pub fn force_grace(&self) -> Duration {
        self.force_grace
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    pub fn columns(&self) -> &ColumnNames {
        &self.columns
    }

    /// Per-attempt options derived from the configured timeouts.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            ..FetchOptions::default()
        }
    }

    /// Deterministic download path for the item at `sequence`.
    pub fn destination_for(&self, sequence: usize) -> PathBuf {
        self.download_dir
            .join(format!("file_{sequence}.{}", self.file_extension))
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        ensure_path(&self.source_path, "source_path")?;
        ensure_path(&self.ledger_path, "ledger_path")?;
        ensure_path(&self.download_dir, "download_dir")?;

        if self.concurrency == 0 {
            bail!("concurrency must be greater than 0");
        }

        if self.queue_capacity == 0 {
            bail!("queue_capacity must be greater than 0");
        }

        if self.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        if self.read_timeout.is_zero() {
            bail!("read_timeout must be greater than 0");
        }

        if self.shutdown_grace.is_zero() {
            bail!("shutdown_grace must be greater than 0");
        }

        if self.force_grace.is_zero() {
            bail!("force_grace must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.file_extension.is_empty()
            || self.file_extension.starts_with('.')
            || self.file_extension.contains(['/', '\\'])
        {
            bail!(
                "file_extension {:?} must be non-empty, without a leading dot or path separators",
                self.file_extension
            );
        }

        ensure_not_empty(&self.columns.id, "id column")?;
        ensure_not_empty(&self.columns.primary, "primary column")?;
        ensure_not_empty(&self.columns.fallback, "fallback column")?;

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct RunConfigBuilder {
    source_path: Option<PathBuf>,
    ledger_path: Option<PathBuf>,
    download_dir: Option<PathBuf>,
    concurrency: Option<usize>,
    queue_capacity: Option<usize>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    shutdown_grace: Option<Duration>,
    force_grace: Option<Duration>,
    metrics_interval: Option<Duration>,
    file_extension: Option<String>,
    columns: Option<ColumnNames>,
}

impl RunConfigBuilder {
    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = Some(path.into());
        self
    }

    pub fn download_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(path.into());
        self
    }

    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = Some(workers);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    pub fn force_grace(mut self, grace: Duration) -> Self {
        self.force_grace = Some(grace);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into());
        self
    }

    pub fn columns(mut self, columns: ColumnNames) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn build(self) -> Result<RunConfig> {
        let concurrency = self.concurrency.unwrap_or_else(default_concurrency);
        let params = RunConfigParams {
            source_path: self.source_path.context("source_path is required")?,
            ledger_path: self.ledger_path.context("ledger_path is required")?,
            download_dir: self.download_dir.context("download_dir is required")?,
            concurrency,
            queue_capacity: self
                .queue_capacity
                .unwrap_or_else(|| concurrency.saturating_mul(QUEUE_CAPACITY_PER_WORKER)),
            connect_timeout: self
                .connect_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)),
            read_timeout: self
                .read_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS)),
            shutdown_grace: self
                .shutdown_grace
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS)),
            force_grace: self
                .force_grace
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_FORCE_GRACE_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            file_extension: self
                .file_extension
                .unwrap_or_else(|| DEFAULT_FILE_EXTENSION.to_owned()),
            columns: self.columns.unwrap_or_default(),
        };

        RunConfig::new(params)
    }
}

fn ensure_path(path: &Path, field: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}
