pub mod fetch;
pub mod ledger;
pub mod processor;
pub mod runtime;
pub mod source;
pub mod work;

pub use fetch::{AttemptError, FallbackFetcher, FetchOptions, FetchStrategy, HttpFetcher};
pub use ledger::{CsvLedgerStore, LedgerEntry, LedgerStore};
pub use processor::{aggregate, Completion, ResultAggregator, ShutdownReport, WorkerPool};
pub use runtime::config::{default_concurrency, RunConfig, RunConfigBuilder, RunConfigParams};
pub use runtime::pipeline::{Pipeline, RunObserver, RunSummary};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{
    init_tracing, init_tracing_with_default, Telemetry, TelemetrySnapshot,
};
pub use source::{ColumnNames, CsvRowSource, RowSource, SourceRow};
pub use work::{select, DedupIndex, FetchOutcome, LocatorLabel, WorkItem};
