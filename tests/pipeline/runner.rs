use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::support::helpers::{
    config_builder, init_tracing, read_ledger, write_source, StubFetcher,
};
use anyhow::{Context, Result};
use fetchledger::{
    Completion, CsvLedgerStore, CsvRowSource, FallbackFetcher, Pipeline, RunConfig, RunObserver,
    Runner,
};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn stub_pipeline(config: RunConfig, fetcher: Arc<StubFetcher>) -> Pipeline {
    let source = CsvRowSource::new(config.source_path(), config.columns().clone());
    let ledger = CsvLedgerStore::new(config.ledger_path());
    let strategy = FallbackFetcher::new(fetcher);
    Pipeline::with_components(config, Arc::new(source), Arc::new(ledger), Arc::new(strategy))
}

fn numbered_rows(count: usize) -> Vec<(String, String)> {
    (1..=count)
        .map(|n| (format!("R{n:02}"), format!("http://ok.test/{n}.pdf")))
        .collect()
}

/// Cancels the run as soon as the first outcome arrives.
struct CancelOnFirstCompletion {
    token: CancellationToken,
}

impl RunObserver for CancelOnFirstCompletion {
    fn on_completion(&self, _completion: &Completion) {
        self.token.cancel();
    }
}

#[tokio::test]
async fn runner_completes_without_a_signal() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let source = write_source(dir.path(), &[("A", "http://ok.test/a.pdf", "")])?;
    let config = config_builder(dir.path(), &source).build()?;

    let runner = Runner::from_pipeline(stub_pipeline(config, StubFetcher::new()));
    let summary = timeout(Duration::from_secs(5), runner.run_until_ctrl_c())
        .await
        .context("runner should finish on its own")??;

    assert_eq!(summary.appended, 1);
    assert!(!summary.interrupted);
    Ok(())
}

#[tokio::test]
async fn cancelled_before_start_dispatches_nothing() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let source = write_source(dir.path(), &[("A", "http://ok.test/a.pdf", "")])?;
    let config = config_builder(dir.path(), &source).build()?;
    let ledger_path = config.ledger_path().to_path_buf();
    let fetcher = StubFetcher::new();

    let runner = Runner::from_pipeline(stub_pipeline(config, fetcher.clone()));
    runner.cancellation_token().cancel();
    let summary = runner.run().await?;

    assert!(summary.interrupted);
    assert_eq!(summary.dispatched, 0);
    assert_eq!(summary.appended, 0);
    assert_eq!(fetcher.call_count(), 0);
    assert!(read_ledger(&ledger_path)?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interrupted_run_records_drained_items_and_resumes() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let rows = numbered_rows(20);
    let borrowed: Vec<_> = rows
        .iter()
        .map(|(id, url)| (id.as_str(), url.as_str(), ""))
        .collect();
    let source = write_source(dir.path(), &borrowed)?;
    let config = config_builder(dir.path(), &source)
        .concurrency(1)
        .queue_capacity(1)
        .build()?;
    let ledger_path = config.ledger_path().to_path_buf();

    let fetcher = StubFetcher::with_delay(Duration::from_millis(20));
    let token = CancellationToken::new();
    let observer = CancelOnFirstCompletion {
        token: token.clone(),
    };
    let pipeline =
        stub_pipeline(config.clone(), fetcher.clone()).with_observer(Arc::new(observer));
    let first = pipeline.run_with_cancellation(token).await?;

    assert!(first.interrupted);
    assert!(first.dispatched >= 1);
    assert!(first.dispatched < 20, "dispatch must stop early");
    assert_eq!(first.appended, first.dispatched, "drained items are recorded");
    assert_eq!(fetcher.call_count(), first.dispatched);

    let second = stub_pipeline(config, StubFetcher::new()).run().await?;
    assert!(!second.interrupted);
    assert_eq!(second.skipped_recorded, first.appended);
    assert_eq!(first.appended + second.appended, 20);

    let mut counts: HashMap<String, usize> = HashMap::new();
    for entry in read_ledger(&ledger_path)? {
        *counts.entry(entry.id).or_default() += 1;
    }
    assert_eq!(counts.len(), 20);
    assert!(counts.values().all(|&count| count == 1), "each id recorded once");
    Ok(())
}
