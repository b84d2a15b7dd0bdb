use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use fetchledger::fetch::{AttemptError, ResourceFetcher};
use fetchledger::{LedgerEntry, RunConfig, RunConfigBuilder};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;
use url::Url;

pub const SOURCE_HEADER: &str = "BRnum,Pdf_URL,Report Html Address";

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// One input row: identifier, primary locator, fallback locator.
pub type Row<'a> = (&'a str, &'a str, &'a str);

pub fn write_source(dir: &Path, rows: &[Row<'_>]) -> Result<PathBuf> {
    let path = dir.join("input.csv");
    let mut contents = String::from(SOURCE_HEADER);
    contents.push('\n');
    for (id, primary, fallback) in rows {
        contents.push_str(&format!("{id},{primary},{fallback}\n"));
    }
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

pub fn read_ledger(path: &Path) -> Result<Vec<LedgerEntry>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open ledger {}", path.display()))?;
    let mut entries = Vec::new();
    for entry in reader.deserialize() {
        entries.push(entry.context("failed to decode ledger row")?);
    }
    Ok(entries)
}

pub fn entries_by_id(entries: &[LedgerEntry]) -> HashMap<String, LedgerEntry> {
    entries
        .iter()
        .map(|entry| (entry.id.clone(), entry.clone()))
        .collect()
}

/// Builder pointed at scratch paths under `dir` with short timeouts.
pub fn config_builder(dir: &Path, source: &Path) -> RunConfigBuilder {
    RunConfig::builder()
        .source_path(source)
        .ledger_path(dir.join("ledger.csv"))
        .download_dir(dir.join("downloads"))
        .concurrency(4)
        .connect_timeout(Duration::from_millis(300))
        .read_timeout(Duration::from_millis(300))
        .shutdown_grace(Duration::from_secs(2))
        .force_grace(Duration::from_millis(500))
        .metrics_interval(Duration::from_millis(100))
}

/// In-memory transport: hosts named `ok.test` succeed, everything else
/// answers 404. Every call is recorded.
#[derive(Default)]
pub struct StubFetcher {
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl StubFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::default(),
            delay: Some(delay),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls poisoned").len()
    }
}

impl ResourceFetcher for StubFetcher {
    fn fetch_to<'a>(
        &'a self,
        locator: &'a Url,
        _destination: &'a Path,
    ) -> BoxFuture<'a, Result<u64, AttemptError>> {
        self.calls
            .lock()
            .expect("calls poisoned")
            .push(locator.to_string());
        let ok = locator.host_str() == Some("ok.test");
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if ok {
                Ok(1)
            } else {
                Err(AttemptError::HttpStatus(404))
            }
        })
    }
}
