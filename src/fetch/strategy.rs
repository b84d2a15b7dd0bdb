//! Primary-then-fallback fetch policy.

use super::attempt::AttemptError;
use super::http::ResourceFetcher;
use crate::runtime::telemetry::Telemetry;
use crate::work::item::short_locator;
use crate::work::{
    FetchOutcome, WorkItem, REASON_BOTH_FAILED, REASON_NO_LOCATOR, REASON_SINGLE_FAILED,
};
use anyhow::Result;
use futures::future::BoxFuture;
use std::path::Path;
use std::sync::Arc;
use tokio::time::Instant;

/// Produces exactly one outcome for an item.
///
/// Per-attempt failures are data and belong in the returned outcome. An `Err`
/// is reserved for faults inside the strategy itself; the worker pool turns
/// it into a failed outcome.
pub trait FetchStrategy: Send + Sync + 'static {
    fn fetch<'a>(
        &'a self,
        item: &'a WorkItem,
        destination: &'a Path,
    ) -> BoxFuture<'a, Result<FetchOutcome>>;
}

/// Tries the primary locator, then the fallback, and stops at the first success.
#[derive(Clone)]
pub struct FallbackFetcher {
    fetcher: Arc<dyn ResourceFetcher>,
    telemetry: Option<Arc<Telemetry>>,
}

impl FallbackFetcher {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    async fn fetch_item(&self, item: &WorkItem, destination: &Path) -> FetchOutcome {
        let id = item.id().map(str::to_owned);
        let mut last_error: Option<AttemptError> = None;

        for (label, locator) in item.locators() {
            let started = Instant::now();
            match self.fetcher.fetch_to(locator, destination).await {
                Ok(bytes) => {
                    tracing::info!(
                        locator = %short_locator(locator),
                        used = %label,
                        bytes,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "fetched resource"
                    );
                    return FetchOutcome::succeeded(id, locator.clone());
                }
                Err(err) => {
                    tracing::warn!(
                        locator = %short_locator(locator),
                        attempt = %label,
                        category = err.category(),
                        error = %err,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "fetch attempt failed"
                    );
                    if let Some(telemetry) = &self.telemetry {
                        telemetry.record_attempt_failure(&err);
                    }
                    last_error = Some(err);
                }
            }
        }

        let reason = if !item.has_locator() {
            REASON_NO_LOCATOR
        } else if item.fallback().is_none() {
            REASON_SINGLE_FAILED
        } else {
            REASON_BOTH_FAILED
        };
        let detail = last_error.map(|err| err.to_string());
        tracing::error!(
            reason,
            error = detail.as_deref().unwrap_or_default(),
            "all locators failed"
        );
        FetchOutcome::failed(id, reason, detail)
    }
}

impl FetchStrategy for FallbackFetcher {
    fn fetch<'a>(
        &'a self,
        item: &'a WorkItem,
        destination: &'a Path,
    ) -> BoxFuture<'a, Result<FetchOutcome>> {
        Box::pin(async move { Ok(self.fetch_item(item, destination).await) })
    }
}
