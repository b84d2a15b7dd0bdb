use crate::runtime::config::RunConfig;
use crate::runtime::pipeline::{Pipeline, RunSummary};
use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Drives a [`Pipeline`] and turns OS signals into a graceful stop.
pub struct Runner {
    pipeline: Pipeline,
    shutdown: CancellationToken,
}

impl Runner {
    pub fn new(config: RunConfig) -> Result<Self> {
        Ok(Self::from_pipeline(Pipeline::from_config(config)?))
    }

    pub fn from_pipeline(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Runs once, stopping dispatch early only if the shutdown token is cancelled.
    pub async fn run(&self) -> Result<RunSummary> {
        self.pipeline
            .run_with_cancellation(self.shutdown.clone())
            .await
    }

    /// Runs once; a Ctrl-C (SIGINT) stops dispatch, drains in-flight items and
    /// still records them in the ledger.
    pub async fn run_until_ctrl_c(&self) -> Result<RunSummary> {
        let token = self.shutdown.clone();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                result = signal::ctrl_c() => match result {
                    Ok(()) => {
                        tracing::info!("Ctrl-C received; finishing dispatched work");
                        token.cancel();
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to listen for Ctrl-C");
                    }
                },
                _ = token.cancelled() => {}
            }
        });

        let result = self.run().await;
        watcher.abort();
        result
    }
}
