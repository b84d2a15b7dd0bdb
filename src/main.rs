use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fetchledger::processor::Completion;
use fetchledger::{
    init_tracing_with_default, ColumnNames, Pipeline, RunConfig, RunObserver, RunSummary, Runner,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const QUIET_LOG_DIRECTIVE: &str = "warn";
const VERBOSE_LOG_DIRECTIVE: &str = "info";

/// Fetch every not-yet-recorded item listed in a CSV file and append one
/// status row per item to the ledger.
#[derive(Debug, Parser)]
#[command(name = "fetchledger", author, version, about, long_about = None)]
struct Args {
    /// CSV file listing the work items.
    #[arg(env = "FETCHLEDGER_SOURCE")]
    source: PathBuf,

    /// Append-only status ledger (CSV). Created if missing.
    #[arg(long, env = "FETCHLEDGER_LEDGER", default_value = "ledger.csv")]
    ledger: PathBuf,

    /// Directory receiving one file per fetched item.
    #[arg(long, env = "FETCHLEDGER_DOWNLOAD_DIR", default_value = "downloads")]
    download_dir: PathBuf,

    /// Concurrent fetch workers [default: available parallelism clamped to 4..=6].
    #[arg(long, env = "FETCHLEDGER_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Jobs waiting for a worker before dispatch blocks [default: 2 x concurrency].
    #[arg(long, env = "FETCHLEDGER_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    #[arg(long, env = "FETCHLEDGER_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    connect_timeout_secs: u64,

    #[arg(long, env = "FETCHLEDGER_READ_TIMEOUT_SECS", default_value_t = 30)]
    read_timeout_secs: u64,

    /// Extension of downloaded files.
    #[arg(long, env = "FETCHLEDGER_EXTENSION", default_value = "pdf")]
    extension: String,

    #[arg(long, env = "FETCHLEDGER_ID_COLUMN", default_value = "BRnum")]
    id_column: String,

    #[arg(long, env = "FETCHLEDGER_PRIMARY_COLUMN", default_value = "Pdf_URL")]
    primary_column: String,

    #[arg(
        long,
        env = "FETCHLEDGER_FALLBACK_COLUMN",
        default_value = "Report Html Address"
    )]
    fallback_column: String,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,
}

impl Args {
    fn to_run_config(&self) -> Result<RunConfig> {
        let mut builder = RunConfig::builder()
            .source_path(&self.source)
            .ledger_path(&self.ledger)
            .download_dir(&self.download_dir)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .read_timeout(Duration::from_secs(self.read_timeout_secs))
            .file_extension(self.extension.clone())
            .columns(ColumnNames {
                id: self.id_column.clone(),
                primary: self.primary_column.clone(),
                fallback: self.fallback_column.clone(),
            });
        if let Some(workers) = self.concurrency {
            builder = builder.concurrency(workers);
        }
        if let Some(capacity) = self.queue_capacity {
            builder = builder.queue_capacity(capacity);
        }
        builder.build().context("invalid configuration")
    }
}

struct ProgressObserver {
    bar: ProgressBar,
}

impl RunObserver for ProgressObserver {
    fn on_planned(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_elapsed();
    }

    fn on_completion(&self, completion: &Completion) {
        if !completion.outcome.is_success() {
            self.bar
                .set_message(format!("last failure: {}", completion.item.display_id()));
        }
        self.bar.inc(1);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_cli_tracing(!args.no_progress);

    let config = args.to_run_config()?;
    let progress = if args.no_progress {
        None
    } else {
        Some(build_progress_bar()?)
    };

    let mut pipeline = Pipeline::from_config(config)?;
    if let Some(bar) = &progress {
        pipeline = pipeline.with_observer(Arc::new(ProgressObserver { bar: bar.clone() }));
    }
    let runner = Runner::from_pipeline(pipeline);

    let result = runner.run_until_ctrl_c().await;
    if let Some(bar) = &progress {
        bar.finish_and_clear();
    }
    let summary = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// Keeps the progress bar readable unless the caller asked for specific logs.
fn init_cli_tracing(progress: bool) {
    let directive = if progress {
        QUIET_LOG_DIRECTIVE
    } else {
        VERBOSE_LOG_DIRECTIVE
    };
    init_tracing_with_default(directive);
}

fn build_progress_bar() -> Result<ProgressBar> {
    let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr_with_hz(12));
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} items ({per_sec}) {msg}",
    )
    .context("invalid progress bar template")?
    .progress_chars("=>-");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    Ok(bar)
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Processed {} items: {} succeeded ({} via fallback), {} failed",
        summary.considered, summary.succeeded, summary.fallback_used, summary.failed
    );
    if summary.skipped_recorded > 0 {
        println!(
            "Skipped {} items already recorded",
            summary.skipped_recorded
        );
    }
    if summary.missing_ids > 0 {
        println!("{} items had no identifier", summary.missing_ids);
    }
    if !summary.duplicate_ids.is_empty() {
        println!(
            "Identifiers repeated in the source: {}",
            summary.duplicate_ids.join(", ")
        );
    }
    if summary.interrupted {
        println!(
            "Interrupted after dispatching {} items; re-run to continue",
            summary.dispatched
        );
    }
    println!(
        "Appended {} entries to {} in {:.2}s",
        summary.appended,
        summary.ledger_path.display(),
        summary.elapsed_ms as f64 / 1000.0
    );
}
