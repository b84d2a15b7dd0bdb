use std::fs;
use std::time::Duration;

use crate::support::helpers::{
    config_builder, entries_by_id, init_tracing, read_ledger, write_source,
};
use crate::support::mock_http::{body_for, refused_url, MockHttpServer};
use anyhow::Result;
use fetchledger::fetch::{AttemptError, FetchOptions, HttpFetcher, ResourceFetcher};
use fetchledger::ledger::{STATUS_ERROR, STATUS_SUCCESS};
use fetchledger::work::REASON_BOTH_FAILED;
use fetchledger::{Pipeline, ShutdownReport};
use url::Url;

fn short_options() -> FetchOptions {
    FetchOptions {
        connect_timeout: Duration::from_millis(300),
        read_timeout: Duration::from_millis(300),
        ..FetchOptions::default()
    }
}

fn fetcher() -> Result<HttpFetcher> {
    HttpFetcher::new(short_options())
}

#[tokio::test]
async fn fetches_body_into_destination() -> Result<()> {
    init_tracing();
    let server = MockHttpServer::start().await?;
    let dir = tempfile::tempdir()?;
    let destination = dir.path().join("file_1.pdf");

    let locator = Url::parse(&server.url("/ok/report"))?;
    let written = fetcher()?.fetch_to(&locator, &destination).await?;

    let expected = body_for("report");
    assert_eq!(written, expected.len() as u64);
    assert_eq!(fs::read_to_string(&destination)?, expected);
    assert_eq!(fs::read_dir(dir.path())?.count(), 1, "no partial file left behind");
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn follows_redirects() -> Result<()> {
    init_tracing();
    let server = MockHttpServer::start().await?;
    let dir = tempfile::tempdir()?;
    let destination = dir.path().join("file_1.pdf");

    let locator = Url::parse(&server.url("/redirect/moved"))?;
    fetcher()?.fetch_to(&locator, &destination).await?;

    assert_eq!(fs::read_to_string(&destination)?, body_for("moved"));
    assert_eq!(server.hits().count("/redirect/moved"), 1);
    assert_eq!(server.hits().count("/ok/moved"), 1);
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn error_statuses_fail_without_a_file() -> Result<()> {
    init_tracing();
    let server = MockHttpServer::start().await?;
    let dir = tempfile::tempdir()?;
    let destination = dir.path().join("file_1.pdf");
    let fetcher = fetcher()?;

    for (path, code) in [("/missing", 404), ("/error", 500)] {
        let locator = Url::parse(&server.url(path))?;
        let err = fetcher
            .fetch_to(&locator, &destination)
            .await
            .expect_err("error status must fail");
        assert_eq!(err, AttemptError::HttpStatus(code));
        assert_eq!(err.to_string(), format!("HTTP error {code}"));
        assert!(!destination.exists());
    }
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn slow_headers_are_a_read_timeout() -> Result<()> {
    init_tracing();
    let server = MockHttpServer::start().await?;
    let dir = tempfile::tempdir()?;
    let destination = dir.path().join("file_1.pdf");

    let locator = Url::parse(&server.url("/slow-headers"))?;
    let started = std::time::Instant::now();
    let err = fetcher()?
        .fetch_to(&locator, &destination)
        .await
        .expect_err("slow headers must time out");

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(matches!(err, AttemptError::ReadTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!destination.exists());
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stalled_body_times_out_and_discards_partial_data() -> Result<()> {
    init_tracing();
    let server = MockHttpServer::start().await?;
    let dir = tempfile::tempdir()?;
    let destination = dir.path().join("file_1.pdf");

    let locator = Url::parse(&server.url("/stall-body"))?;
    let err = fetcher()?
        .fetch_to(&locator, &destination)
        .await
        .expect_err("stalled body must time out");

    assert!(matches!(err, AttemptError::ReadTimeout { .. }), "unexpected error: {err}");
    assert!(!destination.exists());
    assert_eq!(fs::read_dir(dir.path())?.count(), 0, "partial file must be removed");
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn truncated_body_fails_without_a_file() -> Result<()> {
    init_tracing();
    let server = MockHttpServer::start().await?;
    let dir = tempfile::tempdir()?;
    let destination = dir.path().join("file_1.pdf");

    let locator = Url::parse(&server.url("/truncated"))?;
    let result = fetcher()?.fetch_to(&locator, &destination).await;

    assert!(result.is_err(), "truncated body must fail");
    assert!(!destination.exists());
    assert_eq!(fs::read_dir(dir.path())?.count(), 0);
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn refused_connection_is_a_connect_failure() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let destination = dir.path().join("file_1.pdf");

    let locator = Url::parse(&refused_url().await?)?;
    let err = fetcher()?
        .fetch_to(&locator, &destination)
        .await
        .expect_err("refused connection must fail");

    assert!(matches!(err, AttemptError::Connect(_)), "unexpected error: {err}");
    assert_eq!(err.category(), "connect failure");
    assert!(!destination.exists());
    Ok(())
}

#[tokio::test]
async fn end_to_end_run_writes_files_and_ledger() -> Result<()> {
    init_tracing();
    let server = MockHttpServer::start().await?;
    let dir = tempfile::tempdir()?;
    let a = server.url("/ok/a");
    let b_primary = server.url("/missing");
    let b_fallback = server.url("/ok/b");
    let c_primary = server.url("/error");
    let c_fallback = server.url("/missing");
    let source = write_source(
        dir.path(),
        &[
            ("A", a.as_str(), ""),
            ("B", b_primary.as_str(), b_fallback.as_str()),
            ("C", c_primary.as_str(), c_fallback.as_str()),
        ],
    )?;
    let config = config_builder(dir.path(), &source).build()?;
    let downloads = config.download_dir().to_path_buf();
    let ledger_path = config.ledger_path().to_path_buf();

    let summary = Pipeline::from_config(config)?.run().await?;
    assert_eq!(summary.appended, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.fallback_used, 1);
    assert_eq!(summary.shutdown, Some(ShutdownReport::Clean));

    assert_eq!(fs::read_to_string(downloads.join("file_1.pdf"))?, body_for("a"));
    assert_eq!(fs::read_to_string(downloads.join("file_2.pdf"))?, body_for("b"));
    assert!(!downloads.join("file_3.pdf").exists());

    let by_id = entries_by_id(&read_ledger(&ledger_path)?);
    assert_eq!(by_id["A"].url_used, "Primary");
    assert_eq!(by_id["A"].url, a);
    assert_eq!(by_id["B"].url_used, "Fallback");
    assert_eq!(by_id["B"].url, b_fallback);
    assert_eq!(by_id["B"].status, STATUS_SUCCESS);
    assert_eq!(by_id["C"].status, STATUS_ERROR);
    assert_eq!(by_id["C"].reason, REASON_BOTH_FAILED);
    assert_eq!(by_id["C"].error, "HTTP error 404");
    server.shutdown().await;
    Ok(())
}
