use super::attempt::{error_chain, AttemptError};
use super::destination::PartialFile;
use super::options::FetchOptions;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::header::{HeaderValue, ACCEPT_ENCODING};
use reqwest::redirect::Policy;
use std::path::Path;
use tokio::time::timeout;
use url::Url;

/// Transfers the resource behind one locator into a destination path.
///
/// Implementations must leave no file at `destination` unless they return `Ok`.
pub trait ResourceFetcher: Send + Sync {
    fn fetch_to<'a>(
        &'a self,
        locator: &'a Url,
        destination: &'a Path,
    ) -> BoxFuture<'a, Result<u64, AttemptError>>;
}

/// `reqwest`-backed fetcher with separate connect and read bounds.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl ResourceFetcher for HttpFetcher {
    fn fetch_to<'a>(
        &'a self,
        locator: &'a Url,
        destination: &'a Path,
    ) -> BoxFuture<'a, Result<u64, AttemptError>> {
        Box::pin(self.download(locator, destination))
    }
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> Result<Self> {
        options.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .redirect(Policy::limited(options.max_redirects))
            .user_agent(options.user_agent.clone())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, options })
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    async fn download(&self, locator: &Url, destination: &Path) -> Result<u64, AttemptError> {
        match locator.scheme() {
            "http" | "https" => {}
            other => return Err(AttemptError::UnsupportedScheme(other.to_owned())),
        }

        let request = self
            .client
            .get(locator.clone())
            .header(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        let mut response = match timeout(self.options.header_deadline(), request.send()).await {
            Ok(result) => result.map_err(|err| self.classify(err))?,
            Err(_) => {
                return Err(AttemptError::ReadTimeout {
                    after: self.options.read_timeout,
                })
            }
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(AttemptError::HttpStatus(status.as_u16()));
        }

        let expected = response.content_length();
        let mut partial = PartialFile::create(destination)
            .await
            .map_err(AttemptError::from_io)?;

        loop {
            let chunk = match timeout(self.options.read_timeout, response.chunk()).await {
                Ok(result) => result.map_err(|err| self.classify(err))?,
                Err(_) => {
                    return Err(AttemptError::ReadTimeout {
                        after: self.options.read_timeout,
                    })
                }
            };
            let Some(chunk) = chunk else {
                break;
            };
            partial.write(&chunk).await.map_err(AttemptError::from_io)?;
        }

        if let Some(expected) = expected {
            if partial.written() < expected {
                return Err(AttemptError::Incomplete {
                    expected,
                    received: partial.written(),
                });
            }
        }

        partial.commit().await.map_err(AttemptError::from_io)
    }

    fn classify(&self, err: reqwest::Error) -> AttemptError {
        classify_failure(
            err.is_timeout(),
            err.is_connect(),
            error_chain(&err),
            &self.options,
        )
    }
}

/// Maps the transport's timeout and connect flags onto an attempt error.
fn classify_failure(
    timed_out: bool,
    connecting: bool,
    detail: String,
    options: &FetchOptions,
) -> AttemptError {
    match (timed_out, connecting) {
        (true, true) => AttemptError::ConnectTimeout {
            after: options.connect_timeout,
        },
        (true, false) => AttemptError::ReadTimeout {
            after: options.read_timeout,
        },
        (false, true) => AttemptError::Connect(detail),
        (false, false) => AttemptError::Io(detail),
    }
}
