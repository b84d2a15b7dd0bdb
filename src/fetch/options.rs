//! Per-attempt knobs for the HTTP fetcher plus validation.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Bound on establishing the connection.
    pub connect_timeout: Duration,
    /// Bound on waiting for response headers and on each gap between body chunks.
    pub read_timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
                .to_owned(),
        }
    }
}

impl FetchOptions {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }
        if self.read_timeout.is_zero() {
            bail!("read_timeout must be greater than 0");
        }
        if self.user_agent.trim().is_empty() {
            bail!("user_agent cannot be empty");
        }
        Ok(())
    }

    /// Upper bound for a request to produce response headers.
    pub fn header_deadline(&self) -> Duration {
        self.connect_timeout.saturating_add(self.read_timeout)
    }
}
