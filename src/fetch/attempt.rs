use std::fmt;
use std::time::Duration;

/// Why a single fetch attempt against one locator failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    ConnectTimeout { after: Duration },
    ReadTimeout { after: Duration },
    HttpStatus(u16),
    Connect(String),
    UnsupportedScheme(String),
    Incomplete { expected: u64, received: u64 },
    Io(String),
}

impl AttemptError {
    /// Short class label used in log fields.
    pub fn category(&self) -> &'static str {
        match self {
            AttemptError::ConnectTimeout { .. } => "connect timeout",
            AttemptError::ReadTimeout { .. } => "read timeout",
            AttemptError::HttpStatus(_) => "http error",
            AttemptError::Connect(_) => "connect failure",
            AttemptError::UnsupportedScheme(_) => "unsupported scheme",
            AttemptError::Incomplete { .. } => "incomplete transfer",
            AttemptError::Io(_) => "io failure",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AttemptError::ConnectTimeout { .. } | AttemptError::ReadTimeout { .. }
        )
    }

    pub(crate) fn from_io(err: std::io::Error) -> Self {
        AttemptError::Io(err.to_string())
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::ConnectTimeout { after } => write!(f, "connect timeout after {after:?}"),
            AttemptError::ReadTimeout { after } => write!(f, "read timeout after {after:?}"),
            AttemptError::HttpStatus(code) => write!(f, "HTTP error {code}"),
            AttemptError::Connect(message) => write!(f, "connect failure: {message}"),
            AttemptError::UnsupportedScheme(scheme) => write!(f, "unsupported scheme: {scheme}"),
            AttemptError::Incomplete { expected, received } => write!(
                f,
                "incomplete transfer: received {received} of {expected} bytes"
            ),
            AttemptError::Io(message) => write!(f, "I/O failure: {message}"),
        }
    }
}

impl std::error::Error for AttemptError {}

/// Flattens an error and its sources into one line.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}
