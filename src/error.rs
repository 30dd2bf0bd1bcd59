//! Error types for the poll pipeline and its configuration.

use std::error::Error as StdError;

use thiserror::Error;

/// Errors that can occur when fetching the cluster health document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No response was received (DNS, refused, reset or timed out).
    #[error("Could not connect to Elasticsearch server: {detail}")]
    ConnectFailed { detail: String },

    /// A response was received but the status was not 200.
    #[error("HTTP response code was not 200: {code}")]
    BadStatus { code: u16 },

    /// The body stream failed while being drained.
    #[error("Failed to read response body: {detail}")]
    ReadFailed { detail: String },

    /// The body is not valid JSON.
    #[error("Could not decode JSON data: {detail}")]
    ParseFailed { detail: String },
}

/// How loudly a failure should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl FetchError {
    /// An unreachable host is an error; everything past the connect is a warning.
    pub fn severity(&self) -> Severity {
        match self {
            FetchError::ConnectFailed { .. } => Severity::Error,
            FetchError::BadStatus { .. }
            | FetchError::ReadFailed { .. }
            | FetchError::ParseFailed { .. } => Severity::Warning,
        }
    }
}

/// Render `err` followed by its innermost source, if it has one.
///
/// `reqwest` reports refused connections, timeouts and DNS failures with the
/// same top-level message; the root cause is what tells them apart.
pub(crate) fn with_root_cause(err: &(dyn StdError + 'static)) -> String {
    let mut root = None;
    let mut current = err.source();
    while let Some(source) = current {
        root = Some(source);
        current = source.source();
    }

    match root {
        Some(root) => format!("{}: {}", err, root),
        None => err.to_string(),
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let detail = with_root_cause(&err);
        if err.is_decode() || err.is_body() {
            FetchError::ReadFailed { detail }
        } else if let Some(status) = err.status() {
            FetchError::BadStatus {
                code: status.as_u16(),
            }
        } else {
            // connect, timeout, request and redirect failures all mean no usable response
            FetchError::ConnectFailed { detail }
        }
    }
}

/// Errors that can occur when forwarding metrics to the collector.
#[derive(Debug, Error)]
pub enum SendError {
    /// The collector could not be reached within the connect timeout.
    #[error("Could not connect to Carbon server {addr}: {detail}")]
    ConnectFailed { addr: String, detail: String },

    /// The connection was established but the payload write failed.
    #[error("Could not send data to Carbon server {addr}: {detail}")]
    WriteFailed { addr: String, detail: String },
}

/// Errors raised while resolving configuration at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting has no value from any source.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A duration setting could not be parsed.
    #[error("Invalid duration for {key}: {value:?}")]
    InvalidDuration { key: &'static str, value: String },

    /// A setting has a value outside its allowed range.
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    /// The layered configuration sources could not be read or merged.
    #[error("Failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}
