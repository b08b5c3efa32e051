//! Check outcome error types
//!
//! Every error produced here is fatal for the scenario instance that hit it:
//! the harness scores protocol, status, schema and invariant mismatches as
//! correctness violations and never retries. Tolerated race-window cases are
//! logged by the verifiers instead of surfacing as errors.

use crate::types::HttpMethod;
use reqwest::StatusCode;

/// Check result type
pub type CheckResult<T> = Result<T, CheckError>;

/// Error type for played check actions
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("request failed: {method} {path}: {source}")]
    Network {
        method: HttpMethod,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request timed out: {method} {path}")]
    Timeout { method: HttpMethod, path: String },

    #[error("unexpected status code for {method} {path} ({description}): expected {expected}, got {actual}")]
    UnexpectedStatus {
        method: HttpMethod,
        path: String,
        description: &'static str,
        expected: StatusCode,
        actual: StatusCode,
    },

    #[error("invalid request path {path}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// Domain verification failure with a human-readable description
    #[error("{0}")]
    Fatal(String),
}

/// Construct a fatal [`CheckError`] from a format string, in the style of the
/// verification helpers
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::CheckError::Fatal(format!($($arg)*))
    };
}
