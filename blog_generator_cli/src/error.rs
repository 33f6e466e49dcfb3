//! Error types for the blog generator.
//!
//! Every stage failure carries enough context to be turned into a job-local
//! [`JobOutcome::Failure`](crate::JobOutcome). Only [`Error::Validation`] and
//! configuration problems are meant to reach the caller of a batch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Batch-shape problem detected before any work is dispatched
    #[error("validation error: {0}")]
    Validation(String),

    /// Document could not be retrieved (network failure or non-2xx status)
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Document was retrieved but is not something paragraphs can be read from
    #[error("failed to parse {url}: {message}")]
    Parse { url: String, message: String },

    /// Generation backend failure (model error, quota, bad response)
    #[error("generation failed: {message}")]
    Generation {
        message: String,
        /// HTTP status returned by the backend, when there was one
        status: Option<u16>,
    },

    /// A stage call exceeded its time budget
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: String, after: Duration },

    /// The batch was cancelled before this job finished
    #[error("cancelled")]
    Cancelled,

    /// Invalid or missing configuration
    #[error("configuration error: {message}")]
    Config {
        message: String,
        /// Environment variable or setting that caused the problem
        key: Option<String>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Worker task panicked or was torn down by the runtime
    #[error("internal error: {0}")]
    Internal(String),
}

/// Machine-readable classification recorded in a failed job outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Fetch,
    Parse,
    Generation,
    Timeout,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Parse => "parse",
            ErrorKind::Generation => "generation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Error::Generation {
            message: message.into(),
            status: None,
        }
    }

    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Config { .. } => ErrorKind::Validation,
            Error::Fetch { .. } => ErrorKind::Fetch,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::Generation { .. } | Error::Serialization(_) => ErrorKind::Generation,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Io(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Transient failures worth another attempt under a retry policy.
    ///
    /// Fetch errors and timeouts are always retryable. Generation errors are
    /// retryable only when the backend reported overload (429) or a 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Fetch { .. } | Error::Timeout { .. } => true,
            Error::Generation {
                status: Some(code), ..
            } => *code == 429 || (500..600).contains(code),
            _ => false,
        }
    }
}
