//! # Error Types
//!
//! Typed errors surfaced by the library. In-band request failures are not
//! errors: they travel as [`RequestOutcome::Failure`](crate::request::RequestOutcome)
//! values and only become a [`RequestError`] at the convenience `request()`
//! boundary.

use crate::request::RequestOutcome;

/// Rejection of a logical request issued through `RequestPipeline::request`
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    /// The pipeline finished with a `Failure` outcome
    #[error("request rejected: {err_msg}")]
    Rejected {
        err_msg: String,
        /// The full outcome, so callers can inspect it
        outcome: RequestOutcome,
    },
}

impl RequestError {
    pub fn err_msg(&self) -> &str {
        match self {
            RequestError::Rejected { err_msg, .. } => err_msg,
        }
    }
}

/// A plugin-supplied substitute result that does not have a valid outcome shape
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutcomeShapeError {
    #[error("substitute outcome must be a JSON object")]
    NotAnObject,

    #[error("substitute outcome is missing the boolean `succeeded` field")]
    MissingSucceeded,

    #[error("successful substitute outcome is missing the `data` field")]
    MissingBody,

    #[error("substitute outcome field `{field}` has the wrong type")]
    WrongType { field: &'static str },
}

/// Failure reported by the host's page stack
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// The host refused to open another page because its stack is full
    #[error("page limit exceeded: {0}")]
    LimitExceeded(String),

    /// Any other host navigation failure
    #[error("navigation failed: {0}")]
    Other(String),
}

/// Terminal failure of a logical navigation call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Opening kept hitting the page limit after the whole backoff budget
    #[error("page limit still exceeded after retrying for {waited_ms}ms: {url}")]
    LimitRetryExhausted { url: String, waited_ms: u64 },

    /// There is no page to go back to or resolve against
    #[error("navigation history is empty")]
    EmptyHistory,
}

/// Settings could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: ini::Error,
    },

    #[error("invalid value {value:?} for [{section}] {key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}
