use std::time::Duration;

use thiserror::Error;

use crate::reducer::JobOutcome;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The API description could not be obtained at all.
    #[error("api schema unavailable: {reason}")]
    SchemaUnavailable {
        reason: String,
        #[source]
        source: Option<OperationError>,
    },

    /// The schema was obtained but has no matching path/method/version.
    #[error("no api version found for {}{}{}", .path, method_suffix(.method), version_suffix(.version))]
    VersionNotFound {
        path: String,
        method: Option<String>,
        version: Option<u32>,
    },

    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Retry budget for transient poll failures exhausted.
    #[error("job {request_id} aborted after {retries} transient retries: {last_error}")]
    JobAborted {
        request_id: String,
        retries: u32,
        last_error: String,
    },

    #[error("job {request_id} timed out after {elapsed:?} (last state: {last_state})")]
    JobTimedOut {
        request_id: String,
        elapsed: Duration,
        last_state: String,
    },

    /// A status query failed permanently after the job was submitted. The
    /// job may still be running on the appliance.
    #[error("job {request_id} could not be polled: {source}")]
    JobPollFailed {
        request_id: String,
        #[source]
        source: OperationError,
    },

    /// The appliance reported the job as failed.
    #[error("job {id} failed: {reason}", id = .outcome.request_id, reason = .outcome.failure_reason())]
    JobFailed { outcome: Box<JobOutcome> },

    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl Error {
    /// Request id for job-level failures, for correlation with appliance logs.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::JobAborted { request_id, .. }
            | Self::JobTimedOut { request_id, .. }
            | Self::JobPollFailed { request_id, .. } => Some(request_id),
            Self::JobFailed { outcome } => Some(&outcome.request_id),
            _ => None,
        }
    }
}

fn method_suffix(method: &Option<String>) -> String {
    method
        .as_deref()
        .map(|m| format!(" method={}", m.to_uppercase()))
        .unwrap_or_default()
}

fn version_suffix(version: &Option<u32>) -> String {
    version.map(|v| format!(" version=v{}", v)).unwrap_or_default()
}

/// Invocation-time failure, classified by likely recoverability.
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    #[error("operation {operation_id} is not implemented for this api version")]
    NotImplementedForVersion { operation_id: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request to {url} failed: {message}")]
    Transport {
        url: String,
        message: String,
        transient: bool,
    },

    #[error("request to {url} failed: status={status} body={body}")]
    Http {
        url: String,
        status: u16,
        body: String,
        transient: bool,
    },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl OperationError {
    /// Connection-level failures and gateway errors are presumed recoverable by waiting.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { transient, .. } | Self::Http { transient, .. } => *transient,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Http { body, .. } => Some(body),
            _ => None,
        }
    }

    pub(crate) fn from_status(url: &str, status: u16, body: String) -> Self {
        Self::Http {
            url: url.to_string(),
            status,
            body,
            transient: matches!(status, 502..=504),
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        // Includes body errors: a restart can cut a response short.
        let transient = !(err.is_builder() || err.is_redirect());
        Self::Transport {
            url: url.to_string(),
            message: err.to_string(),
            transient,
        }
    }
}
