use hcictl_core::{HttpMethod, JobOutcome, RestBinding, RunOutcome, VersionCandidate};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    pub version: VersionCandidate,
    pub available: Vec<VersionCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationEntry {
    pub operation_id: String,
    pub method: HttpMethod,
    pub path: String,
}

impl OperationEntry {
    pub fn new(operation_id: &str, binding: &RestBinding) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            method: binding.method,
            path: binding.path.clone(),
        }
    }
}

/// Printed when a job is submitted without waiting for it.
#[derive(Debug, Clone, Serialize)]
pub struct Submitted {
    pub request_id: String,
    pub operation_id: String,
    pub status: &'static str,
}

/// Final line of a waited run.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RunView<'a> {
    Job(&'a JobOutcome),
    AlreadyComplete {
        status: &'static str,
        error_code: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<&'a str>,
    },
}

impl<'a> From<&'a RunOutcome> for RunView<'a> {
    fn from(outcome: &'a RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed(job) => RunView::Job(job),
            RunOutcome::AlreadyComplete {
                error_code,
                message,
            } => RunView::AlreadyComplete {
                status: "already_complete",
                error_code,
                message: message.as_deref(),
            },
        }
    }
}
