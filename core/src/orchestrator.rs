use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::client::ApplianceClient;
use crate::endpoint::{EndpointDescriptor, ResolvedOperation, VersionCandidate};
use crate::error::{Error, OperationError, Result};
use crate::fetcher::fetch_schema;
use crate::job::{JobHandle, JobRecord};
use crate::poller::{JobPoller, PollPolicy, PollState};
use crate::reducer::{reduce, JobOutcome};
use crate::resolver::resolve;
use crate::schema::SchemaLocations;

/// A submission rejected with `status` and an embedded `error_code` that
/// the appliance uses to mean "nothing to do, already done".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlreadyCompleteRule {
    pub status: u16,
    pub error_code: String,
}

impl AlreadyCompleteRule {
    fn matches(&self, err: &OperationError) -> Option<Option<String>> {
        if err.status() != Some(self.status) {
            return None;
        }
        let body: Value = serde_json::from_str(err.body()?).ok()?;
        let code = ["code", "error_code", "errorCode"]
            .iter()
            .find_map(|k| body.get(*k))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })?;
        if code != self.error_code {
            return None;
        }
        let message = ["message", "error_message", "errorMessage"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_str))
            .map(str::to_string);
        Some(message)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub policy: PollPolicy,
    pub already_complete: Vec<AlreadyCompleteRule>,
}

impl RunOptions {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            already_complete: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(JobOutcome),
    /// Submission matched an [`AlreadyCompleteRule`]; no job was started.
    AlreadyComplete {
        error_code: String,
        message: Option<String>,
    },
}

/// Fetches the schema and resolves the version for `descriptor`.
pub async fn resolve_version(
    client: &ApplianceClient,
    locations: &SchemaLocations,
    descriptor: &EndpointDescriptor,
    requested_version: Option<u32>,
) -> Result<VersionCandidate> {
    let schema = fetch_schema(client, locations).await?;
    let version = resolve(&schema, descriptor, requested_version)?;
    info!(
        path = descriptor.path_template(),
        method = ?descriptor.http_method(),
        version = %version,
        "resolved api version"
    );
    Ok(version)
}

pub async fn resolve_operation(
    client: &ApplianceClient,
    locations: &SchemaLocations,
    descriptor: &EndpointDescriptor,
    requested_version: Option<u32>,
    suffix: &str,
) -> Result<ResolvedOperation> {
    let version = resolve_version(client, locations, descriptor, requested_version).await?;
    Ok(ResolvedOperation::new(version, suffix))
}

/// Submits once, polls the returned handle to a terminal state and reduces
/// the final record. The submission is never repeated.
pub async fn run_async_operation<S, P, Fut>(
    submit: S,
    poll: P,
    options: &RunOptions,
) -> Result<RunOutcome>
where
    S: Future<Output = std::result::Result<JobHandle, OperationError>>,
    P: FnMut(&JobHandle) -> Fut,
    Fut: Future<Output = std::result::Result<JobRecord, OperationError>>,
{
    let run_id = Uuid::new_v4();
    let span = info_span!("async_operation", %run_id, request_id = tracing::field::Empty);
    async move {
        let handle = match submit.await {
            Ok(handle) => handle,
            Err(err) => {
                for rule in &options.already_complete {
                    if let Some(message) = rule.matches(&err) {
                        info!(
                            error_code = %rule.error_code,
                            "submission reported operation already complete"
                        );
                        return Ok(RunOutcome::AlreadyComplete {
                            error_code: rule.error_code.clone(),
                            message,
                        });
                    }
                }
                return Err(Error::Operation(err));
            }
        };
        tracing::Span::current().record("request_id", handle.request_id());
        info!(request_id = handle.request_id(), "job submitted");

        let request_id = handle.request_id().to_string();
        let report = JobPoller::new(options.policy)
            .watch(&handle, poll)
            .await
            .map_err(|source| Error::JobPollFailed {
                request_id: request_id.clone(),
                source,
            })?;
        match report.state {
            PollState::Completed | PollState::Failed => {
                let record = report
                    .record
                    .as_ref()
                    .ok_or_else(|| Error::JobAborted {
                        request_id: request_id.clone(),
                        retries: report.retries,
                        last_error: "terminal state without job record".to_string(),
                    })?;
                let mut outcome = reduce(record);
                outcome.polls = report.polls;
                outcome.transient_failures = report.transient_failures;
                if report.state == PollState::Completed {
                    Ok(RunOutcome::Completed(outcome))
                } else {
                    warn!(
                        request_id = %request_id,
                        reason = %outcome.failure_reason(),
                        "job failed"
                    );
                    Err(Error::JobFailed {
                        outcome: Box::new(outcome),
                    })
                }
            }
            PollState::TimedOut => Err(Error::JobTimedOut {
                request_id,
                elapsed: report.elapsed,
                last_state: report
                    .record
                    .map(|r| r.state.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            }),
            PollState::Aborted => Err(Error::JobAborted {
                request_id,
                retries: report.retries,
                last_error: report
                    .last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no status received".to_string()),
            }),
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::future::ready;
    use std::time::Duration;

    fn options() -> RunOptions {
        RunOptions::new(
            PollPolicy::new(Duration::from_secs(5), Duration::from_secs(60))
                .with_recovery(Duration::from_secs(30), 2),
        )
    }

    type Polled = std::future::Ready<std::result::Result<JobRecord, OperationError>>;

    fn states(seq: Vec<JobState>) -> impl FnMut(&JobHandle) -> Polled {
        let mut seq = VecDeque::from(seq);
        move |h: &JobHandle| {
            let state = seq.pop_front().unwrap_or(JobState::Running);
            ready(Ok(JobRecord::new(h.request_id(), state)))
        }
    }

    fn bad_request(body: Value) -> OperationError {
        OperationError::Http {
            url: "https://vxm/rest/vxm/v1/cluster/shutdown".into(),
            status: 400,
            body: body.to_string(),
            transient: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completed_run_reports_poll_stats() {
        let outcome = run_async_operation(
            ready(Ok(JobHandle::new("req-9"))),
            states(vec![JobState::Running, JobState::Completed]),
            &options(),
        )
        .await
        .unwrap();
        match outcome {
            RunOutcome::Completed(o) => {
                assert_eq!(o.request_id, "req-9");
                assert_eq!(o.polls, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_is_job_failed_with_request_id() {
        let err = run_async_operation(
            ready(Ok(JobHandle::new("req-f"))),
            states(vec![JobState::Failed]),
            &options(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::JobFailed { .. }));
        assert_eq!(err.request_id(), Some("req-f"));
        assert!(err.to_string().contains("req-f"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_and_abort_are_distinct_from_failure() {
        let err = run_async_operation(
            ready(Ok(JobHandle::new("req-t"))),
            states(vec![]),
            &options(),
        )
        .await
        .unwrap_err();
        match err {
            Error::JobTimedOut { request_id, last_state, .. } => {
                assert_eq!(request_id, "req-t");
                assert_eq!(last_state, "RUNNING");
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = run_async_operation(
            ready(Ok(JobHandle::new("req-a"))),
            |_: &JobHandle| {
                ready(Err(OperationError::Transport {
                    url: "u".into(),
                    message: "connection reset".into(),
                    transient: true,
                }))
            },
            &options(),
        )
        .await
        .unwrap_err();
        match err {
            Error::JobAborted { request_id, retries, last_error } => {
                assert_eq!(request_id, "req-a");
                assert_eq!(retries, 2);
                assert!(last_error.contains("connection reset"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_poll_error_after_submission_names_the_request() {
        let err = run_async_operation(
            ready(Ok(JobHandle::new("req-p"))),
            |_: &JobHandle| {
                ready(Err(OperationError::Http {
                    url: "https://vxm/rest/vxm/v1/requests/req-p".into(),
                    status: 404,
                    body: "{}".into(),
                    transient: false,
                }))
            },
            &options(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.request_id(), Some("req-p"));
        assert!(err.to_string().contains("req-p"));
        match err {
            Error::JobPollFailed { source, .. } => assert_eq!(source.status(), Some(404)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn permanent_submission_error_is_not_retried() {
        let mut polled = false;
        let err = run_async_operation(
            ready(Err(bad_request(json!({"message": "invalid body"})))),
            |_: &JobHandle| {
                polled = true;
                ready(Ok(JobRecord::new("x", JobState::Completed)))
            },
            &options(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Operation(OperationError::Http { status: 400, .. })));
        assert!(!polled);
    }

    #[tokio::test]
    async fn already_complete_rule_turns_400_into_success() {
        let mut opts = options();
        opts.already_complete.push(AlreadyCompleteRule {
            status: 400,
            error_code: "E30102".into(),
        });
        let outcome = run_async_operation(
            ready(Err(bad_request(json!({
                "error_code": "E30102",
                "message": "cluster already shut down"
            })))),
            states(vec![]),
            &opts,
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            RunOutcome::AlreadyComplete {
                error_code: "E30102".into(),
                message: Some("cluster already shut down".into()),
            }
        );

        let err = run_async_operation(
            ready(Err(bad_request(json!({"error_code": "E99999"})))),
            states(vec![]),
            &opts,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Operation(_)));
    }
}
