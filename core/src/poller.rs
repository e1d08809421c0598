use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::OperationError;
use crate::job::{JobHandle, JobRecord, JobState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between status queries while the job is running.
    pub interval: Duration,
    /// Overall deadline, checked once per cycle.
    pub timeout: Duration,
    /// Sleep after a transient failure before querying again.
    pub recovery_interval: Duration,
    /// Consecutive transient failures tolerated before giving up.
    pub max_transient_retries: u32,
}

/// Shortest interval accepted between status queries.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

impl PollPolicy {
    /// `interval` is raised to [`MIN_INTERVAL`] if shorter.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        Self {
            interval,
            timeout,
            recovery_interval: interval,
            max_transient_retries: 0,
        }
    }

    pub fn with_recovery(
        mut self,
        recovery_interval: Duration,
        max_transient_retries: u32,
    ) -> Self {
        self.recovery_interval = recovery_interval;
        self.max_transient_retries = max_transient_retries;
        self
    }
}

/// Operation weight classes with their polling defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollProfile {
    /// Short reconfiguration jobs.
    Light,
    Standard,
    /// Upgrades and expansions that reboot nodes.
    Heavy,
}

impl PollProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Standard => "standard",
            Self::Heavy => "heavy",
        }
    }

    pub fn policy(&self) -> PollPolicy {
        match self {
            Self::Light => PollPolicy::new(secs(5), secs(10 * 60)).with_recovery(secs(30), 8),
            Self::Standard => {
                PollPolicy::new(secs(30), secs(2 * 3600)).with_recovery(secs(180), 20)
            }
            Self::Heavy => PollPolicy::new(secs(60), secs(24 * 3600)).with_recovery(secs(900), 8),
        }
    }
}

impl FromStr for PollProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "standard" => Ok(Self::Standard),
            "heavy" => Ok(Self::Heavy),
            other => Err(format!("unknown poll profile '{}'", other)),
        }
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Classification of one status query.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    InProgress(JobRecord),
    Terminal(JobRecord),
    TransientFailure(OperationError),
}

impl PollOutcome {
    /// Permanent query failures are returned as `Err`.
    pub fn classify(result: Result<JobRecord, OperationError>) -> Result<Self, OperationError> {
        match result {
            Ok(record) if record.state.is_terminal() => Ok(Self::Terminal(record)),
            Ok(record) => Ok(Self::InProgress(record)),
            Err(err) if err.is_transient() => Ok(Self::TransientFailure(err)),
            Err(err) => Err(err),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }

    pub fn is_transient_failure(&self) -> bool {
        matches!(self, Self::TransientFailure(_))
    }

    pub fn record(&self) -> Option<&JobRecord> {
        match self {
            Self::InProgress(r) | Self::Terminal(r) => Some(r),
            Self::TransientFailure(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollState {
    Completed,
    Failed,
    TimedOut,
    Aborted,
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMED_OUT",
            Self::Aborted => "ABORTED",
        })
    }
}

#[derive(Debug, Clone)]
pub struct PollReport {
    pub state: PollState,
    /// Last record successfully read, if any.
    pub record: Option<JobRecord>,
    pub polls: u32,
    /// Interval sleeps between non-terminal polls.
    pub sleeps: u32,
    /// Recovery sleeps after transient failures.
    pub retries: u32,
    pub transient_failures: u32,
    pub elapsed: Duration,
    pub last_error: Option<OperationError>,
}

/// Watches one job handle until it is terminal or the poller gives up.
#[derive(Debug, Clone)]
pub struct JobPoller {
    policy: PollPolicy,
}

impl JobPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub async fn watch<P, Fut>(
        &self,
        handle: &JobHandle,
        mut poll: P,
    ) -> Result<PollReport, OperationError>
    where
        P: FnMut(&JobHandle) -> Fut,
        Fut: Future<Output = Result<JobRecord, OperationError>>,
    {
        let request_id = handle.request_id();
        let started = Instant::now();
        let mut report = PollReport {
            state: PollState::Aborted,
            record: None,
            polls: 0,
            sleeps: 0,
            retries: 0,
            transient_failures: 0,
            elapsed: Duration::ZERO,
            last_error: None,
        };
        let mut consecutive_failures = 0u32;
        let mut last_state: Option<JobState> = None;

        loop {
            if started.elapsed() >= self.policy.timeout {
                report.state = PollState::TimedOut;
                break;
            }

            report.polls += 1;
            match PollOutcome::classify(poll(handle).await)? {
                PollOutcome::Terminal(record) => {
                    report.state = if record.state == JobState::Completed {
                        PollState::Completed
                    } else {
                        PollState::Failed
                    };
                    report.record = Some(record);
                    break;
                }
                PollOutcome::InProgress(record) => {
                    consecutive_failures = 0;
                    if last_state.as_ref() != Some(&record.state) {
                        info!(
                            request_id,
                            state = %record.state,
                            progress = record.progress,
                            "job state changed"
                        );
                        last_state = Some(record.state.clone());
                    } else {
                        debug!(
                            request_id,
                            progress = record.progress,
                            step = ?record.step,
                            "job still running"
                        );
                    }
                    report.record = Some(record);
                    tokio::time::sleep(self.policy.interval).await;
                    report.sleeps += 1;
                }
                PollOutcome::TransientFailure(err) => {
                    report.transient_failures += 1;
                    consecutive_failures += 1;
                    warn!(
                        request_id,
                        error = %err,
                        attempt = consecutive_failures,
                        max = self.policy.max_transient_retries,
                        "job status query failed, appliance may be restarting"
                    );
                    report.last_error = Some(err);
                    if consecutive_failures > self.policy.max_transient_retries {
                        report.state = PollState::Aborted;
                        break;
                    }
                    tokio::time::sleep(self.policy.recovery_interval).await;
                    report.retries += 1;
                }
            }
        }

        report.elapsed = started.elapsed();
        info!(
            request_id,
            state = %report.state,
            polls = report.polls,
            elapsed = ?report.elapsed,
            "stopped polling job"
        );
        Ok(report)
    }
}
