use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::job::{JobRecord, JobState};
use crate::literal;

/// A string-encoded field after decoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedField {
    Structured(Value),
    /// Text that did not decode; exposed verbatim.
    Raw(String),
}

impl DecodedField {
    pub fn decode(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(match literal::decode(text) {
                Ok(v) => DecodedField::Structured(v),
                Err(err) => {
                    debug!(error = %err, "field is not structured, keeping raw text");
                    DecodedField::Raw(text.clone())
                }
            }),
            other => Some(DecodedField::Structured(other.clone())),
        }
    }

    pub fn structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(v) => Some(v),
            Self::Raw(_) => None,
        }
    }
}

/// Normalized, caller-facing view of a terminal (or last seen) job record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub request_id: String,
    pub state: JobState,
    pub progress: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DecodedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<DecodedField>,
    /// Decoded final payload of a completed job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "as_secs")]
    pub elapsed: Option<Duration>,
    pub polls: u32,
    pub transient_failures: u32,
}

pub fn reduce(record: &JobRecord) -> JobOutcome {
    let extension = record.extension.as_ref().and_then(DecodedField::decode);
    let error = match record.state {
        JobState::Completed => None,
        _ => record.error.as_ref().and_then(DecodedField::decode),
    };
    let result = match record.state {
        JobState::Completed => extension
            .as_ref()
            .and_then(DecodedField::structured)
            .cloned(),
        _ => None,
    };
    let elapsed = match (record.start_time, record.end_time) {
        (Some(start), Some(end)) => end
            .checked_sub(start)
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Duration::from_millis),
        _ => None,
    };
    JobOutcome {
        request_id: record.id.clone(),
        state: record.state.clone(),
        progress: record.progress,
        step: record.step.clone(),
        detail: record.detail.clone(),
        error,
        extension,
        result,
        elapsed,
        polls: 0,
        transient_failures: 0,
    }
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == JobState::Completed
    }

    /// Best human-readable explanation of why the job did not complete.
    pub fn failure_reason(&self) -> String {
        if let Some(field) = &self.error {
            match field {
                DecodedField::Structured(v) => {
                    if let Some(msg) = message_of(v) {
                        return msg;
                    }
                    return v.to_string();
                }
                DecodedField::Raw(text) => return text.clone(),
            }
        }
        if let Some(detail) = self.detail.as_deref().filter(|d| !d.is_empty()) {
            return detail.to_string();
        }
        format!("job reported state {}", self.state)
    }
}

fn message_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => ["message", "error_message", "errorMessage", "reason", "detail"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::to_string),
        Value::Array(items) => items.iter().find_map(message_of),
        _ => None,
    }
}

fn as_secs<S>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match d {
        Some(d) => s.serialize_f64(d.as_secs_f64()),
        None => s.serialize_none(),
    }
}
