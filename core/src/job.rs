use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Handle returned by a submission; the key for every subsequent poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    #[serde(alias = "id", alias = "requestId")]
    request_id: String,
}

impl JobHandle {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Other(String),
}

impl<'de> Deserialize<'de> for JobState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

impl Serialize for JobState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JobState {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "QUEUED" => Self::Pending,
            "RUNNING" | "IN_PROGRESS" => Self::Running,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            _ => Self::Other(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Other(v) => v.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Job status as reported by the appliance. Read-only; a fresh copy is
/// fetched every poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub state: JobState,
    #[serde(default, deserialize_with = "lenient_progress")]
    pub progress: i64,
    /// Usually string-encoded structured data; see [`crate::literal`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Value>,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, state: JobState) -> Self {
        Self {
            id: id.into(),
            owner: None,
            state,
            progress: 0,
            error: None,
            step: None,
            detail: None,
            extension: None,
            start_time: None,
            end_time: None,
        }
    }
}

fn lenient_progress<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_appliance_record_with_missing_fields() {
        let rec: JobRecord = serde_json::from_value(json!({
            "id": "SHUTDOWN_1",
            "state": "in_progress",
            "progress": "40",
            "error": "{'message': 'x'}"
        }))
        .unwrap();
        assert_eq!(rec.state, JobState::Running);
        assert_eq!(rec.progress, 40);
        assert!(rec.detail.is_none());
        assert_eq!(rec.error, Some(json!("{'message': 'x'}")));
    }

    #[test]
    fn unknown_states_are_kept_and_not_terminal() {
        let s = JobState::parse("PAUSED");
        assert_eq!(s, JobState::Other("PAUSED".into()));
        assert!(!s.is_terminal());
        assert!(JobState::parse("completed").is_terminal());
        assert!(JobState::parse("FAILED").is_terminal());
    }

    #[test]
    fn handle_accepts_request_id_aliases() {
        let h: JobHandle = serde_json::from_value(json!({"request_id": "r1"})).unwrap();
        assert_eq!(h.request_id(), "r1");
        let h: JobHandle = serde_json::from_value(json!({"id": "r2"})).unwrap();
        assert_eq!(h.request_id(), "r2");
    }
}
